//! Foreground window discovery and its visible bounds.
//!
//! The window handle (`HWND`) is owned by the system. We only read it and
//! never create or destroy windows here.

use thiserror::Error;

use crate::geometry::Rect;

/// No usable foreground window for this cycle.
#[derive(Debug, Error)]
pub enum NoActiveWindow {
    #[error("no window is in the foreground")]
    NoForegroundWindow,
    #[error("extended frame bounds unavailable: {0}")]
    FrameBoundsUnavailable(String),
    #[error("window reported inverted bounds ({left}, {top}, {right}, {bottom})")]
    InvalidBounds {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
}

/// Resolves the on-screen rectangle of the window currently receiving input.
pub trait WindowLocator {
    fn current_bounds(&self) -> Result<Rect, NoActiveWindow>;
}

/// Converts raw edges reported by the OS into a `Rect`.
pub fn bounds_from_edges(
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
) -> Result<Rect, NoActiveWindow> {
    Rect::from_edges(left, top, right, bottom).ok_or(NoActiveWindow::InvalidBounds {
        left,
        top,
        right,
        bottom,
    })
}

#[cfg(windows)]
pub use self::win32::ForegroundWindowLocator;

#[cfg(windows)]
mod win32 {
    use std::ffi::c_void;

    use windows::Win32::Foundation::{HWND, RECT};
    use windows::Win32::Graphics::Dwm::{DWMWA_EXTENDED_FRAME_BOUNDS, DwmGetWindowAttribute};
    use windows::Win32::UI::WindowsAndMessaging::GetForegroundWindow;

    use super::{NoActiveWindow, WindowLocator, bounds_from_edges};
    use crate::geometry::Rect;

    /// Locates the foreground window through the desktop compositor.
    #[derive(Debug, Default)]
    pub struct ForegroundWindowLocator;

    impl WindowLocator for ForegroundWindowLocator {
        fn current_bounds(&self) -> Result<Rect, NoActiveWindow> {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.0.is_null() {
                return Err(NoActiveWindow::NoForegroundWindow);
            }
            tracing::debug!("Foreground window: {:?}", hwnd);
            extended_frame_bounds(hwnd)
        }
    }

    /// Gets the window's extended frame bounds from DWM.
    ///
    /// `GetWindowRect` on Windows 10+ includes the invisible resize border and
    /// drop shadow, which shows up as a transparent margin in captures. The
    /// extended frame bounds are what the compositor actually paints.
    fn extended_frame_bounds(hwnd: HWND) -> Result<Rect, NoActiveWindow> {
        let mut bounds = RECT::default();
        unsafe {
            DwmGetWindowAttribute(
                hwnd,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                &mut bounds as *mut RECT as *mut c_void,
                std::mem::size_of::<RECT>() as u32,
            )
        }
        .map_err(|e| NoActiveWindow::FrameBoundsUnavailable(e.to_string()))?;

        bounds_from_edges(bounds.left, bounds.top, bounds.right, bounds.bottom)
    }
}
