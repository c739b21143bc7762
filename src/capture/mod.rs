//! Window location and screen capture.
//!
//! This module provides:
//! - Foreground window bounds (`WindowLocator`, `ForegroundWindowLocator`)
//! - Screen region capture (`ScreenCapturer`, `GdiCapturer`)

pub mod screenshot;
pub mod window;

pub use screenshot::{CaptureFailure, PixelBuffer, ScreenCapturer};
pub use window::{NoActiveWindow, WindowLocator};

#[cfg(windows)]
pub use screenshot::GdiCapturer;
#[cfg(windows)]
pub use window::ForegroundWindowLocator;
