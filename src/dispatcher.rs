//! Capture dispatch cycle.
//!
//! One `tick()` per poll: Idle → GestureDetected → WindowResolved → Captured
//! → Dispatched, returning to Idle afterwards whatever happened. A failure at
//! any step ends the cycle. It is logged and otherwise invisible to the user,
//! and the next tick starts from scratch.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{CaptureFailure, NoActiveWindow, ScreenCapturer, WindowLocator};
use crate::input::{InputProbe, gesture_held};
use crate::mode::{CaptureMode, ModeSelector};
use crate::output::{ClipboardSink, DispatchFailure, save_png};

/// Any failure inside one dispatch cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    NoWindow(#[from] NoActiveWindow),
    #[error(transparent)]
    Capture(#[from] CaptureFailure),
    #[error(transparent)]
    Dispatch(#[from] DispatchFailure),
}

impl CycleError {
    /// The terminal state a cycle failing with this error ends in.
    pub fn outcome(&self) -> CycleOutcome {
        match self {
            CycleError::NoWindow(_) => CycleOutcome::NoWindow,
            CycleError::Capture(_) => CycleOutcome::CaptureFailed,
            CycleError::Dispatch(_) => CycleOutcome::DispatchFailed,
        }
    }
}

/// Where a dispatch cycle ended before returning to Idle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Gesture not held, nothing attempted
    Idle,
    /// No foreground window could be resolved
    NoWindow,
    /// The screen copy failed
    CaptureFailed,
    /// Image placed on the clipboard
    Copied,
    /// Image written to this file
    Saved(PathBuf),
    /// Clipboard or file write failed
    DispatchFailed,
}

#[cfg(test)]
impl CycleOutcome {
    /// True if the image reached its destination.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, CycleOutcome::Copied | CycleOutcome::Saved(_))
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Idle => write!(f, "Idle"),
            CycleOutcome::NoWindow => write!(f, "No window"),
            CycleOutcome::CaptureFailed => write!(f, "Capture failed"),
            CycleOutcome::Copied => write!(f, "Copied to clipboard"),
            CycleOutcome::Saved(path) => write!(f, "Saved to {}", path.display()),
            CycleOutcome::DispatchFailed => write!(f, "Dispatch failed"),
        }
    }
}

/// Runs dispatch cycles against a set of OS collaborators.
pub struct Dispatcher<P, L, C, K> {
    probe: P,
    locator: L,
    capturer: C,
    clipboard: K,
    output_dir: PathBuf,
    clock: fn() -> DateTime<Local>,
}

impl<P, L, C, K> Dispatcher<P, L, C, K>
where
    P: InputProbe,
    L: WindowLocator,
    C: ScreenCapturer,
    K: ClipboardSink,
{
    pub fn new(probe: P, locator: L, capturer: C, clipboard: K, output_dir: PathBuf) -> Self {
        Self {
            probe,
            locator,
            capturer,
            clipboard,
            output_dir,
            clock: Local::now,
        }
    }

    /// Replaces the clock used to name saved files.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory that file-mode captures are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs one poll tick.
    ///
    /// Never fails: every error is logged and folded into the returned outcome.
    pub fn tick(&mut self, modes: &ModeSelector) -> CycleOutcome {
        if !gesture_held(&self.probe) {
            return CycleOutcome::Idle;
        }

        let mode = modes.current();
        debug!("Gesture detected, mode {}", mode);

        match self.run_cycle(mode) {
            Ok(outcome) => {
                info!("{}", outcome);
                outcome
            }
            Err(e) => {
                let outcome = e.outcome();
                warn!("{}: {}", outcome, e);
                outcome
            }
        }
    }

    fn run_cycle(&mut self, mode: CaptureMode) -> Result<CycleOutcome, CycleError> {
        let rect = self.locator.current_bounds()?;
        debug!("Window bounds: {}", rect);

        let buffer = self.capturer.capture(rect)?;
        debug!("Captured {}x{}", buffer.width(), buffer.height());

        match mode {
            CaptureMode::ClipboardCopy => {
                self.clipboard.set_image(buffer)?;
                Ok(CycleOutcome::Copied)
            }
            CaptureMode::FileSave => {
                let path = save_png(&buffer, &self.output_dir, (self.clock)())?;
                Ok(CycleOutcome::Saved(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelBuffer;
    use crate::capture::screenshot::region_size;
    use crate::geometry::Rect;
    use crate::input::Control;
    use chrono::TimeZone;
    use image::{Rgba, RgbaImage};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tempfile::tempdir;

    struct FakeProbe {
        held: Vec<Control>,
    }

    impl InputProbe for FakeProbe {
        fn is_held(&self, control: Control) -> bool {
            self.held.contains(&control)
        }
    }

    fn both_buttons() -> FakeProbe {
        FakeProbe {
            held: vec![Control::PrimaryButton, Control::SecondaryButton],
        }
    }

    struct FakeLocator {
        bounds: Option<(i32, i32, i32, i32)>,
        calls: Rc<Cell<u32>>,
    }

    impl WindowLocator for FakeLocator {
        fn current_bounds(&self) -> Result<Rect, NoActiveWindow> {
            self.calls.set(self.calls.get() + 1);
            let (l, t, r, b) = self.bounds.ok_or(NoActiveWindow::NoForegroundWindow)?;
            crate::capture::window::bounds_from_edges(l, t, r, b)
        }
    }

    /// Fills the region with a solid colour; counts buffers handed out.
    struct FakeCapturer {
        buffers: Rc<Cell<u32>>,
    }

    impl ScreenCapturer for FakeCapturer {
        fn capture(&self, rect: Rect) -> Result<PixelBuffer, CaptureFailure> {
            let (width, height) = region_size(rect)?;
            self.buffers.set(self.buffers.get() + 1);
            Ok(PixelBuffer::from_image(RgbaImage::from_pixel(
                width,
                height,
                Rgba([30, 60, 90, 255]),
            )))
        }
    }

    struct FakeClipboard {
        images: Rc<RefCell<Vec<(u32, u32)>>>,
        fail: bool,
    }

    impl ClipboardSink for FakeClipboard {
        fn set_image(&mut self, buffer: PixelBuffer) -> Result<(), DispatchFailure> {
            if self.fail {
                return Err(DispatchFailure::ClipboardUnavailable(
                    "OpenClipboard denied".to_string(),
                ));
            }
            self.images
                .borrow_mut()
                .push((buffer.width(), buffer.height()));
            Ok(())
        }
    }

    fn fixed_clock() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    struct Harness {
        dispatcher: Dispatcher<FakeProbe, FakeLocator, FakeCapturer, FakeClipboard>,
        locator_calls: Rc<Cell<u32>>,
        buffers: Rc<Cell<u32>>,
        clipboard: Rc<RefCell<Vec<(u32, u32)>>>,
    }

    fn harness(
        probe: FakeProbe,
        bounds: Option<(i32, i32, i32, i32)>,
        clipboard_fails: bool,
        output_dir: PathBuf,
    ) -> Harness {
        let locator_calls = Rc::new(Cell::new(0));
        let buffers = Rc::new(Cell::new(0));
        let clipboard = Rc::new(RefCell::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            probe,
            FakeLocator {
                bounds,
                calls: locator_calls.clone(),
            },
            FakeCapturer {
                buffers: buffers.clone(),
            },
            FakeClipboard {
                images: clipboard.clone(),
                fail: clipboard_fails,
            },
            output_dir,
        )
        .with_clock(fixed_clock);

        Harness {
            dispatcher,
            locator_calls,
            buffers,
            clipboard,
        }
    }

    #[test]
    fn test_no_gesture_stays_idle() {
        let dir = tempdir().unwrap();
        for held in [
            vec![],
            vec![Control::PrimaryButton],
            vec![Control::SecondaryButton],
        ] {
            let mut h = harness(
                FakeProbe { held },
                Some((100, 100, 500, 400)),
                false,
                dir.path().join("Pictures"),
            );
            let outcome = h.dispatcher.tick(&ModeSelector::default());

            assert_eq!(outcome, CycleOutcome::Idle);
            assert_eq!(h.locator_calls.get(), 0);
            assert!(h.clipboard.borrow().is_empty());
        }
    }

    #[test]
    fn test_clipboard_mode_copies_window_image() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), Some((100, 100, 500, 400)), false, out.clone());

        let outcome = h.dispatcher.tick(&ModeSelector::new(CaptureMode::ClipboardCopy));

        assert_eq!(outcome, CycleOutcome::Copied);
        assert_eq!(*h.clipboard.borrow(), vec![(400, 300)]);
        assert!(!out.exists());
    }

    #[test]
    fn test_file_mode_creates_directory_and_png() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), Some((100, 100, 500, 400)), false, out.clone());

        let outcome = h.dispatcher.tick(&ModeSelector::new(CaptureMode::FileSave));

        let expected = out.join("Pict_20240506070809.png");
        assert_eq!(outcome, CycleOutcome::Saved(expected.clone()));
        assert!(out.is_dir());
        let decoded = image::open(&expected).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
        assert!(h.clipboard.borrow().is_empty());
    }

    #[test]
    fn test_no_window_has_no_side_effects() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");

        for mode in CaptureMode::ALL {
            let mut h = harness(both_buttons(), None, false, out.clone());
            let outcome = h.dispatcher.tick(&ModeSelector::new(mode));

            assert_eq!(outcome, CycleOutcome::NoWindow);
            assert_eq!(h.buffers.get(), 0);
            assert!(h.clipboard.borrow().is_empty());
            assert!(!out.exists());
        }
    }

    #[test]
    fn test_zero_area_window_fails_capture() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), Some((50, 50, 50, 400)), false, out.clone());

        let outcome = h.dispatcher.tick(&ModeSelector::new(CaptureMode::FileSave));

        assert_eq!(outcome, CycleOutcome::CaptureFailed);
        assert_eq!(h.buffers.get(), 0);
        assert!(!out.exists());
    }

    #[test]
    fn test_clipboard_failure_is_contained() {
        let dir = tempdir().unwrap();
        let mut h = harness(
            both_buttons(),
            Some((0, 0, 10, 10)),
            true,
            dir.path().join("Pictures"),
        );
        let modes = ModeSelector::default();

        assert_eq!(h.dispatcher.tick(&modes), CycleOutcome::DispatchFailed);
        // The next tick starts a fresh attempt
        assert_eq!(h.dispatcher.tick(&modes), CycleOutcome::DispatchFailed);
        assert_eq!(h.buffers.get(), 2);
    }

    #[test]
    fn test_failures_are_silent_by_design() {
        // A failed cycle reports only an outcome value; nothing reaches the
        // user or any output. This is a deliberate trade-off for a background
        // utility.
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), None, false, out.clone());

        let outcome = h.dispatcher.tick(&ModeSelector::new(CaptureMode::FileSave));

        assert!(!outcome.is_dispatched());
        assert!(h.clipboard.borrow().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn test_sustained_gesture_retriggers() {
        let dir = tempdir().unwrap();
        let mut h = harness(
            both_buttons(),
            Some((0, 0, 64, 48)),
            false,
            dir.path().join("Pictures"),
        );
        let modes = ModeSelector::default();

        for _ in 0..3 {
            assert_eq!(h.dispatcher.tick(&modes), CycleOutcome::Copied);
        }
        assert_eq!(h.clipboard.borrow().len(), 3);
    }

    #[test]
    fn test_mode_change_applies_to_next_tick() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), Some((0, 0, 8, 8)), false, out.clone());
        let mut modes = ModeSelector::default();

        assert_eq!(h.dispatcher.tick(&modes), CycleOutcome::Copied);
        modes.select(CaptureMode::FileSave);
        assert!(matches!(h.dispatcher.tick(&modes), CycleOutcome::Saved(_)));

        assert_eq!(h.clipboard.borrow().len(), 1);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_same_second_saves_collapse_to_one_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        let mut h = harness(both_buttons(), Some((0, 0, 8, 8)), false, out.clone());
        let modes = ModeSelector::new(CaptureMode::FileSave);

        let first = h.dispatcher.tick(&modes);
        let second = h.dispatcher.tick(&modes);

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_save_leaves_no_new_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Pictures");
        std::fs::create_dir_all(out.join("Pict_20240506070809.png")).unwrap();
        let mut h = harness(both_buttons(), Some((0, 0, 8, 8)), false, out.clone());

        let outcome = h.dispatcher.tick(&ModeSelector::new(CaptureMode::FileSave));

        assert_eq!(outcome, CycleOutcome::DispatchFailed);
        let entries: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("Pict_20240506070809.png")]);
        assert!(out.join("Pict_20240506070809.png").is_dir());
    }

    #[test]
    fn test_error_maps_to_outcome() {
        let err = CycleError::from(NoActiveWindow::NoForegroundWindow);
        assert_eq!(err.outcome(), CycleOutcome::NoWindow);

        let err = CycleError::from(CaptureFailure::EmptyRegion {
            width: 0,
            height: 1,
        });
        assert_eq!(err.outcome(), CycleOutcome::CaptureFailed);

        let err = CycleError::from(DispatchFailure::Clipboard("busy".to_string()));
        assert_eq!(err.outcome(), CycleOutcome::DispatchFailed);
        assert_eq!(err.to_string(), "failed to set clipboard image: busy");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(format!("{}", CycleOutcome::Idle), "Idle");
        assert_eq!(format!("{}", CycleOutcome::NoWindow), "No window");
        assert_eq!(format!("{}", CycleOutcome::Copied), "Copied to clipboard");
        assert!(
            format!("{}", CycleOutcome::Saved(PathBuf::from("Pict_1.png")))
                .starts_with("Saved to")
        );
    }
}
