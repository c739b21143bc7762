//! Capture disposition mode and its selector.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a captured image goes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Put the image on the system clipboard
    #[default]
    ClipboardCopy,
    /// Write the image as a PNG into the save directory
    FileSave,
}

impl CaptureMode {
    /// Every mode, in menu order.
    pub const ALL: [CaptureMode; 2] = [CaptureMode::ClipboardCopy, CaptureMode::FileSave];

    /// Menu label for this mode.
    pub fn label(self) -> &'static str {
        match self {
            CaptureMode::ClipboardCopy => "Copy to clipboard",
            CaptureMode::FileSave => "Save image",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::ClipboardCopy => write!(f, "ClipboardCopy"),
            CaptureMode::FileSave => write!(f, "FileSave"),
        }
    }
}

/// Holds the single active capture mode.
///
/// The selector is owned by the tray application and lent to each dispatch
/// cycle by shared reference. `select` takes `&mut self`, so the menu handler
/// is the only writer and a cycle never observes a half-applied change.
#[derive(Clone, Debug, Default)]
pub struct ModeSelector {
    current: CaptureMode,
}

impl ModeSelector {
    pub fn new(initial: CaptureMode) -> Self {
        Self { current: initial }
    }

    /// The active mode.
    pub fn current(&self) -> CaptureMode {
        self.current
    }

    /// Makes `mode` the active mode, deactivating the previous one.
    pub fn select(&mut self, mode: CaptureMode) {
        if self.current != mode {
            tracing::info!("Capture mode changed: {} -> {}", self.current, mode);
        }
        self.current = mode;
    }

    /// True if `mode` is the active one (drives the menu check marks).
    pub fn is_selected(&self, mode: CaptureMode) -> bool {
        self.current == mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_clipboard() {
        assert_eq!(ModeSelector::default().current(), CaptureMode::ClipboardCopy);
    }

    #[test]
    fn test_select_switches_mode() {
        let mut selector = ModeSelector::default();
        selector.select(CaptureMode::FileSave);
        assert_eq!(selector.current(), CaptureMode::FileSave);
        selector.select(CaptureMode::ClipboardCopy);
        assert_eq!(selector.current(), CaptureMode::ClipboardCopy);
    }

    #[test]
    fn test_exactly_one_mode_selected() {
        let mut selector = ModeSelector::new(CaptureMode::FileSave);
        for mode in [
            CaptureMode::ClipboardCopy,
            CaptureMode::ClipboardCopy,
            CaptureMode::FileSave,
        ] {
            selector.select(mode);
            let selected = CaptureMode::ALL
                .iter()
                .filter(|m| selector.is_selected(**m))
                .count();
            assert_eq!(selected, 1);
            assert!(selector.is_selected(mode));
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&CaptureMode::FileSave).unwrap();
        assert_eq!(json, "\"file_save\"");
        let mode: CaptureMode = serde_json::from_str("\"clipboard_copy\"").unwrap();
        assert_eq!(mode, CaptureMode::ClipboardCopy);
    }

    #[test]
    fn test_labels_are_distinct() {
        assert_ne!(
            CaptureMode::ClipboardCopy.label(),
            CaptureMode::FileSave.label()
        );
    }
}
