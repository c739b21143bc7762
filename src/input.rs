//! Physical input state queries.
//!
//! The trigger is a *state* check: both mouse buttons held down at the
//! moment of the poll. Nothing here subscribes to click events.

/// A logical input control the gesture is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    PrimaryButton,
    SecondaryButton,
}

/// Answers whether a control is down right now.
///
/// Implementations have no side effects. An OS failure reads as "not held".
pub trait InputProbe {
    fn is_held(&self, control: Control) -> bool;
}

/// True when the capture gesture holds: primary and secondary button down together.
pub fn gesture_held(probe: &impl InputProbe) -> bool {
    probe.is_held(Control::PrimaryButton) && probe.is_held(Control::SecondaryButton)
}

#[cfg(windows)]
pub use self::win32::KeyStateProbe;

#[cfg(windows)]
mod win32 {
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_LBUTTON, VK_RBUTTON};

    use super::{Control, InputProbe};

    /// Reads the asynchronous key state, which reflects the physical buttons
    /// even while another process owns the foreground.
    #[derive(Debug, Default)]
    pub struct KeyStateProbe;

    impl InputProbe for KeyStateProbe {
        fn is_held(&self, control: Control) -> bool {
            let vk = match control {
                Control::PrimaryButton => VK_LBUTTON,
                Control::SecondaryButton => VK_RBUTTON,
            };
            // Most significant bit set = currently down
            unsafe { GetAsyncKeyState(vk.0 as i32) < 0 }
        }
    }
}
