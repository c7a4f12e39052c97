/// Control panel on the frame's GPIO header
///
/// Two push buttons and one LED:
/// - Mode button: acts once it has been held for the hold time. Same as the
///   remote's mode key.
/// - Advance button: next slide, but only in manual mode.
/// - Mode LED: lit while the show is in manual mode.
///
/// Buttons pull their pin low when pressed.

mod device;

pub use device::listen;

use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::state::show::Command;

/// Interval between button samples
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Physical buttons on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelButton {
    Mode,
    Advance,
}

/// Everything the panel listener needs, cloned into the subscription
#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub mode_pin: u8,
    pub advance_pin: u8,
    pub led_pin: u8,
    pub hold: Duration,
    /// Whether the mode LED should be lit, published by the application
    pub led: watch::Receiver<bool>,
}

impl PanelSettings {
    /// Subscription identity: one listener per pin assignment
    pub fn id(&self) -> (&'static str, u8, u8, u8) {
        ("gpio-panel", self.mode_pin, self.advance_pin, self.led_pin)
    }
}

/// Command for a button press in the current playback mode
///
/// Advance does nothing while the show runs by itself.
pub fn command_for(button: PanelButton, auto: bool) -> Option<Command> {
    match button {
        PanelButton::Mode => Some(Command::Mode),
        PanelButton::Advance if auto => None,
        PanelButton::Advance => Some(Command::Next),
    }
}

/// Turns pin samples into single presses
///
/// Fires once per press, after the button has been down for `hold`. A zero
/// hold fires on the first pressed sample.
#[derive(Debug)]
pub struct ButtonTracker {
    hold: Duration,
    down_since: Option<Instant>,
    fired: bool,
}

impl ButtonTracker {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            down_since: None,
            fired: false,
        }
    }

    pub fn sample(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            self.down_since = None;
            self.fired = false;
            return false;
        }
        let since = *self.down_since.get_or_insert(now);
        if !self.fired && now.duration_since(since) >= self.hold {
            self.fired = true;
            return true;
        }
        false
    }
}
