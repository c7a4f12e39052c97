/// IR remote control input
///
/// The receiver shows up as a Linux input device (the `gpio_ir_recv` kernel
/// driver by default). Each button press arrives as an `EV_MSC` event whose
/// value is the remote's scancode; a held button repeats, so presses closer
/// together than the debounce window are dropped.

mod device;

pub use device::listen;

use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::state::show::Command;

/// Scancodes of the stock remote
pub fn default_keymap() -> HashMap<i32, Command> {
    HashMap::from([
        (70, Command::Next),
        (21, Command::Previous),
        (67, Command::NextSet),
        (68, Command::PreviousSet),
        (64, Command::Mode),
    ])
}

/// Everything the listener needs, cloned into the subscription
#[derive(Debug, Clone)]
pub struct IrSettings {
    pub device_name: String,
    pub debounce: Duration,
    pub keymap: HashMap<i32, Command>,
}

/// A raw press read from the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub scancode: i32,
    pub at: SystemTime,
}

/// Turns raw presses into commands
#[derive(Debug)]
pub struct Decoder {
    keymap: HashMap<i32, Command>,
    debounce: Duration,
    last_accepted: Option<SystemTime>,
}

impl Decoder {
    pub fn new(keymap: HashMap<i32, Command>, debounce: Duration) -> Self {
        Self {
            keymap,
            debounce,
            last_accepted: None,
        }
    }

    /// Decode a press, or `None` when it is a repeat or an unmapped button
    ///
    /// Unmapped buttons still count as accepted presses for debouncing.
    pub fn accept(&mut self, press: KeyPress) -> Option<Command> {
        if let Some(last) = self.last_accepted {
            // timestamps from the kernel can step backwards; treat that as a repeat
            let elapsed = press.at.duration_since(last).unwrap_or(Duration::ZERO);
            if elapsed < self.debounce {
                return None;
            }
        }
        self.last_accepted = Some(press.at);

        let command = self.keymap.get(&press.scancode).copied();
        if command.is_none() {
            debug!(scancode = press.scancode, "unsupported IR button");
        }
        command
    }
}
