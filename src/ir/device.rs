use iced::futures::Stream;

use super::IrSettings;
use crate::state::show::Command;

/// Stream of commands from the IR receiver
///
/// Ends quietly when no receiver is attached.
#[cfg(target_os = "linux")]
pub fn listen(settings: IrSettings) -> impl Stream<Item = Command> {
    use iced::futures::channel::mpsc;
    use iced::futures::SinkExt;
    use tracing::info;

    use super::Decoder;

    iced::stream::channel(16, move |mut output: mpsc::Sender<Command>| async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let device_name = settings.device_name.clone();

        // evdev reads block, so they get their own thread
        let _reader = tokio::task::spawn_blocking(move || linux::read_presses(&device_name, tx));

        let mut decoder = Decoder::new(settings.keymap, settings.debounce);
        while let Some(press) = rx.recv().await {
            if let Some(command) = decoder.accept(press) {
                info!(?command, scancode = press.scancode, "IR command");
                if output.send(command).await.is_err() {
                    break;
                }
            }
        }
    })
}

#[cfg(not(target_os = "linux"))]
pub fn listen(_settings: IrSettings) -> impl Stream<Item = Command> {
    iced::futures::stream::empty()
}

#[cfg(target_os = "linux")]
mod linux {
    use evdev::{EventType, InputEvent};
    use tokio::sync::mpsc::UnboundedSender;
    use tracing::{info, warn};

    use crate::ir::KeyPress;

    /// Forward scancodes from the named device until it fails or nobody listens
    pub fn read_presses(device_name: &str, tx: UnboundedSender<KeyPress>) {
        let Some((path, mut device)) =
            evdev::enumerate().find(|(_, device)| device.name() == Some(device_name))
        else {
            warn!(device = device_name, "IR receiver not found");
            return;
        };
        info!(device = device_name, path = %path.display(), "IR receiver found");

        loop {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "IR receiver read failed");
                    return;
                }
            };
            for press in events.filter_map(|event| key_press(&event)) {
                if tx.send(press).is_err() {
                    return;
                }
            }
        }
    }

    /// A remote button press, for `EV_MSC` events only
    ///
    /// The receiver also reports key and sync events; their values are not
    /// scancodes.
    pub fn key_press(event: &InputEvent) -> Option<KeyPress> {
        if event.event_type() != EventType::MISC {
            return None;
        }
        Some(KeyPress {
            scancode: event.value(),
            at: event.timestamp(),
        })
    }

}
