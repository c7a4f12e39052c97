use iced::futures::Stream;

use super::{PanelButton, PanelSettings};

/// Stream of button presses from the control panel
///
/// Ends quietly when there is no GPIO header, e.g. on a desktop.
#[cfg(target_os = "linux")]
pub fn listen(settings: PanelSettings) -> impl Stream<Item = PanelButton> {
    use iced::futures::channel::mpsc;
    use iced::futures::SinkExt;
    use tracing::info;

    iced::stream::channel(16, move |mut output: mpsc::Sender<PanelButton>| async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        // pins are polled, so the panel gets its own thread
        let _poller = tokio::task::spawn_blocking(move || linux::poll_panel(settings, tx));

        while let Some(button) = rx.recv().await {
            info!(?button, "panel button");
            if output.send(button).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(not(target_os = "linux"))]
pub fn listen(_settings: PanelSettings) -> impl Stream<Item = PanelButton> {
    iced::futures::stream::empty()
}

#[cfg(target_os = "linux")]
mod linux {
    use rppal::gpio::Gpio;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc::UnboundedSender;
    use tracing::{debug, warn};

    use crate::panel::{ButtonTracker, PanelButton, PanelSettings, POLL_INTERVAL};

    /// Sample both buttons and mirror the LED until nobody listens
    pub fn poll_panel(settings: PanelSettings, tx: UnboundedSender<PanelButton>) {
        if let Err(e) = run(settings, &tx) {
            warn!(error = %e, "GPIO control panel unavailable");
        }
    }

    fn run(settings: PanelSettings, tx: &UnboundedSender<PanelButton>) -> rppal::gpio::Result<()> {
        let gpio = Gpio::new()?;
        let mode_pin = gpio.get(settings.mode_pin)?.into_input_pullup();
        let advance_pin = gpio.get(settings.advance_pin)?.into_input_pullup();
        let mut led = gpio.get(settings.led_pin)?.into_output_low();
        debug!(
            mode = settings.mode_pin,
            advance = settings.advance_pin,
            led = settings.led_pin,
            "GPIO control panel ready"
        );

        let mut mode = ButtonTracker::new(settings.hold);
        let mut advance = ButtonTracker::new(Duration::ZERO);
        let mut lit = false;

        while !tx.is_closed() {
            let now = Instant::now();
            if mode.sample(mode_pin.is_low(), now) && tx.send(PanelButton::Mode).is_err() {
                break;
            }
            if advance.sample(advance_pin.is_low(), now) && tx.send(PanelButton::Advance).is_err()
            {
                break;
            }

            let wanted = *settings.led.borrow();
            if wanted != lit {
                if wanted {
                    led.set_high();
                } else {
                    led.set_low();
                }
                lit = wanted;
            }

            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}
