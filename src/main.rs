use chrono::Utc;
use clap::{Parser, Subcommand};
use iced::keyboard::{self, key::Named, Key, Modifiers};
use iced::{time, window, Element, Subscription, Task, Theme};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod config;
mod error;
mod ir;
mod logging;
mod panel;
mod state;
mod sync;
mod ui;

use config::Config;
use error::{Error, Result};
use ir::IrSettings;
use panel::{PanelButton, PanelSettings};
use state::image_set::{self, ImageSet, SourceMode};
use state::show::{Command, Show};
use sync::remote::HttpRemote;
use sync::{SyncReport, Syncer};

/// Raspberry Pi slideshow for local and web sourced image sets
#[derive(Debug, Parser)]
#[command(name = "tbashow", version)]
struct Cli {
    /// Directory holding config3.json, splash.png and one directory per image set
    /// [default: ~/Code/SlideShow]
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Config file [default: <base-dir>/config3.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run in a window of `displaySize` instead of full screen
    #[arg(long, global = true)]
    windowed: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run the slideshow (the default)
    Show,
    /// Refresh image sets once without opening the display
    Sync {
        /// Only refresh this set
        #[arg(long)]
        set: Option<String>,
    },
    /// Print the configured image sets and what they hold
    List,
}

/// Main application state
struct Slideshow {
    show: Show,
    syncer: Syncer,
    title: String,
    /// Shown when the current set is empty
    splash: Option<PathBuf>,
    interval: Duration,
    retry_delay: chrono::Duration,
    ir: IrSettings,
    /// `None` when `gpioPanel` is off
    panel: Option<PanelSettings>,
    /// Mode LED state, lit in manual mode
    led: watch::Sender<bool>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// Auto-advance timer fired
    Tick,
    /// IR remote or keyboard control
    Control(Command),
    /// Control panel button
    Panel(PanelButton),
    /// Background refresh of the set at this index finished
    Refreshed(usize, std::result::Result<SyncReport, String>),
}

impl Slideshow {
    /// Refresh every set once, then go full screen
    fn new(mut slideshow: Slideshow, fullscreen: bool) -> (Self, Task<Message>) {
        let count = slideshow.show.sets().len();
        let mut tasks: Vec<Task<Message>> =
            (0..count).map(|index| slideshow.start_refresh(index)).collect();

        if fullscreen {
            tasks.push(
                window::get_latest()
                    .and_then(|id| window::change_mode(id, window::Mode::Fullscreen)),
            );
        }

        (slideshow, Task::batch(tasks))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        let task = match message {
            Message::Tick => {
                let refresh = self.refresh_if_due();
                self.show.tick();
                refresh
            }
            Message::Control(command) => self.control(command),
            Message::Panel(button) => match panel::command_for(button, self.show.is_auto()) {
                Some(command) => self.control(command),
                None => {
                    debug!(?button, "ignored in auto mode");
                    Task::none()
                }
            },
            Message::Refreshed(index, result) => {
                let now = Utc::now();
                let retry_delay = self.retry_delay;
                if let Some(set) = self.show.set_mut(index) {
                    match result {
                        Ok(report) => {
                            info!(
                                set = %report.set,
                                fetched = report.fetched,
                                images = report.images.len(),
                                "image set refreshed"
                            );
                            set.install(report.images, now);
                        }
                        Err(e) => {
                            warn!(set = %set.name(), error = %e, "unable to refresh image set");
                            set.refresh_failed(now, retry_delay);
                        }
                    }
                }
                Task::none()
            }
        };
        self.led.send_replace(!self.show.is_auto());
        task
    }

    fn control(&mut self, command: Command) -> Task<Message> {
        let refresh = match command {
            Command::Next | Command::Previous => self.refresh_if_due(),
            _ => Task::none(),
        };
        self.show.apply(command);
        refresh
    }

    fn view(&self) -> Element<'_, Message> {
        ui::slide(
            self.show.current_image(),
            self.splash.as_deref(),
            &self.title,
        )
    }

    fn subscription(&self) -> Subscription<Message> {
        let remote = Subscription::run_with_id(
            ("ir-remote", self.ir.device_name.clone()),
            ir::listen(self.ir.clone()),
        )
        .map(Message::Control);

        let mut subscriptions = vec![
            time::every(self.interval).map(|_| Message::Tick),
            keyboard::on_key_press(key_command),
            remote,
        ];
        if let Some(settings) = &self.panel {
            subscriptions.push(
                Subscription::run_with_id(settings.id(), panel::listen(settings.clone()))
                    .map(Message::Panel),
            );
        }
        Subscription::batch(subscriptions)
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    /// Kick off a background refresh of one set
    fn start_refresh(&mut self, index: usize) -> Task<Message> {
        let Some(set) = self.show.set_mut(index) else {
            return Task::none();
        };
        set.begin_refresh();
        let layout = set.layout().clone();
        let syncer = self.syncer.clone();

        Task::perform(
            async move { syncer.refresh(&layout).await.map_err(|e| e.to_string()) },
            move |result| Message::Refreshed(index, result),
        )
    }

    /// Refresh the current set if it is due (auto mode only)
    fn refresh_if_due(&mut self) -> Task<Message> {
        match self.show.due_for_refresh(Utc::now()) {
            Some(index) => self.start_refresh(index),
            None => Task::none(),
        }
    }
}

/// Keyboard equivalents of the remote's buttons
fn key_command(key: Key, _modifiers: Modifiers) -> Option<Message> {
    let command = match key.as_ref() {
        Key::Named(Named::ArrowRight) | Key::Named(Named::Space) => Command::Next,
        Key::Named(Named::ArrowLeft) => Command::Previous,
        Key::Named(Named::ArrowUp) => Command::NextSet,
        Key::Named(Named::ArrowDown) => Command::PreviousSet,
        Key::Character("m") | Key::Character("M") => Command::Mode,
        _ => return None,
    };
    Some(Message::Control(command))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tbashow: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => config::default_base_dir()?,
    };
    let config_path = cli
        .config
        .unwrap_or_else(|| base_dir.join(config::CONFIG_FILE));

    // the log level lives in the config, so logging starts once it is read
    let loaded = Config::load(&config_path);
    logging::init(loaded.as_ref().map(|c| c.log_level).unwrap_or(2));
    let config = loaded?;
    info!(path = %config_path.display(), sets = config.image_sets.len(), "loaded config file");

    match cli.command.unwrap_or(CliCommand::Show) {
        CliCommand::Show => run_show(config, base_dir, !cli.windowed),
        CliCommand::Sync { set } => run_sync(&config, &base_dir, set.as_deref()),
        CliCommand::List => list_sets(&config, &base_dir),
    }
}

fn build_syncer(config: &Config) -> Result<Syncer> {
    let probe = Some(config.connectivity_probe.trim().to_string()).filter(|p| !p.is_empty());
    Ok(Syncer::new(Arc::new(HttpRemote::new()?), probe))
}

fn run_show(config: Config, base_dir: PathBuf, fullscreen: bool) -> Result<()> {
    if !config.web_updates {
        warn!("web updates are disabled, web image sets will show their cache only");
    }
    let sets = image_set::open_all(&config.image_sets, &base_dir, config.web_updates)?;
    let show = Show::new(sets)?;
    let (led, led_state) = watch::channel(!show.is_auto());

    let splash = Some(base_dir.join(config::SPLASH_FILE)).filter(|path| path.is_file());
    if splash.is_none() {
        warn!(dir = %base_dir.display(), "no splash image found");
    }

    let slideshow = Slideshow {
        show,
        syncer: build_syncer(&config)?,
        title: config.app_title.clone(),
        splash,
        interval: config.display_interval(),
        retry_delay: config.retry_delay(),
        ir: IrSettings {
            device_name: config.ir_device.clone(),
            debounce: config.ir_debounce(),
            keymap: config.keymap()?,
        },
        panel: config.gpio_panel.then(|| PanelSettings {
            mode_pin: config.mode_button_pin,
            advance_pin: config.advance_button_pin,
            led_pin: config.mode_led_pin,
            hold: config.mode_hold(),
            led: led_state,
        }),
        led,
    };

    let [width, height] = config.display_size;
    info!(title = %config.app_title, fullscreen, "starting slideshow");

    iced::application(Slideshow::title, Slideshow::update, Slideshow::view)
        .subscription(Slideshow::subscription)
        .theme(Slideshow::theme)
        .window_size((width as f32, height as f32))
        .run_with(move || Slideshow::new(slideshow, fullscreen))?;

    Ok(())
}

/// Headless refresh, for cron jobs and for seeding a new frame over ssh
fn run_sync(config: &Config, base_dir: &Path, only: Option<&str>) -> Result<()> {
    if let Some(name) = only {
        if !config.image_sets.iter().any(|set| set.name == name) {
            return Err(Error::UnknownSet(name.to_string()));
        }
    }

    let syncer = build_syncer(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;

    runtime.block_on(async {
        let selected = config
            .image_sets
            .iter()
            .filter(|set| only.map_or(true, |name| name == set.name));

        for set_config in selected {
            let set = ImageSet::open(set_config, base_dir, config.web_updates)?;
            match syncer.refresh(set.layout()).await {
                Ok(report) => println!(
                    "{}: {} images ({} new, {} updated, {} unchanged, {} deleted)",
                    report.set,
                    report.images.len(),
                    report.new,
                    report.updated,
                    report.unchanged,
                    report.deleted
                ),
                Err(e) => {
                    warn!(set = %set.name(), error = %e, "refresh failed");
                    println!("{}: refresh failed: {}", set.name(), e);
                }
            }
        }
        Ok::<(), Error>(())
    })
}

fn list_sets(config: &Config, base_dir: &Path) -> Result<()> {
    println!("{} ({})", config.app_title, base_dir.display());
    for set_config in &config.image_sets {
        let set = ImageSet::open(set_config, base_dir, config.web_updates)?;
        let mode = match set.mode() {
            SourceMode::Simple => "simple",
            SourceMode::Web => "web",
            SourceMode::WebPaused => "web (paused)",
        };
        println!(
            "  {:<16} {:<13} auto={} randomise={} images={}",
            set.name(),
            mode,
            yes_no(set.auto),
            yes_no(set.randomise),
            set.image_count()
        );
        if let Some(url) = &set.layout().url_root {
            println!("  {:<16} {}", "", url);
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Y"
    } else {
        "N"
    }
}
