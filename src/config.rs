/// Slideshow configuration
///
/// Loaded once at startup from `config3.json` in the base directory and
/// read-only afterwards. Every key except `imageSets` has a default, so a
/// minimal config only needs to name its image sets:
///
/// ```json
/// { "imageSets": [ { "name": "slides" } ] }
/// ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::state::show::Command;

/// Name of the config file inside the base directory
pub const CONFIG_FILE: &str = "config3.json";

/// Name of the splash image shown when a set has nothing to display
pub const SPLASH_FILE: &str = "splash.png";

/// Top level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Image sets in display order (at least one)
    pub image_sets: Vec<ImageSetConfig>,

    #[serde(default = "default_title")]
    pub app_title: String,

    /// 0 verbose, 1 info, 2 warning, 3 fatal only
    #[serde(default = "default_log_level")]
    pub log_level: u8,

    #[serde(rename = "displayIntervalMS", default = "default_interval_ms")]
    pub display_interval_ms: u64,

    /// Delay before retrying a web refresh that failed or found no network
    #[serde(default = "default_remote_update_mins")]
    pub remote_update_mins: u64,

    #[serde(default = "default_display_size")]
    pub display_size: [u32; 2],

    /// Global switch for web updates. When off, web sets show their cache only.
    #[serde(default = "yes", deserialize_with = "flag")]
    pub web_updates: bool,

    /// `host:port` used to decide whether the network is up
    #[serde(default = "default_probe")]
    pub connectivity_probe: String,

    /// evdev device name of the IR receiver
    #[serde(default = "default_ir_device")]
    pub ir_device: String,

    #[serde(rename = "irDebounceMS", default = "default_ir_debounce_ms")]
    pub ir_debounce_ms: u64,

    /// Scancode to command overrides, merged over the built-in map
    #[serde(default)]
    pub ir_keymap: BTreeMap<String, Command>,

    /// Use the GPIO buttons and mode LED of the frame's control panel
    #[serde(default = "yes", deserialize_with = "flag")]
    pub gpio_panel: bool,

    /// BCM pin numbers of the control panel
    #[serde(default = "default_mode_button_pin")]
    pub mode_button_pin: u8,

    #[serde(default = "default_advance_button_pin")]
    pub advance_button_pin: u8,

    #[serde(default = "default_mode_led_pin")]
    pub mode_led_pin: u8,

    /// How long the mode button must be held before it acts
    #[serde(rename = "modeHoldMS", default = "default_mode_hold_ms")]
    pub mode_hold_ms: u64,
}

/// One entry of `imageSets`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetConfig {
    pub name: String,

    /// Remote URL root. Absent means simple mode.
    #[serde(rename = "URL", default)]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "flag")]
    pub randomise: bool,

    #[serde(default = "yes", deserialize_with = "flag")]
    pub auto: bool,

    #[serde(default = "default_refresh_mins")]
    pub refresh_mins: u64,

    /// Per-set switch for web updates
    #[serde(default = "yes", deserialize_with = "flag")]
    pub web: bool,

    /// Accepted suffixes. The first one names the remote files.
    #[serde(default = "default_image_types")]
    pub image_types: Vec<String>,

    /// Missing remote indices tolerated before a scan stops
    #[serde(default = "default_gap")]
    pub gap: u32,

    #[serde(default)]
    pub remote_prefix: String,
}

fn default_title() -> String {
    "Slide Show".to_string()
}

fn default_log_level() -> u8 {
    2
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_remote_update_mins() -> u64 {
    5
}

fn default_display_size() -> [u32; 2] {
    [1600, 900]
}

fn default_probe() -> String {
    "8.8.8.8:53".to_string()
}

fn default_ir_device() -> String {
    "gpio_ir_recv".to_string()
}

fn default_ir_debounce_ms() -> u64 {
    1000
}

fn default_mode_button_pin() -> u8 {
    25
}

fn default_advance_button_pin() -> u8 {
    7
}

fn default_mode_led_pin() -> u8 {
    27
}

fn default_mode_hold_ms() -> u64 {
    1000
}

fn default_refresh_mins() -> u64 {
    20
}

fn default_image_types() -> Vec<String> {
    vec!["png".to_string()]
}

fn default_gap() -> u32 {
    5
}

fn yes() -> bool {
    true
}

/// Accepts the historical "Y"/"N" strings as well as JSON booleans
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => match text.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" | "TRUE" => Ok(true),
            "N" | "NO" | "FALSE" => Ok(false),
            other => Err(D::Error::custom(format!("expected Y or N, found '{}'", other))),
        },
    }
}

/// Default base directory: `~/Code/SlideShow`
pub fn default_base_dir() -> Result<PathBuf> {
    let mut path = dirs::home_dir().ok_or(Error::NoHomeDir)?;
    path.push("Code");
    path.push("SlideShow");
    Ok(path)
}

impl Config {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.image_sets.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one image set must be configured".to_string(),
            ));
        }
        if self.log_level > 3 {
            return Err(Error::InvalidConfig(format!(
                "logLevel must be between 0 and 3, found {}",
                self.log_level
            )));
        }
        if self.display_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "displayIntervalMS must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for set in &self.image_sets {
            if set.name.trim().is_empty() {
                return Err(Error::InvalidConfig("image set name is empty".to_string()));
            }
            if set.name.contains(&['/', '\\'][..]) || set.name == "." || set.name == ".." {
                return Err(Error::InvalidConfig(format!(
                    "image set name '{}' is not a valid directory name",
                    set.name
                )));
            }
            if !names.insert(set.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "image set '{}' is configured more than once",
                    set.name
                )));
            }
            if set.image_types.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "image set '{}' has no imageTypes",
                    set.name
                )));
            }
        }

        let pins = [self.mode_button_pin, self.advance_button_pin, self.mode_led_pin];
        if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
            return Err(Error::InvalidConfig(format!(
                "control panel pins must differ, found {:?}",
                pins
            )));
        }

        // surfaces bad scancodes now rather than when the receiver appears
        self.keymap()?;
        Ok(())
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms)
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.remote_update_mins as i64)
    }

    pub fn ir_debounce(&self) -> Duration {
        Duration::from_millis(self.ir_debounce_ms)
    }

    pub fn mode_hold(&self) -> Duration {
        Duration::from_millis(self.mode_hold_ms)
    }

    /// Built-in IR map with `irKeymap` overrides applied
    pub fn keymap(&self) -> Result<HashMap<i32, Command>> {
        let mut map = crate::ir::default_keymap();
        for (code, command) in &self.ir_keymap {
            let code: i32 = code.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("irKeymap key '{}' is not a scancode", code))
            })?;
            map.insert(code, *command);
        }
        Ok(map)
    }
}

impl ImageSetConfig {
    /// The URL root, normalised to end with a slash. `None` in simple mode.
    pub fn url_root(&self) -> Option<String> {
        let url = self.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        if url.ends_with('/') {
            Some(url.to_string())
        } else {
            Some(format!("{}/", url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Config {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(r#"{ "imageSets": [ { "name": "slides" } ] }"#);
        config.validate().unwrap();

        assert_eq!(config.app_title, "Slide Show");
        assert_eq!(config.log_level, 2);
        assert_eq!(config.display_interval_ms, 30_000);
        assert_eq!(config.remote_update_mins, 5);
        assert_eq!(config.display_size, [1600, 900]);
        assert!(config.web_updates);
        assert_eq!(config.ir_device, "gpio_ir_recv");
        assert!(config.gpio_panel);
        assert_eq!(config.mode_button_pin, 25);
        assert_eq!(config.advance_button_pin, 7);
        assert_eq!(config.mode_led_pin, 27);
        assert_eq!(config.mode_hold(), Duration::from_secs(1));

        let set = &config.image_sets[0];
        assert_eq!(set.url_root(), None);
        assert!(!set.randomise);
        assert!(set.auto);
        assert!(set.web);
        assert_eq!(set.refresh_mins, 20);
        assert_eq!(set.image_types, vec!["png".to_string()]);
        assert_eq!(set.gap, 5);
        assert_eq!(set.remote_prefix, "");
    }

    #[test]
    fn test_yes_no_flags() {
        let config = parse(
            r#"{ "imageSets": [
                { "name": "a", "randomise": "Y", "auto": "n", "web": false },
                { "name": "b", "randomise": true, "auto": "y" }
            ] }"#,
        );
        assert!(config.image_sets[0].randomise);
        assert!(!config.image_sets[0].auto);
        assert!(!config.image_sets[0].web);
        assert!(config.image_sets[1].randomise);
        assert!(config.image_sets[1].auto);
    }

    #[test]
    fn test_bad_flag_is_rejected() {
        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{ "imageSets": [ { "name": "a", "auto": "maybe" } ] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_url_root_is_normalised() {
        let config = parse(
            r#"{ "imageSets": [
                { "name": "a", "URL": "http://example.com/pics" },
                { "name": "b", "URL": "http://example.com/pics/" },
                { "name": "c", "URL": "  " }
            ] }"#,
        );
        assert_eq!(
            config.image_sets[0].url_root().as_deref(),
            Some("http://example.com/pics/")
        );
        assert_eq!(
            config.image_sets[1].url_root().as_deref(),
            Some("http://example.com/pics/")
        );
        assert_eq!(config.image_sets[2].url_root(), None);
    }

    #[test]
    fn test_validation_failures() {
        let empty = parse(r#"{ "imageSets": [] }"#);
        assert!(matches!(empty.validate(), Err(Error::InvalidConfig(_))));

        let duplicate = parse(r#"{ "imageSets": [ { "name": "a" }, { "name": "a" } ] }"#);
        assert!(matches!(duplicate.validate(), Err(Error::InvalidConfig(_))));

        let traversal = parse(r#"{ "imageSets": [ { "name": "../etc" } ] }"#);
        assert!(matches!(traversal.validate(), Err(Error::InvalidConfig(_))));

        let no_types = parse(r#"{ "imageSets": [ { "name": "a", "imageTypes": [] } ] }"#);
        assert!(matches!(no_types.validate(), Err(Error::InvalidConfig(_))));

        let level = parse(r#"{ "imageSets": [ { "name": "a" } ], "logLevel": 7 }"#);
        assert!(matches!(level.validate(), Err(Error::InvalidConfig(_))));

        let keymap = parse(r#"{ "imageSets": [ { "name": "a" } ], "irKeymap": { "ok": "next" } }"#);
        assert!(matches!(keymap.validate(), Err(Error::InvalidConfig(_))));

        let pins = parse(r#"{ "imageSets": [ { "name": "a" } ], "modeLedPin": 7 }"#);
        assert!(matches!(pins.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_image_sets_is_a_parse_error() {
        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{ "appTitle": "x" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_keymap_overrides_defaults() {
        let config = parse(
            r#"{
                "imageSets": [ { "name": "a" } ],
                "irKeymap": { "70": "previous", "12": "mode" }
            }"#,
        );
        let map = config.keymap().unwrap();
        assert_eq!(map.get(&70), Some(&Command::Previous));
        assert_eq!(map.get(&12), Some(&Command::Mode));
        assert_eq!(map.get(&67), Some(&Command::NextSet));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "appTitle": "Club",
                "imageSets": [ { "name": "teaching", "URL": "http://example.com/" } ]
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.app_title, "Club");
        assert_eq!(config.image_sets[0].name, "teaching");

        let missing = Config::load(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::ConfigRead { .. })));
    }
}
