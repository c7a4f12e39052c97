use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ImageSetConfig;
use crate::error::{Error, Result};

/// Name of the per-set cache index file
pub const CACHE_INDEX_FILE: &str = "cacheIndex.json";

/// How a set gets its images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// No URL configured. Only `local/` is used, files are managed by hand.
    Simple,
    /// URL configured and web updates enabled
    Web,
    /// URL configured but web updates switched off. The cache is still shown.
    WebPaused,
}

/// On-disk layout and remote naming of one image set
///
/// Cheap to clone, so refresh tasks take a copy rather than borrowing the set.
#[derive(Debug, Clone)]
pub struct SetLayout {
    pub name: String,
    pub root: PathBuf,
    pub local_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub index_path: PathBuf,
    pub url_root: Option<String>,
    /// Accepted suffixes as configured, remote suffix first
    pub image_types: Vec<String>,
    pub remote_prefix: String,
    pub gap: u32,
    pub mode: SourceMode,
}

impl SetLayout {
    pub fn new(config: &ImageSetConfig, base_dir: &Path, web_enabled: bool) -> Self {
        let root = base_dir.join(&config.name);
        let url_root = config.url_root();
        let mode = match (&url_root, web_enabled && config.web) {
            (None, _) => SourceMode::Simple,
            (Some(_), true) => SourceMode::Web,
            (Some(_), false) => SourceMode::WebPaused,
        };

        SetLayout {
            name: config.name.clone(),
            local_dir: root.join("local"),
            cache_dir: root.join("cache"),
            staging_dir: root.join("staging"),
            index_path: root.join(CACHE_INDEX_FILE),
            root,
            url_root,
            image_types: config
                .image_types
                .iter()
                .map(|t| t.trim_start_matches('.').to_string())
                .collect(),
            remote_prefix: config.remote_prefix.clone(),
            gap: config.gap,
            mode,
        }
    }

    /// Create the directories this set uses
    ///
    /// Simple mode sets only get `local/`.
    pub fn create_dirs(&self) -> Result<()> {
        let mut dirs = vec![&self.root, &self.local_dir];
        if self.mode != SourceMode::Simple {
            dirs.push(&self.cache_dir);
            dirs.push(&self.staging_dir);
        }
        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }

    /// Image files directly inside `dir`, sorted by path
    ///
    /// In simple mode every directory except `local/` lists as empty.
    pub fn list_images(&self, dir: &Path) -> Vec<PathBuf> {
        if self.mode == SourceMode::Simple && dir != self.local_dir {
            return Vec::new();
        }
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| self.is_image(path))
            .collect();
        files.sort();
        files
    }

    /// Check a file name against the accepted suffixes (case-insensitive)
    pub fn is_image(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy();
                self.image_types.iter().any(|t| t.eq_ignore_ascii_case(&ext))
            }
            None => false,
        }
    }

    /// Playlist in display order: local content first, then the cache
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut images = self.list_images(&self.local_dir);
        images.extend(self.list_images(&self.cache_dir));
        images
    }

    /// Remote file name for a 1-based image number, e.g. `slides.007.png`
    ///
    /// The suffix keeps its configured case; web servers may be case-sensitive.
    pub fn remote_file_name(&self, number: u32) -> String {
        let suffix = self.image_types.first().map(String::as_str).unwrap_or("png");
        format!("{}{}.{:03}.{}", self.remote_prefix, self.name, number, suffix)
    }
}

/// A named image set and its playlist
#[derive(Debug, Clone)]
pub struct ImageSet {
    layout: SetLayout,
    /// Advance automatically when this set is selected
    pub auto: bool,
    pub randomise: bool,
    refresh_every: Duration,
    images: Vec<PathBuf>,
    index: usize,
    last_refresh: Option<DateTime<Utc>>,
    retry_after: Option<DateTime<Utc>>,
    refreshing: bool,
}

impl ImageSet {
    /// Set up the directories for a configured set and load whatever is
    /// already on disk, so something can be shown before the first refresh
    pub fn open(config: &ImageSetConfig, base_dir: &Path, web_enabled: bool) -> Result<Self> {
        let layout = SetLayout::new(config, base_dir, web_enabled);
        layout.create_dirs()?;

        let mut set = ImageSet {
            layout,
            auto: config.auto,
            randomise: config.randomise,
            refresh_every: Duration::minutes(config.refresh_mins as i64),
            images: Vec::new(),
            index: 0,
            last_refresh: None,
            retry_after: None,
            refreshing: false,
        };
        set.images = set.layout.scan();
        if set.randomise {
            set.shuffle();
        }
        debug!(
            set = %set.name(),
            mode = ?set.mode(),
            images = set.images.len(),
            "opened image set"
        );
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.layout.name
    }

    pub fn mode(&self) -> SourceMode {
        self.layout.mode
    }

    pub fn layout(&self) -> &SetLayout {
        &self.layout
    }

    #[cfg(test)]
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[cfg(test)]
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// The image to show, or `None` when the set is empty
    pub fn current_image(&self) -> Option<&Path> {
        self.images.get(self.index).map(PathBuf::as_path)
    }

    /// Replace the playlist after a refresh
    pub fn install(&mut self, images: Vec<PathBuf>, now: DateTime<Utc>) {
        self.images = images;
        self.index = 0;
        if self.randomise {
            self.shuffle();
        }
        self.last_refresh = Some(now);
        self.retry_after = None;
        self.refreshing = false;
    }

    pub fn begin_refresh(&mut self) {
        self.refreshing = true;
    }

    /// Record a failed refresh. The set is retried once `retry_delay` has passed.
    pub fn refresh_failed(&mut self, now: DateTime<Utc>, retry_delay: Duration) {
        self.refreshing = false;
        self.retry_after = Some(now + retry_delay);
    }

    /// Whether the set should be refreshed at `now`
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        if self.refreshing {
            return false;
        }
        if let Some(retry_after) = self.retry_after {
            return now >= retry_after;
        }
        match self.last_refresh {
            None => true,
            Some(last) => now - last >= self.refresh_every,
        }
    }

    /// Move to the next image, wrapping (and reshuffling) at the end
    pub fn advance(&mut self) -> Option<&Path> {
        if self.images.is_empty() {
            self.index = 0;
            return None;
        }
        if self.index + 1 < self.images.len() {
            self.index += 1;
        } else {
            self.index = 0;
            if self.randomise {
                self.shuffle();
            }
        }
        self.current_image()
    }

    /// Move to the previous image, wrapping (and reshuffling) at the start
    pub fn previous(&mut self) -> Option<&Path> {
        if self.images.is_empty() {
            self.index = 0;
            return None;
        }
        if self.index > 0 {
            self.index -= 1;
        } else {
            self.index = self.images.len() - 1;
            if self.randomise {
                self.shuffle();
            }
        }
        self.current_image()
    }

    /// Shuffle the playlist
    ///
    /// The new first image is never the image that ended the old order, so
    /// a wrap never shows the same picture twice in a row.
    pub fn shuffle(&mut self) {
        let count = self.images.len();
        if count < 2 {
            return;
        }
        let last_shown = self.images[count - 1].clone();
        let mut rng = rand::thread_rng();
        self.images.shuffle(&mut rng);
        if self.images[0] == last_shown {
            let swap_with = rng.gen_range(1..count);
            self.images.swap(0, swap_with);
        }
    }

    /// Restore sorted order, positioned at the first remote image
    ///
    /// Falls back to the first local image when the cache is empty.
    pub fn order(&mut self) {
        let local = self.layout.list_images(&self.layout.local_dir);
        self.index = local.len();
        self.images = local;
        self.images.extend(self.layout.list_images(&self.layout.cache_dir));
        if self.index >= self.images.len() {
            self.index = 0;
        }
    }
}

/// Open every configured set, logging the ones that cannot be set up
pub fn open_all(
    configs: &[ImageSetConfig],
    base_dir: &Path,
    web_enabled: bool,
) -> Result<Vec<ImageSet>> {
    let mut sets = Vec::with_capacity(configs.len());
    for config in configs {
        match ImageSet::open(config, base_dir, web_enabled) {
            Ok(set) => sets.push(set),
            Err(e) => {
                warn!(set = %config.name, error = %e, "skipping image set");
            }
        }
    }
    if sets.is_empty() {
        return Err(Error::InvalidConfig(
            "none of the configured image sets could be opened".to_string(),
        ));
    }
    Ok(sets)
}
