/// Image set refreshes
///
/// This module handles:
/// - The persisted cache index (index.rs)
/// - Remote repository access over HTTP (remote.rs)
/// - The network connectivity probe (network.rs)
/// - The staging/cache synchronisation pass for web sets (this file)

pub mod index;
pub mod network;
pub mod remote;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::image_set::{SetLayout, SourceMode};
use index::CacheIndex;
use remote::{Probe, Remote};

/// What one refresh did to a set
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub set: String,
    /// Whether the remote was consulted (false for simple and paused sets)
    pub fetched: bool,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// The set's playlist after the refresh, local content first
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheStatus {
    UpToDate,
    Updated,
    New,
    Deleted,
}

#[derive(Debug)]
struct Planned {
    status: CacheStatus,
    last_modified: Option<String>,
}

/// Runs refreshes against a remote repository
#[derive(Clone)]
pub struct Syncer {
    remote: Arc<dyn Remote>,
    /// `host:port` checked before touching the remote. `None` skips the check.
    probe: Option<String>,
}

impl Syncer {
    pub fn new(remote: Arc<dyn Remote>, probe: Option<String>) -> Self {
        Self { remote, probe }
    }

    /// Refresh one set and return its new playlist
    ///
    /// Simple and paused sets are rescanned from disk only.
    pub async fn refresh(&self, layout: &SetLayout) -> Result<SyncReport> {
        match (layout.mode, layout.url_root.as_deref()) {
            (SourceMode::Web, Some(url_root)) => self.sync_web(layout, url_root).await,
            _ => {
                let images = layout.scan();
                debug!(set = %layout.name, images = images.len(), "rescanned");
                Ok(SyncReport {
                    set: layout.name.clone(),
                    images,
                    ..SyncReport::default()
                })
            }
        }
    }

    async fn sync_web(&self, layout: &SetLayout, url_root: &str) -> Result<SyncReport> {
        if let Some(probe) = &self.probe {
            if !network::is_connected(probe, network::PROBE_TIMEOUT).await {
                return Err(Error::Offline);
            }
        }

        clear_staging(layout).await?;

        let old_index = CacheIndex::load(&layout.index_path);
        if old_index.is_empty() {
            debug!(set = %layout.name, "no cache index, every remote image is new");
        } else {
            debug!(set = %layout.name, entries = old_index.len(), "loaded cache index");
        }
        let cached: HashSet<String> = layout
            .list_images(&layout.cache_dir)
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect();

        let mut plan: BTreeMap<String, Planned> = BTreeMap::new();
        let mut misses = 0u32;
        let mut number = 1u32;

        // misses are counted over the whole scan, not just consecutive ones
        while misses <= layout.gap {
            let file_name = layout.remote_file_name(number);
            let url = format!("{}{}", url_root, file_name);
            number += 1;
            debug!(%url, "looking for remote image");

            let probe = match self.remote.head(&url).await {
                Ok(probe) => probe,
                Err(e) => {
                    warn!(%url, error = %e, "request failed");
                    Probe::Missing
                }
            };

            let last_modified = match probe {
                Probe::Found { last_modified } => last_modified,
                Probe::Missing => {
                    misses += 1;
                    if old_index.contains(&file_name) || cached.contains(&file_name) {
                        plan.insert(
                            file_name,
                            Planned {
                                status: CacheStatus::Deleted,
                                last_modified: None,
                            },
                        );
                    }
                    continue;
                }
            };

            let previous = old_index.get(&file_name).map(|e| e.last_modified.clone());
            let status = match (&previous, &last_modified) {
                (Some(Some(old)), Some(new)) if old == new && cached.contains(&file_name) => {
                    CacheStatus::UpToDate
                }
                // a stored entry without a date still differs from a dated one
                (Some(_), Some(_)) if cached.contains(&file_name) => CacheStatus::Updated,
                _ => CacheStatus::New,
            };

            if status == CacheStatus::UpToDate {
                plan.insert(file_name, Planned { status, last_modified });
                continue;
            }

            let staged = layout.staging_dir.join(&file_name);
            match self.download(&url, &staged).await {
                Ok(()) => {
                    plan.insert(file_name, Planned { status, last_modified });
                }
                Err(e) => {
                    warn!(%url, error = %e, "download failed");
                    misses += 1;
                    // keep serving the copy we already have
                    if status == CacheStatus::Updated {
                        plan.insert(
                            file_name,
                            Planned {
                                status: CacheStatus::UpToDate,
                                last_modified: previous.flatten(),
                            },
                        );
                    }
                }
            }
        }

        for name in &cached {
            plan.entry(name.clone()).or_insert(Planned {
                status: CacheStatus::Deleted,
                last_modified: None,
            });
        }

        let mut report = SyncReport {
            set: layout.name.clone(),
            fetched: true,
            ..SyncReport::default()
        };
        let mut new_index = CacheIndex::new();

        for (name, planned) in plan {
            let staged = layout.staging_dir.join(&name);
            let cached_path = layout.cache_dir.join(&name);
            match planned.status {
                CacheStatus::New | CacheStatus::Updated => {
                    tokio::fs::copy(&staged, &cached_path)
                        .await
                        .map_err(|e| Error::io(&cached_path, e))?;
                    if planned.status == CacheStatus::New {
                        report.new += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                CacheStatus::Deleted => {
                    remove_if_present(&cached_path).await?;
                    report.deleted += 1;
                    continue;
                }
                CacheStatus::UpToDate => report.unchanged += 1,
            }
            new_index.insert(name, planned.last_modified);
        }

        if let Err(e) = new_index.save(&layout.index_path) {
            warn!(error = %e, "unable to write cache index");
        }

        report.images = layout.scan();
        info!(
            set = %report.set,
            new = report.new,
            updated = report.updated,
            unchanged = report.unchanged,
            deleted = report.deleted,
            images = report.images.len(),
            "image set synchronised"
        );
        Ok(report)
    }

    /// Fetch one file into staging, rejecting anything that is not an image
    async fn download(&self, url: &str, staged: &Path) -> Result<()> {
        let bytes = self.remote.get(url).await?;
        if image::guess_format(&bytes).is_err() {
            return Err(Error::NotAnImage(url.to_string()));
        }
        tokio::fs::write(staged, &bytes)
            .await
            .map_err(|e| Error::io(staged, e))
    }
}

/// Delete image files left in staging by the previous pass
async fn clear_staging(layout: &SetLayout) -> Result<()> {
    for path in layout.list_images(&layout.staging_dir) {
        remove_if_present(&path).await?;
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSetConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// In-memory remote: url -> (last modified, body)
    #[derive(Default)]
    struct FakeRemote {
        files: Mutex<HashMap<String, (Option<String>, Vec<u8>)>>,
        broken_gets: Mutex<HashSet<String>>,
        gets: Mutex<Vec<String>>,
    }

    impl FakeRemote {
        fn put(&self, url: &str, last_modified: Option<&str>, body: &[u8]) {
            self.files.lock().unwrap().insert(
                url.to_string(),
                (last_modified.map(str::to_string), body.to_vec()),
            );
        }

        fn remove(&self, url: &str) {
            self.files.lock().unwrap().remove(url);
        }

        fn break_get(&self, url: &str) {
            self.broken_gets.lock().unwrap().insert(url.to_string());
        }

        fn take_gets(&self) -> Vec<String> {
            std::mem::take(&mut *self.gets.lock().unwrap())
        }
    }

    #[async_trait]
    impl Remote for FakeRemote {
        async fn head(&self, url: &str) -> Result<Probe> {
            Ok(match self.files.lock().unwrap().get(url) {
                Some((last_modified, _)) => Probe::Found {
                    last_modified: last_modified.clone(),
                },
                None => Probe::Missing,
            })
        }

        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.gets.lock().unwrap().push(url.to_string());
            if self.broken_gets.lock().unwrap().contains(url) {
                return Err(Error::HttpStatus {
                    url: url.to_string(),
                    status: 503,
                });
            }
            self.files
                .lock()
                .unwrap()
                .get(url)
                .map(|(_, body)| body.clone())
                .ok_or_else(|| Error::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    const ROOT: &str = "http://example.com/pics/";

    fn url(number: u32) -> String {
        format!("{}show.{:03}.png", ROOT, number)
    }

    fn setup(gap: u32) -> (tempfile::TempDir, SetLayout, Arc<FakeRemote>, Syncer) {
        let base = tempfile::tempdir().unwrap();
        let config: ImageSetConfig = serde_json::from_str(&format!(
            r#"{{ "name": "show", "URL": "{}", "gap": {} }}"#,
            ROOT, gap
        ))
        .unwrap();
        let layout = SetLayout::new(&config, base.path(), true);
        layout.create_dirs().unwrap();
        let remote = Arc::new(FakeRemote::default());
        let syncer = Syncer::new(remote.clone(), None);
        (base, layout, remote, syncer)
    }

    fn cached_names(layout: &SetLayout) -> Vec<String> {
        layout
            .list_images(&layout.cache_dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_first_sync_downloads_everything() {
        let (_base, layout, remote, syncer) = setup(2);
        remote.put(&url(1), Some("Mon"), PNG);
        remote.put(&url(2), Some("Mon"), PNG);
        remote.put(&url(4), None, PNG);

        let report = syncer.refresh(&layout).await.unwrap();
        assert!(report.fetched);
        assert_eq!(report.new, 3);
        assert_eq!(cached_names(&layout), vec!["show.001.png", "show.002.png", "show.004.png"]);
        assert_eq!(report.images.len(), 3);

        let index = CacheIndex::load(&layout.index_path);
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.get("show.001.png").unwrap().last_modified.as_deref(),
            Some("Mon")
        );
    }

    #[tokio::test]
    async fn test_unchanged_files_are_not_downloaded_again() {
        let (_base, layout, remote, syncer) = setup(1);
        remote.put(&url(1), Some("Mon"), PNG);
        remote.put(&url(2), Some("Mon"), PNG);
        syncer.refresh(&layout).await.unwrap();
        remote.take_gets();

        remote.put(&url(2), Some("Tue"), PNG);
        let report = syncer.refresh(&layout).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(remote.take_gets(), vec![url(2)]);
        assert_eq!(
            CacheIndex::load(&layout.index_path)
                .get("show.002.png")
                .unwrap()
                .last_modified
                .as_deref(),
            Some("Tue")
        );
    }

    #[tokio::test]
    async fn test_missing_last_modified_always_reloads() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), None, PNG);
        syncer.refresh(&layout).await.unwrap();
        remote.take_gets();

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(remote.take_gets(), vec![url(1)]);
    }

    #[tokio::test]
    async fn test_removed_remote_files_leave_the_cache() {
        let (_base, layout, remote, syncer) = setup(1);
        remote.put(&url(1), Some("Mon"), PNG);
        remote.put(&url(2), Some("Mon"), PNG);
        syncer.refresh(&layout).await.unwrap();

        remote.remove(&url(2));
        let report = syncer.refresh(&layout).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
        assert!(!CacheIndex::load(&layout.index_path).contains("show.002.png"));
    }

    #[tokio::test]
    async fn test_stray_cache_files_beyond_the_scan_are_deleted() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), Some("Mon"), PNG);
        std::fs::write(layout.cache_dir.join("show.050.png"), PNG).unwrap();

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
    }

    #[tokio::test]
    async fn test_gap_limits_the_scan() {
        let (_base, layout, remote, syncer) = setup(1);
        remote.put(&url(1), Some("Mon"), PNG);
        // 2 and 3 missing: the second miss exceeds a gap of 1
        remote.put(&url(4), Some("Mon"), PNG);

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_the_old_copy() {
        let (_base, layout, remote, syncer) = setup(1);
        remote.put(&url(1), Some("Mon"), PNG);
        syncer.refresh(&layout).await.unwrap();

        remote.put(&url(1), Some("Tue"), PNG);
        remote.break_get(&url(1));
        let report = syncer.refresh(&layout).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
        assert_eq!(
            CacheIndex::load(&layout.index_path)
                .get("show.001.png")
                .unwrap()
                .last_modified
                .as_deref(),
            Some("Mon")
        );
    }

    #[tokio::test]
    async fn test_failed_update_of_undated_entry_keeps_the_old_copy() {
        let (_base, layout, remote, syncer) = setup(1);
        remote.put(&url(1), None, PNG);
        syncer.refresh(&layout).await.unwrap();

        remote.put(&url(1), Some("Tue"), PNG);
        remote.break_get(&url(1));
        let report = syncer.refresh(&layout).await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
        assert!(CacheIndex::load(&layout.index_path)
            .get("show.001.png")
            .unwrap()
            .last_modified
            .is_none());
    }

    #[tokio::test]
    async fn test_dated_update_of_undated_entry_counts_as_updated() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), None, PNG);
        syncer.refresh(&layout).await.unwrap();

        remote.put(&url(1), Some("Tue"), PNG);
        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.new, 0);
    }

    #[tokio::test]
    async fn test_non_image_payload_is_rejected() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), Some("Mon"), b"<html>moved</html>");

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.new, 0);
        assert!(cached_names(&layout).is_empty());
    }

    #[tokio::test]
    async fn test_lost_cache_file_is_fetched_again() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), Some("Mon"), PNG);
        syncer.refresh(&layout).await.unwrap();
        std::fs::remove_file(layout.cache_dir.join("show.001.png")).unwrap();

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.new, 1);
        assert_eq!(cached_names(&layout), vec!["show.001.png"]);
    }

    #[tokio::test]
    async fn test_staging_is_cleared_each_pass() {
        let (_base, layout, _remote, syncer) = setup(0);
        std::fs::write(layout.staging_dir.join("left.png"), PNG).unwrap();
        syncer.refresh(&layout).await.unwrap();
        assert!(layout.list_images(&layout.staging_dir).is_empty());
    }

    #[tokio::test]
    async fn test_local_content_comes_first() {
        let (_base, layout, remote, syncer) = setup(0);
        remote.put(&url(1), Some("Mon"), PNG);
        std::fs::write(layout.local_dir.join("zz-local.png"), PNG).unwrap();

        let report = syncer.refresh(&layout).await.unwrap();
        assert_eq!(report.images[0], layout.local_dir.join("zz-local.png"));
        assert_eq!(report.images[1], layout.cache_dir.join("show.001.png"));
    }

    #[tokio::test]
    async fn test_paused_set_only_rescans() {
        let base = tempfile::tempdir().unwrap();
        let config: ImageSetConfig =
            serde_json::from_str(r#"{ "name": "show", "URL": "http://example.com/", "web": "N" }"#)
                .unwrap();
        let layout = SetLayout::new(&config, base.path(), true);
        layout.create_dirs().unwrap();
        std::fs::write(layout.cache_dir.join("show.001.png"), PNG).unwrap();

        let remote = Arc::new(FakeRemote::default());
        let syncer = Syncer::new(remote.clone(), None);
        let report = syncer.refresh(&layout).await.unwrap();

        assert!(!report.fetched);
        assert_eq!(report.images.len(), 1);
        assert!(remote.take_gets().is_empty());
    }

    #[tokio::test]
    async fn test_offline_probe_skips_the_pass() {
        let (_base, layout, remote, _) = setup(0);
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let syncer = Syncer::new(remote, Some(addr));
        assert!(matches!(syncer.refresh(&layout).await, Err(Error::Offline)));
    }
}
