//! Config file hot reload
//!
//! The parent directory is watched rather than the file: editors that save by
//! writing a temp file and renaming it over the config replace the file's
//! inode, and a watch on the old inode goes silent after the first save.
//! Reloaded settings never touch a running bridge; they are picked up by the
//! next start.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after a change before the file is read back
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Delivers a freshly loaded [`AppConfig`] after each change on disk
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    configs: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Watch an existing config file
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = config_path.into();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("Invalid config path: {}", path.display()))?;
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        // Capacity 1: a burst of file events collapses into a single reload
        let (touched_tx, touched_rx) = mpsc::channel::<()>(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches(&event, &file_name) => {
                debug!("Config file event: {:?}", event.kind);
                let _ = touched_tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => error!("Config watch error: {}", e),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        let (config_tx, configs) = mpsc::channel(10);
        tokio::spawn(reload_loop(path.clone(), touched_rx, config_tx));

        info!("Watching config file for changes: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            configs,
        })
    }

    /// Wait for the next successfully loaded config
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.configs.recv().await
    }
}

/// Whether `event` creates or changes the file called `file_name`
fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

async fn reload_loop(
    path: PathBuf,
    mut touched: mpsc::Receiver<()>,
    configs: mpsc::Sender<AppConfig>,
) {
    while touched.recv().await.is_some() {
        tokio::time::sleep(SETTLE_DELAY).await;
        // Events that arrived while settling are covered by this read
        while touched.try_recv().is_ok() {}

        let path_str = path.to_string_lossy();
        match AppConfig::load(&path_str).await {
            Ok(config) => {
                info!("Configuration reloaded");
                if configs.send(config).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
        }
    }
    debug!("Config reload loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;

    /// Receive reloads until one carries `baud_rate`, or give up after two seconds
    async fn reload_with_baud(watcher: &mut ConfigWatcher, baud_rate: u32) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            match tokio::time::timeout_at(deadline, watcher.next_config()).await {
                Ok(Some(config)) if config.serial.baud_rate == baud_rate => return true,
                Ok(Some(_)) => continue,
                _ => return false,
            }
        }
    }

    #[tokio::test]
    async fn test_in_place_edit_is_reloaded() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "serial:\n  baud_rate: 115200\n")?;

        let mut watcher = ConfigWatcher::new(&config_path)?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(
            &config_path,
            "serial:\n  baud_rate: 31250\nlogging:\n  frame_log_every: 1\n",
        )?;

        assert!(reload_with_baud(&mut watcher, 31250).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_edits_after_atomic_save_are_still_seen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "serial:\n  baud_rate: 115200\n")?;

        let mut watcher = ConfigWatcher::new(&config_path)?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Save the way editors do: write a sibling, rename it over the config
        let staged = temp_dir.path().join(".config.yaml.swp");
        fs::write(&staged, "serial:\n  baud_rate: 31250\n")?;
        fs::rename(&staged, &config_path)?;
        assert!(reload_with_baud(&mut watcher, 31250).await);

        fs::write(&config_path, "serial:\n  baud_rate: 57600\n")?;
        assert!(reload_with_baud(&mut watcher, 57600).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_edit_keeps_watching() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "serial:\n  baud_rate: 115200\n")?;

        let mut watcher = ConfigWatcher::new(&config_path)?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&config_path, "serial:\n  baud_rate: 0\n")?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        fs::write(&config_path, "serial:\n  baud_rate: 9600\n")?;

        assert!(reload_with_baud(&mut watcher, 9600).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_watching_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.yaml");
        assert!(ConfigWatcher::new(path).is_err());
    }

    #[test]
    fn test_only_changes_to_the_config_file_count() {
        let name = OsString::from("config.yaml");
        let config = PathBuf::from("/etc/bridge/config.yaml");
        let sibling = PathBuf::from("/etc/bridge/.config.yaml.swp");

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(config.clone());
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(config.clone());
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(config);
        let other = Event::new(EventKind::Create(CreateKind::File)).add_path(sibling);

        assert!(touches(&created, &name));
        assert!(touches(&renamed, &name));
        assert!(!touches(&removed, &name));
        assert!(!touches(&other, &name));
    }
}
