// SPDX-License-Identifier: GPL-3.0-only

//! Config file watcher
//!
//! Polls the config file's modification time and publishes the new plugin
//! list on change. A file that fails to parse is reported with
//! `ConfigRejected` and the active chain stays as it is.

use super::{ControlEvent, ControlSender, ProducerHandle};
use crate::config::ConfigSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Modification time plus size; `None` while the file does not exist
fn fingerprint(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

/// Load the config and turn the result into a control event
pub fn reload_event(source: &dyn ConfigSource) -> ControlEvent {
    match source.load() {
        Ok(config) => ControlEvent::ReloadConfig(config.plugins),
        Err(e) => {
            warn!(error = %e, "Config reload rejected");
            ControlEvent::ConfigRejected(e.to_string())
        }
    }
}

/// Spawn the watcher task on the current tokio runtime
///
/// Returns `None` if the source is not file-backed.
pub fn spawn(
    source: Arc<dyn ConfigSource>,
    interval: Duration,
    sender: ControlSender,
) -> Option<ProducerHandle> {
    let path: PathBuf = source.watch_path()?.to_path_buf();
    let stop = Arc::new(AtomicBool::new(false));
    let task_stop = Arc::clone(&stop);

    info!(path = %path.display(), ?interval, "Watching config file");
    let handle = tokio::spawn(async move {
        let mut last = fingerprint(&path);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        while !task_stop.load(Ordering::SeqCst) {
            ticker.tick().await;
            let current = fingerprint(&path);
            if current == last {
                continue;
            }
            last = current;
            if current.is_none() {
                debug!(path = %path.display(), "Config file removed, keeping current chain");
                continue;
            }

            info!(path = %path.display(), "Config file changed, reloading");
            let event = reload_event(source.as_ref());
            if sender.send(event).await.is_err() {
                debug!("Control bus closed, config watcher exiting");
                break;
            }
        }
    });

    Some(ProducerHandle::task("config-watcher", stop, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JsonConfigSource, StaticConfigSource};
    use crate::control::bus;

    #[test]
    fn test_reload_event_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let text = r#"{"plugins": [{"name": "text", "pos": 1, "options": {"text": "LIVE"}}]}"#;
        std::fs::write(&path, text).unwrap();
        let source = JsonConfigSource::new(&path);
        match reload_event(&source) {
            ControlEvent::ReloadConfig(specs) => assert_eq!(specs[0].name, "text"),
            other => panic!("unexpected {other:?}"),
        }

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(reload_event(&source), ControlEvent::ConfigRejected(_)));
    }

    #[test]
    fn test_static_source_not_watched() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let (tx, _rx) = bus(4);
        let source: Arc<dyn ConfigSource> = Arc::new(StaticConfigSource::default());
        assert!(spawn(source, Duration::from_millis(10), tx).is_none());
    }

    #[tokio::test]
    async fn test_change_publishes_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"plugins": []}"#).unwrap();

        let (tx, mut rx) = bus(4);
        let source: Arc<dyn ConfigSource> = Arc::new(JsonConfigSource::new(&path));
        let producer =
            spawn(source, Duration::from_millis(10), tx.with_source("config-watcher")).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&path, r#"{"plugins": [{"name": "clock", "pos": 2}]}"#).unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv_batch())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].source, "config-watcher");
        assert!(matches!(
            &batch[0].event,
            ControlEvent::ReloadConfig(specs) if specs[0].name == "clock"
        ));

        let abandoned =
            crate::control::join_producers(vec![producer], Duration::from_secs(1)).await;
        assert!(abandoned.is_empty());
    }
}
