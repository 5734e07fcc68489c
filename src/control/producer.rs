// SPDX-License-Identifier: GPL-3.0-only

//! Handles to running event producers and their bounded shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::pipelines::frame_loop::LoopController;

enum ProducerKind {
    Thread(LoopController),
    Task(tokio::task::JoinHandle<()>),
}

/// A running producer: an OS thread or a tokio task
pub struct ProducerHandle {
    name: String,
    stop: Arc<AtomicBool>,
    kind: ProducerKind,
}

impl ProducerHandle {
    /// Wrap a producer running on a [`LoopController`] thread
    pub fn thread(controller: LoopController) -> Self {
        Self {
            name: controller.name().to_string(),
            stop: controller.stop_signal(),
            kind: ProducerKind::Thread(controller),
        }
    }

    /// Wrap a tokio task that watches `stop`
    pub fn task(name: &str, stop: Arc<AtomicBool>, handle: tokio::task::JoinHandle<()>) -> Self {
        Self {
            name: name.to_string(),
            stop,
            kind: ProducerKind::Task(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        match &self.kind {
            ProducerKind::Thread(controller) => !controller.is_running(),
            ProducerKind::Task(handle) => handle.is_finished(),
        }
    }

    /// Wait until `deadline`; `false` if the producer had to be abandoned
    async fn join_until(self, deadline: Instant) -> bool {
        let name = self.name;
        match self.kind {
            ProducerKind::Thread(mut controller) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                // join_timeout polls with thread::sleep
                tokio::task::spawn_blocking(move || controller.join_timeout(remaining))
                    .await
                    .unwrap_or(false)
            }
            ProducerKind::Task(handle) => {
                let abort = handle.abort_handle();
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, handle).await {
                    Ok(_) => true,
                    Err(_) => {
                        warn!(producer = %name, "Producer task did not stop in time, aborting it");
                        abort.abort();
                        false
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Signal every producer to stop, then join them all within `timeout`
///
/// Returns the names of producers abandoned because they did not exit in
/// time.
pub async fn join_producers(producers: Vec<ProducerHandle>, timeout: Duration) -> Vec<String> {
    for producer in &producers {
        producer.request_stop();
    }

    let deadline = Instant::now() + timeout;
    let mut abandoned = Vec::new();
    for producer in producers {
        let name = producer.name.clone();
        if producer.join_until(deadline).await {
            debug!(producer = %name, "Producer joined");
        } else {
            abandoned.push(name);
        }
    }
    abandoned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::frame_loop::LoopAction;
    use std::thread;

    #[tokio::test]
    async fn test_join_cooperative_producers() {
        let thread = LoopController::start("cooperative", || {
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        });

        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = Arc::clone(&stop);
        let task = tokio::spawn(async move {
            while !task_stop.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let producers = vec![
            ProducerHandle::thread(thread),
            ProducerHandle::task("watcher", stop, task),
        ];
        let abandoned = join_producers(producers, Duration::from_secs(2)).await;
        assert!(abandoned.is_empty());
    }

    #[tokio::test]
    async fn test_straggler_abandoned() {
        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let producers = vec![ProducerHandle::task("stubborn", stop, task)];
        let abandoned = join_producers(producers, Duration::from_millis(50)).await;
        assert_eq!(abandoned, vec!["stubborn".to_string()]);
    }
}
