// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline orchestrator
//!
//! Owns the lifecycle: builds the initial chain, starts the engine thread,
//! consumes the Control Bus on a tokio task and tears everything down in
//! order on shutdown.
//!
//! Shutdown sequence:
//! 1. `Shutdown` is published (by the caller, a hotkey, Ctrl+C or the
//!    engine itself when capture ends)
//! 2. the consumer stops the engine at its next frame boundary, closes the
//!    bus and counts the events it discards
//! 3. the engine thread is joined with a bounded timeout
//! 4. producers are told to stop and joined with a bounded timeout;
//!    stragglers are abandoned and logged

use super::engine::{CompositingEngine, EngineConfig};
use super::frame_loop::LoopController;
use super::reconfigure::{ChainEditor, EditOutcome};
use super::stats::{EngineState, StateHandle};
use crate::backends::camera::FrameSource;
use crate::backends::virtual_camera::FrameSink;
use crate::config::Config;
use crate::control::{self, ControlEvent, ControlReceiver, ControlSender, ProducerHandle, Stamped};
use crate::errors::{AppError, AppResult, BusClosed, EngineError};
use crate::media::{FramePool, PoolStats};
use crate::plugins::{ChainReader, OptionValue, PluginChain, PluginRegistry, PluginSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What shutdown left behind
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Control events still queued (or queued behind `Shutdown`) that were
    /// never applied
    pub discarded_events: usize,
    /// Producers that did not exit within the join timeout
    pub abandoned_producers: Vec<String>,
    /// Whether the engine thread exited within the join timeout
    pub engine_joined: bool,
    pub final_state: EngineState,
    pub pool: PoolStats,
}

/// Running pipeline
pub struct PipelineHandle {
    sender: ControlSender,
    state: StateHandle,
    chain: ChainReader,
    pool: Arc<FramePool>,
    paused: Arc<AtomicBool>,
    engine: Option<LoopController>,
    consumer: Option<JoinHandle<usize>>,
    discarded: usize,
    producers: Vec<ProducerHandle>,
    join_timeout: Duration,
}

/// Build the initial chain and start the engine and the bus consumer
///
/// Must be called from within a tokio runtime. An invalid initial plugin
/// list is an error; nothing is started in that case.
pub fn start(
    config: &Config,
    registry: Arc<PluginRegistry>,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
) -> AppResult<PipelineHandle> {
    config.check()?;

    let mut editor = ChainEditor::new(registry);
    if let EditOutcome::Rejected(e) = editor.reload(0, config.plugins.clone()) {
        return Err(AppError::Chain(e));
    }
    let chain = editor.reader();

    let (sender, receiver) = control::bus(config.control.bus_capacity);
    let pool = Arc::new(FramePool::new(config.pool.capacity, config.pool.mode));
    let state = StateHandle::new();
    let paused = Arc::new(AtomicBool::new(false));

    info!(
        plugins = config.plugins.len(),
        version = editor.version(),
        format = %source.format(),
        pool = config.pool.capacity,
        "Starting pipeline"
    );

    let engine = CompositingEngine::new(
        EngineConfig::from_config(config),
        source,
        sink,
        Arc::clone(&pool),
        chain.clone(),
        state.clone(),
    )
    .with_pause_flag(Arc::clone(&paused))
    .with_exit_notify(sender.with_source("engine"))
    .spawn();

    let consumer = tokio::spawn(consume(
        receiver,
        editor,
        state.clone(),
        Arc::clone(&paused),
        engine.stop_signal(),
    ));

    Ok(PipelineHandle {
        sender,
        state,
        chain,
        pool,
        paused,
        engine: Some(engine),
        consumer: Some(consumer),
        discarded: 0,
        producers: Vec::new(),
        join_timeout: config.control.join_timeout(),
    })
}

/// Bus consumer: applies events in stamp order until `Shutdown`
///
/// Returns the number of events discarded.
async fn consume(
    mut receiver: ControlReceiver,
    mut editor: ChainEditor,
    state: StateHandle,
    paused: Arc<AtomicBool>,
    engine_stop: Arc<AtomicBool>,
) -> usize {
    let mut discarded = 0;
    'outer: while let Some(batch) = receiver.recv_batch().await {
        let mut events = batch.into_iter();
        while let Some(stamped) = events.next() {
            if stamped.event == ControlEvent::Shutdown {
                info!(source = stamped.source, "Shutdown requested");
                discarded += events.count();
                break 'outer;
            }
            apply(&mut editor, &state, &paused, stamped);
        }
    }

    // Close before stopping the engine so its exit notice is refused
    let rest = receiver.close_and_drain();
    discarded += rest.len();
    engine_stop.store(true, Ordering::SeqCst);
    if discarded > 0 {
        info!(discarded, "Discarded control events at shutdown");
    }
    discarded
}

fn apply(editor: &mut ChainEditor, state: &StateHandle, paused: &AtomicBool, stamped: Stamped) {
    let Stamped { stamp, source, event } = stamped;
    debug!(stamp, source, kind = event.kind(), "Applying control event");

    let outcome = match event {
        ControlEvent::ReloadConfig(specs) => editor.reload(stamp, specs),
        ControlEvent::TogglePlugin { name, enabled } => editor.toggle(stamp, &name, enabled),
        ControlEvent::Reorder(names) => editor.reorder(stamp, &names),
        ControlEvent::SetOption { name, key, value } => {
            editor.set_option(stamp, &name, &key, value)
        }
        ControlEvent::ConfigRejected(message) => {
            state.update(|s| s.last_error = Some(EngineError::Config(message)));
            return;
        }
        ControlEvent::SetPaused(value) => {
            paused.store(value, Ordering::SeqCst);
            info!(paused = value, "Pause state changed");
            return;
        }
        ControlEvent::TogglePause => {
            let was = paused.fetch_xor(true, Ordering::SeqCst);
            info!(paused = !was, "Pause toggled");
            return;
        }
        // Handled by the consumer loop
        ControlEvent::Shutdown => return,
    };

    match outcome {
        EditOutcome::Committed { version } => debug!(stamp, version, "Chain updated"),
        EditOutcome::Unchanged => debug!(stamp, "Chain unchanged"),
        EditOutcome::Stale => debug!(stamp, source, "Stale control event discarded"),
        EditOutcome::Rejected(e) => {
            warn!(stamp, source, error = %e, "Control event rejected");
            state.update(|s| s.last_error = Some(e.into()));
        }
    }
}

impl PipelineHandle {
    /// Sender for a new producer, labelled `source` in logs
    pub fn sender(&self, source: &'static str) -> ControlSender {
        self.sender.with_source(source)
    }

    /// Current engine state snapshot
    pub fn state(&self) -> EngineState {
        self.state.snapshot()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Active chain
    pub fn chain(&self) -> Arc<PluginChain> {
        self.chain.snapshot()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether the engine thread is still running
    pub fn is_running(&self) -> bool {
        self.engine.as_ref().is_some_and(LoopController::is_running)
    }

    /// Track a producer so shutdown joins it
    pub fn add_producer(&mut self, producer: ProducerHandle) {
        debug!(producer = producer.name(), "Producer registered");
        self.producers.push(producer);
    }

    pub async fn reload(&self, specs: Vec<PluginSpec>) -> Result<u64, BusClosed> {
        self.sender.send(ControlEvent::ReloadConfig(specs)).await
    }

    pub async fn toggle(&self, name: &str, enabled: Option<bool>) -> Result<u64, BusClosed> {
        let event = ControlEvent::TogglePlugin {
            name: name.to_string(),
            enabled,
        };
        self.sender.send(event).await
    }

    pub async fn reorder(&self, names: Vec<String>) -> Result<u64, BusClosed> {
        self.sender.send(ControlEvent::Reorder(names)).await
    }

    pub async fn set_option(
        &self,
        name: &str,
        key: &str,
        value: OptionValue,
    ) -> Result<u64, BusClosed> {
        let event = ControlEvent::SetOption {
            name: name.to_string(),
            key: key.to_string(),
            value,
        };
        self.sender.send(event).await
    }

    pub async fn pause(&self, paused: bool) -> Result<u64, BusClosed> {
        self.sender.send(ControlEvent::SetPaused(paused)).await
    }

    /// Wait until the bus consumer exits, i.e. until someone requests
    /// shutdown or the engine stops on its own
    ///
    /// Cancel safe: dropping the future leaves the consumer in place for a
    /// later `wait` or `shutdown`.
    pub async fn wait(&mut self) {
        let Some(consumer) = self.consumer.as_mut() else {
            return;
        };
        let result = consumer.await;
        self.consumer = None;
        self.discarded += result.unwrap_or_else(|e| {
            warn!(error = %e, "Control consumer task failed");
            0
        });
    }

    /// Stop everything and report what was left behind
    pub async fn shutdown(mut self) -> ShutdownReport {
        // Already closed if the consumer has exited
        let _ = self.sender.send(ControlEvent::Shutdown).await;
        self.wait().await;

        let timeout = self.join_timeout;
        let engine_joined = match self.engine.take() {
            Some(mut engine) => tokio::task::spawn_blocking(move || engine.stop_timeout(timeout))
                .await
                .unwrap_or(false),
            None => true,
        };
        if !engine_joined {
            warn!(?timeout, "Engine thread abandoned");
        }

        let producers = std::mem::take(&mut self.producers);
        let abandoned_producers = control::join_producers(producers, timeout).await;
        for name in &abandoned_producers {
            warn!(producer = %name, "Producer abandoned at shutdown");
        }

        let report = ShutdownReport {
            discarded_events: self.discarded,
            abandoned_producers,
            engine_joined,
            final_state: self.state.snapshot(),
            pool: self.pool.stats(),
        };
        info!(
            discarded = report.discarded_events,
            published = report.final_state.counters.published,
            status = report.final_state.status.display_name(),
            "Pipeline shut down"
        );
        report
    }
}
