// SPDX-License-Identifier: GPL-3.0-only

//! Control plane: the Control Bus and the producers that feed it
//!
//! Producers (hotkeys, the config watcher, the Ctrl+C handler, library
//! callers) publish [`ControlEvent`]s on a bounded channel. Every event is
//! stamped from one shared logical clock when it is created, so the single
//! consumer can order events from different producers causally even though
//! they may arrive interleaved.

pub mod hotkeys;
pub mod producer;
pub mod watcher;

pub use producer::{ProducerHandle, join_producers};

use crate::errors::{BusClosed, TrySendError};
use crate::plugins::{OptionValue, PluginSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// A request to change the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Replace the whole plugin list
    ReloadConfig(Vec<PluginSpec>),
    /// Enable or disable one plugin; `None` flips its current state
    TogglePlugin { name: String, enabled: Option<bool> },
    /// New application order; must name every plugin exactly once
    Reorder(Vec<String>),
    /// Change one option of one plugin
    SetOption {
        name: String,
        key: String,
        value: OptionValue,
    },
    /// A config reload failed to parse; the message is surfaced in the engine state
    ConfigRejected(String),
    SetPaused(bool),
    TogglePause,
    Shutdown,
}

impl ControlEvent {
    pub fn toggle(name: &str) -> Self {
        ControlEvent::TogglePlugin {
            name: name.to_string(),
            enabled: None,
        }
    }

    pub fn set_enabled(name: &str, enabled: bool) -> Self {
        ControlEvent::TogglePlugin {
            name: name.to_string(),
            enabled: Some(enabled),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ControlEvent::ReloadConfig(_) => "reload",
            ControlEvent::TogglePlugin { .. } => "toggle",
            ControlEvent::Reorder(_) => "reorder",
            ControlEvent::SetOption { .. } => "set-option",
            ControlEvent::ConfigRejected(_) => "config-rejected",
            ControlEvent::SetPaused(_) => "set-paused",
            ControlEvent::TogglePause => "toggle-pause",
            ControlEvent::Shutdown => "shutdown",
        }
    }
}

/// An event with its causality stamp and producer
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped {
    pub stamp: u64,
    pub source: &'static str,
    pub event: ControlEvent,
}

/// Shared monotonic logical clock
#[derive(Debug, Clone, Default)]
pub struct CausalClock(Arc<AtomicU64>);

impl CausalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp; strictly greater than every stamp handed out before
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last stamp handed out
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Producer side of the Control Bus
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<Stamped>,
    clock: CausalClock,
    source: &'static str,
}

impl ControlSender {
    /// Same bus, different producer label
    pub fn with_source(&self, source: &'static str) -> Self {
        Self {
            tx: self.tx.clone(),
            clock: self.clock.clone(),
            source,
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    fn stamp(&self, event: ControlEvent) -> Stamped {
        let stamped = Stamped {
            stamp: self.clock.tick(),
            source: self.source,
            event,
        };
        trace!(
            stamp = stamped.stamp,
            source = stamped.source,
            kind = stamped.event.kind(),
            "Control event stamped"
        );
        stamped
    }

    /// Publish from async code, waiting while the bus is full
    pub async fn send(&self, event: ControlEvent) -> Result<u64, BusClosed> {
        let stamped = self.stamp(event);
        let stamp = stamped.stamp;
        self.tx.send(stamped).await.map_err(|_| BusClosed)?;
        Ok(stamp)
    }

    /// Publish from a plain OS thread, blocking while the bus is full
    ///
    /// Must not be called from inside the tokio runtime.
    pub fn blocking_send(&self, event: ControlEvent) -> Result<u64, BusClosed> {
        let stamped = self.stamp(event);
        let stamp = stamped.stamp;
        self.tx.blocking_send(stamped).map_err(|_| BusClosed)?;
        Ok(stamp)
    }

    /// Publish without waiting; fails if the bus is full or closed
    pub fn try_send(&self, event: ControlEvent) -> Result<u64, TrySendError> {
        let stamped = self.stamp(event);
        let stamp = stamped.stamp;
        self.tx.try_send(stamped).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TrySendError::Full,
            mpsc::error::TrySendError::Closed(_) => TrySendError::Closed(BusClosed),
        })?;
        Ok(stamp)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the Control Bus; owned by the orchestrator
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::Receiver<Stamped>,
}

impl ControlReceiver {
    /// Wait for at least one event, then take everything already queued,
    /// sorted by stamp
    ///
    /// Returns `None` once every sender is gone and the bus is empty.
    pub async fn recv_batch(&mut self) -> Option<Vec<Stamped>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        while let Ok(next) = self.rx.try_recv() {
            batch.push(next);
        }
        batch.sort_by_key(|stamped| stamped.stamp);
        Some(batch)
    }

    /// Close the bus and take whatever is still queued
    pub fn close_and_drain(&mut self) -> Vec<Stamped> {
        self.rx.close();
        let mut rest = Vec::new();
        while let Ok(next) = self.rx.try_recv() {
            rest.push(next);
        }
        rest
    }
}

/// Create a Control Bus with room for `capacity` queued events
pub fn bus(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ControlSender {
            tx,
            clock: CausalClock::new(),
            source: "api",
        },
        ControlReceiver { rx },
    )
}
