// SPDX-License-Identifier: GPL-3.0-only

//! Engine state and rolling frame statistics

use crate::constants::engine::STATS_WINDOW;
use crate::errors::EngineError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Lifecycle of the compositing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    #[default]
    Idle,
    Running,
    /// Over the frame budget; the degrade policy is shedding load
    Degraded,
    /// Terminal
    Stopped,
}

impl EngineStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Running => "running",
            EngineStatus::Degraded => "degraded",
            EngineStatus::Stopped => "stopped",
        }
    }
}

/// Rolling window of per-frame processing times
#[derive(Debug, Clone, Default)]
pub struct FrameTimes {
    samples: VecDeque<Duration>,
    total: Duration,
}

impl FrameTimes {
    pub fn push(&mut self, elapsed: Duration) {
        if self.samples.len() == STATS_WINDOW
            && let Some(oldest) = self.samples.pop_front()
        {
            self.total -= oldest;
        }
        self.samples.push_back(elapsed);
        self.total += elapsed;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or_default()
    }
}

/// Exponential moving average of one plugin's stage time
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PluginCost {
    average_secs: f64,
    pub samples: u64,
    pub failures: u64,
}

impl PluginCost {
    const SMOOTHING: f64 = 0.2;

    pub fn record(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.average_secs = if self.samples == 0 {
            secs
        } else {
            self.average_secs + Self::SMOOTHING * (secs - self.average_secs)
        };
        self.samples += 1;
    }

    pub fn average(&self) -> Duration {
        Duration::from_secs_f64(self.average_secs)
    }
}

/// Frame counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounters {
    pub captured: u64,
    pub published: u64,
    /// Stale frames released without compositing
    pub dropped: u64,
    pub publish_failures: u64,
    pub plugin_failures: u64,
    pub over_budget: u64,
    /// Transient capture failures that were retried
    pub capture_retries: u64,
}

/// Observable engine state
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub status: EngineStatus,
    pub paused: bool,
    /// Version of the chain used for the most recent frame
    pub chain_version: u64,
    pub counters: FrameCounters,
    pub frame_times: FrameTimes,
    /// Rolling stage cost by plugin name
    pub plugin_costs: BTreeMap<String, PluginCost>,
    /// Plugins currently bypassed by the skip-slowest policy
    pub skipped: Vec<String>,
    pub last_error: Option<EngineError>,
}

impl EngineState {
    /// Plugin with the highest rolling cost, ignoring `exclude`
    pub fn slowest_plugin<'a>(&'a self, exclude: &[String]) -> Option<&'a str> {
        self.plugin_costs
            .iter()
            .filter(|(name, cost)| cost.samples > 0 && !exclude.contains(name))
            .max_by(|(_, a), (_, b)| a.average_secs.total_cmp(&b.average_secs))
            .map(|(name, _)| name.as_str())
    }
}

/// Shared, snapshot-readable [`EngineState`]
#[derive(Debug, Clone, Default)]
pub struct StateHandle(Arc<Mutex<EngineState>>);

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> EngineState {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn status(&self) -> EngineStatus {
        self.update(|state| state.status)
    }
}
