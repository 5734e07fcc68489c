// SPDX-License-Identifier: GPL-3.0-only

//! Versioned plugin chains and the handle that swaps them
//!
//! A [`PluginChain`] is immutable once built. Reconfiguration builds a new
//! chain next to the active one and publishes it through a
//! [`ChainHandle`] (a `tokio::sync::watch` of `Arc<PluginChain>`). The
//! engine clones the `Arc` once per frame, so a frame that started on
//! version N finishes on version N even if N+1 is committed meanwhile, and
//! version N is dropped when its last frame completes.

use super::registry::PluginRegistry;
use super::{ApplyContext, Plugin, PluginOptions, StageOutput};
use crate::errors::{ChainError, PluginError, PoolError};
use crate::media::{Frame, FramePool};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

fn default_enabled() -> bool {
    true
}

/// Declarative description of one plugin instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Instance name, unique within a chain
    pub name: String,
    /// Registry key; defaults to the instance name
    #[serde(default, rename = "type", alias = "kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Position in the chain, unique within a chain
    #[serde(rename = "pos", alias = "position")]
    pub position: u32,
    #[serde(default, skip_serializing_if = "PluginOptions::is_empty")]
    pub options: PluginOptions,
}

impl PluginSpec {
    pub fn new(name: &str, position: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            enabled: true,
            position,
            options: PluginOptions::new(),
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<super::OptionValue>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Kind used for registry lookup
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }

    /// Whether two specs produce interchangeable instances
    fn same_instance(&self, other: &PluginSpec) -> bool {
        self.kind() == other.kind() && self.options == other.options
    }
}

struct ChainEntry {
    name: Arc<str>,
    spec: PluginSpec,
    plugin: Arc<dyn Plugin>,
}

/// Immutable, ordered set of plugin instances
pub struct PluginChain {
    version: u64,
    entries: Vec<ChainEntry>,
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("version", &self.version)
            .field("plugins", &self.entries.iter().map(|e| &e.spec).collect::<Vec<_>>())
            .finish()
    }
}

/// Timing and result of one stage of [`PluginChain::apply_all`]
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub name: Arc<str>,
    pub elapsed: Duration,
    pub result: StageResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Applied,
    /// Bypassed by the engine's degrade policy
    Skipped,
    /// Stage output discarded, the pre-stage frame passed through
    Failed(PluginError),
}

/// Engine-supplied parameters for one [`PluginChain::apply_all`] run
pub struct ChainContext<'a> {
    pub pool: &'a FramePool,
    pub acquire_timeout: Duration,
    /// Plugins to bypass for this frame
    pub skip: &'a [Arc<str>],
    /// Stages slower than this have their output discarded as a timeout
    pub stage_timeout: Option<Duration>,
}

/// Result of running a chain over one frame
///
/// The frame is always handed back, even when the pool failed mid-chain,
/// so the caller can release it.
#[derive(Debug)]
pub struct ChainOutcome {
    pub frame: Frame,
    pub stages: Vec<StageRecord>,
    pub pool_error: Option<PoolError>,
}

impl PluginChain {
    /// The empty chain every handle starts from (version 0)
    pub fn empty() -> Self {
        Self {
            version: 0,
            entries: Vec::new(),
        }
    }

    /// Validate `specs` and instantiate every plugin
    ///
    /// Disabled plugins are instantiated too so enabling one later cannot
    /// fail. The returned chain has version 0 until it is committed.
    pub fn build(specs: &[PluginSpec], registry: &PluginRegistry) -> Result<Self, ChainError> {
        Self::build_reusing(specs, registry, None)
    }

    /// Like [`build`](Self::build), but keeps the live instance of every
    /// plugin whose kind and options did not change, preserving its state
    pub fn build_reusing(
        specs: &[PluginSpec],
        registry: &PluginRegistry,
        previous: Option<&PluginChain>,
    ) -> Result<Self, ChainError> {
        let mut by_position: HashMap<u32, &str> = HashMap::new();
        let mut names: HashSet<&str> = HashSet::new();
        for spec in specs {
            if let Some(first) = by_position.insert(spec.position, &spec.name) {
                return Err(ChainError::DuplicatePosition {
                    position: spec.position,
                    first: first.to_string(),
                    second: spec.name.clone(),
                });
            }
            if !names.insert(&spec.name) {
                return Err(ChainError::DuplicateName(spec.name.clone()));
            }
        }

        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let reused = previous.and_then(|chain| {
                chain
                    .entry(&spec.name)
                    .filter(|entry| entry.spec.same_instance(spec))
                    .map(|entry| Arc::clone(&entry.plugin))
            });

            let plugin = match reused {
                Some(plugin) => plugin,
                None => {
                    let descriptor = registry
                        .resolve(spec.kind())
                        .ok_or_else(|| ChainError::UnknownPlugin(spec.name.clone()))?;
                    let instance = descriptor.create(&spec.options).map_err(|error| {
                        warn!(plugin = %spec.name, %error, "Rejecting plugin options");
                        match error {
                            PluginError::InvalidOption { field, .. } => {
                                ChainError::InvalidOption(spec.name.clone(), field)
                            }
                            other => {
                                ChainError::InvalidOption(spec.name.clone(), other.to_string())
                            }
                        }
                    })?;
                    Arc::from(instance)
                }
            };

            entries.push(ChainEntry {
                name: Arc::from(spec.name.as_str()),
                spec: spec.clone(),
                plugin,
            });
        }
        entries.sort_by_key(|entry| entry.spec.position);

        Ok(Self {
            version: 0,
            entries,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&ChainEntry> {
        self.entries.iter().find(|entry| &*entry.name == name)
    }

    pub fn spec(&self, name: &str) -> Option<&PluginSpec> {
        self.entry(name).map(|entry| &entry.spec)
    }

    /// Specs in position order
    pub fn specs(&self) -> impl Iterator<Item = &PluginSpec> {
        self.entries.iter().map(|entry| &entry.spec)
    }

    /// Owned copy of the specs, the starting point of every reconfiguration
    pub fn spec_list(&self) -> Vec<PluginSpec> {
        self.specs().cloned().collect()
    }

    /// Names of enabled plugins in application order
    pub fn enabled_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.spec.enabled)
            .map(|entry| &*entry.name)
            .collect()
    }

    /// Run every enabled plugin over `frame` in position order
    ///
    /// Each stage works on a pooled copy of the current frame. If the
    /// plugin fails, times out or returns a frame of another format, its
    /// copy is released and the pre-stage frame passes through unmodified.
    /// Plugin failures are reported per stage and never abort the chain;
    /// only a pool failure stops it early.
    pub fn apply_all(&self, frame: Frame, ctx: &ChainContext<'_>) -> ChainOutcome {
        let mut current = frame;
        let mut stages = Vec::with_capacity(self.entries.len());
        let mut pool_error = None;

        for entry in self.entries.iter().filter(|entry| entry.spec.enabled) {
            if ctx.skip.iter().any(|name| *name == entry.name) {
                stages.push(StageRecord {
                    name: Arc::clone(&entry.name),
                    elapsed: Duration::ZERO,
                    result: StageResult::Skipped,
                });
                continue;
            }

            let start = Instant::now();
            let mut stage = match ctx.pool.acquire_copy(&current, ctx.acquire_timeout) {
                Ok(stage) => stage,
                Err(e) => {
                    pool_error = Some(e);
                    break;
                }
            };

            let apply_ctx = ApplyContext {
                options: &entry.spec.options,
                pool: ctx.pool,
                sequence: current.sequence(),
                acquire_timeout: ctx.acquire_timeout,
            };
            let output = entry.plugin.apply(&mut stage, &apply_ctx);
            let elapsed = start.elapsed();

            let output = match (output, ctx.stage_timeout) {
                (Ok(output), Some(limit)) if elapsed > limit => {
                    if let StageOutput::Replaced(replacement) = output
                        && let Err(e) = ctx.pool.release(replacement)
                    {
                        pool_error = Some(e);
                    }
                    Err(PluginError::Timeout)
                }
                (output, _) => output,
            };

            let (next, discard, result) = match output {
                Ok(StageOutput::InPlace) => (stage, current, StageResult::Applied),
                Ok(StageOutput::Replaced(mut replacement)) => {
                    if replacement.format() == current.format() {
                        replacement.set_sequence(current.sequence());
                        replacement.set_captured_at(current.captured_at());
                        if let Err(e) = ctx.pool.release(stage) {
                            pool_error = Some(e);
                        }
                        (replacement, current, StageResult::Applied)
                    } else {
                        let error = PluginError::render(format!(
                            "returned {} frame for {} input",
                            replacement.format(),
                            current.format()
                        ));
                        if let Err(e) = ctx.pool.release(replacement) {
                            pool_error = Some(e);
                        }
                        (current, stage, StageResult::Failed(error))
                    }
                }
                Err(error) => (current, stage, StageResult::Failed(error)),
            };

            if let StageResult::Failed(error) = &result {
                debug!(plugin = %entry.name, %error, "Stage failed, passing frame through");
            }
            if let Err(e) = ctx.pool.release(discard) {
                pool_error = Some(e);
            }
            current = next;
            stages.push(StageRecord {
                name: Arc::clone(&entry.name),
                elapsed,
                result,
            });

            if pool_error.is_some() {
                break;
            }
        }

        ChainOutcome {
            frame: current,
            stages,
            pool_error,
        }
    }
}

/// Owner side of the active chain
///
/// Only the orchestrator commits; every reader sees either the old or the
/// new chain, never a partial one.
pub struct ChainHandle {
    tx: watch::Sender<Arc<PluginChain>>,
}

impl ChainHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(PluginChain::empty()));
        Self { tx }
    }

    /// Current chain snapshot
    pub fn snapshot(&self) -> Arc<PluginChain> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn reader(&self) -> ChainReader {
        ChainReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish `chain` as the next version and return that version
    pub fn commit(&self, mut chain: PluginChain) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|current| {
            version = current.version + 1;
            chain.version = version;
            *current = Arc::new(chain);
        });
        info!(version, "Plugin chain committed");
        version
    }

    /// Build a chain from `specs`, reusing unchanged instances of the
    /// active chain, and commit it
    ///
    /// On error the active chain is untouched.
    pub fn rebuild(
        &self,
        specs: &[PluginSpec],
        registry: &PluginRegistry,
    ) -> Result<u64, ChainError> {
        let current = self.snapshot();
        let chain = PluginChain::build_reusing(specs, registry, Some(&current))?;
        Ok(self.commit(chain))
    }
}

impl Default for ChainHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the active chain, cloned into the engine
#[derive(Clone)]
pub struct ChainReader {
    rx: watch::Receiver<Arc<PluginChain>>,
}

impl ChainReader {
    /// Current chain snapshot; holds no lock once returned
    pub fn snapshot(&self) -> Arc<PluginChain> {
        Arc::clone(&self.rx.borrow())
    }
}
