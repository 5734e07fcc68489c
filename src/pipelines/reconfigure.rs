// SPDX-License-Identifier: GPL-3.0-only

//! Chain reconfiguration with last-writer-wins ordering
//!
//! Every change arrives with a causality stamp. The editor remembers, per
//! plugin, the stamp of the last event that wrote its enabled flag or
//! options, and for the chain as a whole the stamps of the last reload and
//! of the last event that set the order. An event older than the write it
//! would overwrite is discarded as stale.
//!
//! A reload replaces the plugin list but keeps the enabled flag and options
//! of plugins written after the reload was stamped. If a reorder newer than
//! the reload exists, existing plugins keep their positions and plugins new
//! to the chain are appended after them.

use crate::errors::ChainError;
use crate::plugins::{
    ChainHandle, ChainReader, OptionValue, PluginChain, PluginRegistry, PluginSpec,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one reconfiguration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// A new chain version is active
    Committed { version: u64 },
    /// The chain already looked like that; no new version
    Unchanged,
    /// Superseded by a newer write
    Stale,
    /// Invalid request; the active chain is untouched
    Rejected(ChainError),
}

/// Sole writer of the active [`PluginChain`]
pub struct ChainEditor {
    handle: ChainHandle,
    registry: Arc<PluginRegistry>,
    /// Last stamp that wrote each plugin's enabled flag or options
    writes: HashMap<String, u64>,
    order_stamp: u64,
    reload_stamp: u64,
}

impl ChainEditor {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            handle: ChainHandle::new(),
            registry,
            writes: HashMap::new(),
            order_stamp: 0,
            reload_stamp: 0,
        }
    }

    pub fn reader(&self) -> ChainReader {
        self.handle.reader()
    }

    pub fn snapshot(&self) -> Arc<PluginChain> {
        self.handle.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.handle.version()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    fn last_write(&self, name: &str) -> u64 {
        self.writes.get(name).copied().unwrap_or(0)
    }

    fn commit(&self, specs: &[PluginSpec]) -> Result<u64, ChainError> {
        self.handle.rebuild(specs, &self.registry)
    }

    /// Replace the plugin list
    pub fn reload(&mut self, stamp: u64, incoming: Vec<PluginSpec>) -> EditOutcome {
        if stamp < self.reload_stamp {
            debug!(stamp, last = self.reload_stamp, "Discarding stale reload");
            return EditOutcome::Stale;
        }

        let current = self.handle.snapshot();
        let keep_order = self.order_stamp > stamp;
        let mut next_position = current.specs().map(|spec| spec.position + 1).max().unwrap_or(0);

        let mut specs = incoming;
        let mut appended: Vec<usize> = Vec::new();
        for (idx, spec) in specs.iter_mut().enumerate() {
            let live = current.spec(&spec.name);
            if let Some(live) = live
                && self.last_write(&spec.name) > stamp
            {
                debug!(plugin = %spec.name, "Keeping newer toggle/option over reload");
                spec.enabled = live.enabled;
                spec.options = live.options.clone();
            }
            if keep_order {
                match live {
                    Some(live) => spec.position = live.position,
                    None => appended.push(idx),
                }
            }
        }
        // New plugins go after the reordered ones, in their declared order
        appended.sort_by_key(|&idx| specs[idx].position);
        for idx in appended {
            specs[idx].position = next_position;
            next_position += 1;
        }

        let outcome = if specs_equal(&current.spec_list(), &specs) {
            EditOutcome::Unchanged
        } else {
            match self.commit(&specs) {
                Ok(version) => EditOutcome::Committed { version },
                Err(e) => {
                    warn!(error = %e, "Reload rejected, keeping current chain");
                    return EditOutcome::Rejected(e);
                }
            }
        };

        self.reload_stamp = stamp;
        self.order_stamp = self.order_stamp.max(stamp);
        let names: HashSet<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
        self.writes.retain(|name, _| names.contains(name.as_str()));
        for spec in &specs {
            let write = self.writes.entry(spec.name.clone()).or_insert(0);
            *write = (*write).max(stamp);
        }
        info!(stamp, plugins = specs.len(), ?outcome, "Reload applied");
        outcome
    }

    /// Enable, disable (`Some`) or flip (`None`) one plugin
    pub fn toggle(&mut self, stamp: u64, name: &str, enabled: Option<bool>) -> EditOutcome {
        self.write_plugin(stamp, name, |spec| {
            let next = enabled.unwrap_or(!spec.enabled);
            let changed = next != spec.enabled;
            spec.enabled = next;
            changed
        })
    }

    /// Set one option of one plugin
    pub fn set_option(
        &mut self,
        stamp: u64,
        name: &str,
        key: &str,
        value: OptionValue,
    ) -> EditOutcome {
        self.write_plugin(stamp, name, |spec| {
            if spec.options.get(key) == Some(&value) {
                return false;
            }
            spec.options.insert(key, value);
            true
        })
    }

    fn write_plugin(
        &mut self,
        stamp: u64,
        name: &str,
        edit: impl FnOnce(&mut PluginSpec) -> bool,
    ) -> EditOutcome {
        let current = self.handle.snapshot();
        if current.spec(name).is_none() {
            return EditOutcome::Rejected(ChainError::NotInChain(name.to_string()));
        }
        if stamp < self.last_write(name) {
            debug!(plugin = name, stamp, last = self.last_write(name), "Discarding stale write");
            return EditOutcome::Stale;
        }

        let mut specs = current.spec_list();
        let changed = specs.iter_mut().find(|spec| spec.name == name).is_some_and(edit);

        let outcome = if changed {
            match self.commit(&specs) {
                Ok(version) => EditOutcome::Committed { version },
                Err(e) => return EditOutcome::Rejected(e),
            }
        } else {
            EditOutcome::Unchanged
        };
        self.writes.insert(name.to_string(), stamp);
        outcome
    }

    /// New application order; `names` must list every plugin exactly once
    pub fn reorder(&mut self, stamp: u64, names: &[String]) -> EditOutcome {
        if stamp < self.order_stamp {
            debug!(stamp, last = self.order_stamp, "Discarding stale reorder");
            return EditOutcome::Stale;
        }

        let current = self.handle.snapshot();
        let listed: HashSet<&str> = names.iter().map(String::as_str).collect();
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| current.spec(name).is_none())
            .collect();
        if listed.len() != names.len() || listed.len() != current.len() || !unknown.is_empty() {
            let reason = if unknown.is_empty() {
                format!("got {} names for {} plugins", names.len(), current.len())
            } else {
                format!("unknown plugins: {}", unknown.join(", "))
            };
            return EditOutcome::Rejected(ChainError::InvalidOrder(reason));
        }

        let mut specs = current.spec_list();
        for spec in &mut specs {
            if let Some(index) = names.iter().position(|name| *name == spec.name) {
                spec.position = index as u32;
            }
        }

        let outcome = if specs_equal(&current.spec_list(), &specs) {
            EditOutcome::Unchanged
        } else {
            match self.commit(&specs) {
                Ok(version) => EditOutcome::Committed { version },
                Err(e) => return EditOutcome::Rejected(e),
            }
        };
        self.order_stamp = stamp;
        outcome
    }
}

/// Same plugins with the same settings, ignoring list order
fn specs_equal(a: &[PluginSpec], b: &[PluginSpec]) -> bool {
    a.len() == b.len() && a.iter().all(|spec| b.iter().any(|other| other == spec))
}
