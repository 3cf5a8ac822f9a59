//! Callback registry: the sole owner of installed function-table entries.
//!
//! The runtime's function table is shared by everything running inside one
//! module instance, and nothing stops the runtime from dispatching through a
//! slot whose owner is gone. The registry therefore keeps the authoritative
//! list of what this host installed, grouped into one [`CallbackSet`] per
//! module instance, and is the only code that calls the runtime's raw
//! install/remove primitives.
//!
//! # Lifecycle
//!
//! ```text
//! install ──► live ──► release ──► retired
//!                 │
//!                 └──► module reset/replaced ──► retire_module ──► Stale
//! ```
//!
//! Every registry has its own owner id, stamped into the entries it hands
//! out. An entry from another registry is a [`BridgeError::UnknownEntry`];
//! an entry of this registry that is no longer live is a
//! [`BridgeError::DoubleRelease`]. No per-entry history is kept, so the
//! registry stays as small as its live set.
//!
//! `release` only removes entries from the runtime they were installed in.
//! Passing a different live module is a [`BridgeError::WrongModule`] and
//! leaves the entry live. Entries of a module instance that was torn down are
//! dropped with [`CallbackRegistry::retire_module`], which logs them and
//! reports [`ReleaseOutcome::Stale`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = CallbackRegistry::new();
//! let entry = registry.install(&mut runtime, function, Signature::native_method())?;
//! // ... bind, run scripts ...
//! let report = registry.cleanup(&mut runtime);
//! assert_eq!(report.released(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{EntryHandle, ModuleId, NativeFn, RuntimeModule, Signature};

// =============================================================================
// Entries and sets
// =============================================================================

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// One native callback installed by a registry.
///
/// `owner` identifies the registry and `serial` is never reused within it,
/// so a released entry stays distinguishable from a later one that lands in
/// the same slot, and from entries of other registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionTableEntry {
    handle: EntryHandle,
    module: ModuleId,
    owner: u64,
    serial: u64,
}

impl FunctionTableEntry {
    /// Slot in the runtime's function table.
    pub fn handle(&self) -> EntryHandle {
        self.handle
    }

    /// Module instance the entry was installed into.
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

impl fmt::Display for FunctionTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.handle, self.module)
    }
}

/// Entries installed together for one module instance, in install order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSet {
    module: ModuleId,
    entries: Vec<FunctionTableEntry>,
}

impl CallbackSet {
    /// Empty set for `module`.
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            entries: Vec::new(),
        }
    }

    /// Module instance the entries belong to.
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Entries in install order.
    pub fn entries(&self) -> &[FunctionTableEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `entry` is in the set.
    pub fn contains(&self, entry: &FunctionTableEntry) -> bool {
        self.entries.contains(entry)
    }
}

// =============================================================================
// Release outcomes
// =============================================================================

/// Result of releasing one entry that was live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Removed from the runtime's function table.
    Released,
    /// The owning module instance was already torn down; nothing to remove.
    Stale,
}

/// Per-entry record of a best-effort bulk release.
#[derive(Debug, Default)]
pub struct ReleaseReport {
    outcomes: Vec<(FunctionTableEntry, BridgeResult<ReleaseOutcome>)>,
}

impl ReleaseReport {
    /// Every entry with its outcome, in release order.
    pub fn outcomes(&self) -> &[(FunctionTableEntry, BridgeResult<ReleaseOutcome>)] {
        &self.outcomes
    }

    /// Entries processed, whatever the outcome.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing was processed.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Entries removed from a runtime table.
    pub fn released(&self) -> usize {
        self.count(|o| matches!(o, Ok(ReleaseOutcome::Released)))
    }

    /// Entries whose module was already gone.
    pub fn stale(&self) -> usize {
        self.count(|o| matches!(o, Ok(ReleaseOutcome::Stale)))
    }

    /// Entries whose release returned an error.
    pub fn failed(&self) -> usize {
        self.count(|o| o.is_err())
    }

    /// Entries whose release returned an error.
    pub fn failures(&self) -> impl Iterator<Item = (&FunctionTableEntry, &BridgeError)> {
        self.outcomes
            .iter()
            .filter_map(|(entry, outcome)| outcome.as_ref().err().map(|e| (entry, e)))
    }

    /// Append the outcomes of another report.
    pub fn extend(&mut self, other: ReleaseReport) {
        self.outcomes.extend(other.outcomes);
    }

    fn count(&self, pred: impl Fn(&BridgeResult<ReleaseOutcome>) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

impl fmt::Display for ReleaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} released, {} stale, {} failed",
            self.released(),
            self.stale(),
            self.failed()
        )
    }
}

// =============================================================================
// CallbackRegistry
// =============================================================================

/// Tracks every entry this host installed, one active set per module.
#[derive(Debug)]
pub struct CallbackRegistry {
    id: u64,
    sets: HashMap<ModuleId, CallbackSet>,
    live: HashSet<u64>,
    next_serial: u64,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Empty registry with a process-unique owner id.
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            sets: HashMap::new(),
            live: HashSet::new(),
            next_serial: 0,
        }
    }

    /// Install `function` into `runtime` and track it in the module's set.
    ///
    /// `TableExhausted` from the runtime is returned unchanged.
    pub fn install<R: RuntimeModule + ?Sized>(
        &mut self,
        runtime: &mut R,
        function: NativeFn,
        signature: Signature,
    ) -> BridgeResult<FunctionTableEntry> {
        let module = runtime.module_id();
        let handle = runtime.install_function(function, &signature)?;

        self.next_serial += 1;
        let entry = FunctionTableEntry {
            handle,
            module,
            owner: self.id,
            serial: self.next_serial,
        };
        self.live.insert(entry.serial);
        self.sets
            .entry(module)
            .or_insert_with(|| CallbackSet::new(module))
            .entries
            .push(entry.clone());

        debug!(%entry, %signature, "Installed native function");
        Ok(entry)
    }

    /// Install several functions as a unit.
    ///
    /// If any install fails, the ones that succeeded in this call are released
    /// again before the error is returned, so no orphaned entry survives.
    pub fn install_all<R: RuntimeModule + ?Sized>(
        &mut self,
        runtime: &mut R,
        functions: Vec<(NativeFn, Signature)>,
    ) -> BridgeResult<Vec<FunctionTableEntry>> {
        let mut installed = Vec::with_capacity(functions.len());
        for (function, signature) in functions {
            match self.install(runtime, function, signature) {
                Ok(entry) => installed.push(entry),
                Err(err) => {
                    warn!(
                        error = %err,
                        rolled_back = installed.len(),
                        "Partial install failed, rolling back"
                    );
                    let report = self.release_entries(runtime, installed);
                    warn!(%report, "Rolled back partial install");
                    return Err(err);
                }
            }
        }
        Ok(installed)
    }

    /// Release one entry from the runtime it was installed in.
    ///
    /// Returns `UnknownEntry` for an entry of another registry,
    /// `DoubleRelease` for one released before, and `WrongModule` when
    /// `runtime` is not the entry's module; in that last case the entry stays
    /// live. A runtime that no longer holds the slot yields
    /// [`ReleaseOutcome::Stale`].
    pub fn release<R: RuntimeModule + ?Sized>(
        &mut self,
        runtime: &mut R,
        entry: &FunctionTableEntry,
    ) -> BridgeResult<ReleaseOutcome> {
        if entry.owner != self.id {
            return Err(BridgeError::UnknownEntry {
                entry: entry.handle,
            });
        }
        if !self.live.contains(&entry.serial) {
            return Err(BridgeError::DoubleRelease {
                entry: entry.handle,
            });
        }
        let current = runtime.module_id();
        if entry.module != current {
            return Err(BridgeError::WrongModule {
                entry: entry.handle,
                owner: entry.module,
                current,
            });
        }
        self.forget(entry);

        match runtime.remove_function(entry.handle) {
            Ok(()) => {
                debug!(%entry, "Released native function");
                Ok(ReleaseOutcome::Released)
            }
            Err(err) => {
                warn!(%entry, error = %err, "Runtime no longer holds entry; ignoring");
                Ok(ReleaseOutcome::Stale)
            }
        }
    }

    /// Release every entry of `set`, continuing past failures.
    ///
    /// The set is empty afterwards regardless of individual outcomes.
    pub fn release_all<R: RuntimeModule + ?Sized>(
        &mut self,
        runtime: &mut R,
        set: &mut CallbackSet,
    ) -> ReleaseReport {
        self.release_entries(runtime, set.entries.drain(..))
    }

    /// Release each entry in turn, recording every outcome.
    pub fn release_entries<R, I>(&mut self, runtime: &mut R, entries: I) -> ReleaseReport
    where
        R: RuntimeModule + ?Sized,
        I: IntoIterator<Item = FunctionTableEntry>,
    {
        let mut report = ReleaseReport::default();
        for entry in entries {
            let outcome = self.release(runtime, &entry);
            if let Err(err) = &outcome {
                warn!(%entry, error = %err, "Failed to release entry");
            }
            report.outcomes.push((entry, outcome));
        }
        report
    }

    /// Drop every entry of a module instance that has been torn down.
    ///
    /// Its table is gone with it, so nothing is removed from any runtime;
    /// each entry is logged and reported as [`ReleaseOutcome::Stale`].
    pub fn retire_module(&mut self, module: ModuleId) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if let Some(set) = self.sets.remove(&module) {
            for entry in set.entries {
                self.live.remove(&entry.serial);
                warn!(%entry, "Dropping entry of a torn-down module");
                report.outcomes.push((entry, Ok(ReleaseOutcome::Stale)));
            }
        }
        report
    }

    /// Release everything installed for the runtime's current module.
    ///
    /// Calling this again releases nothing.
    pub fn cleanup<R: RuntimeModule + ?Sized>(&mut self, runtime: &mut R) -> ReleaseReport {
        match self.take_set(runtime.module_id()) {
            Some(mut set) => self.release_all(runtime, &mut set),
            None => ReleaseReport::default(),
        }
    }

    /// Detach the active set for `module` without releasing it.
    pub fn take_set(&mut self, module: ModuleId) -> Option<CallbackSet> {
        self.sets.remove(&module)
    }

    /// Active set for `module`, if any entry of it is live.
    pub fn active_set(&self, module: ModuleId) -> Option<&CallbackSet> {
        self.sets.get(&module)
    }

    /// Modules that still have installed entries.
    pub fn active_modules(&self) -> Vec<ModuleId> {
        let mut modules: Vec<ModuleId> = self.sets.keys().copied().collect();
        modules.sort();
        modules
    }

    /// Whether `entry` was installed here and not yet released.
    pub fn is_live(&self, entry: &FunctionTableEntry) -> bool {
        entry.owner == self.id && self.live.contains(&entry.serial)
    }

    /// Number of installed, unreleased entries across all modules.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn forget(&mut self, entry: &FunctionTableEntry) {
        self.live.remove(&entry.serial);
        if let Some(set) = self.sets.get_mut(&entry.module) {
            set.entries.retain(|e| e.serial != entry.serial);
            if set.entries.is_empty() {
                self.sets.remove(&entry.module);
            }
        }
    }
}
