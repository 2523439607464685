//! State shared between the scheduler and its workers
//!
//! Ownership is split by field: the scheduler inserts active entries, each
//! worker re-mints and removes only its own entry, and results are only ever
//! appended.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use kbench_types::{DeploymentName, ExperimentRecord};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SharedState {
    /// Logical benchmark name to the name of its live deployment
    active: DashMap<String, DeploymentName>,
    /// Every name handed out during this run
    minted: DashSet<DeploymentName>,
    results: Mutex<Vec<ExperimentRecord>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `benchmark` active under a freshly minted name.
    ///
    /// Returns `None` when the benchmark already has a live deployment.
    pub fn activate(
        &self,
        benchmark: &str,
        mint: impl FnMut() -> DeploymentName,
    ) -> Option<DeploymentName> {
        match self.active.entry(benchmark.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let name = self.mint_unique(mint);
                slot.insert(name.clone());
                Some(name)
            }
        }
    }

    /// Replace the active name of `benchmark` for another deployment
    /// attempt. Returns `None` if the benchmark is not active.
    pub fn remint(
        &self,
        benchmark: &str,
        mint: impl FnMut() -> DeploymentName,
    ) -> Option<DeploymentName> {
        let mut entry = self.active.get_mut(benchmark)?;
        let name = self.mint_unique(mint);
        *entry = name.clone();
        Some(name)
    }

    fn mint_unique(&self, mut mint: impl FnMut() -> DeploymentName) -> DeploymentName {
        loop {
            let name = mint();
            if self.minted.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn deactivate(&self, benchmark: &str) -> Option<DeploymentName> {
        self.active.remove(benchmark).map(|(_, name)| name)
    }

    pub fn is_active(&self, benchmark: &str) -> bool {
        self.active.contains_key(benchmark)
    }

    pub fn active_names(&self) -> Vec<DeploymentName> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    pub fn clear_active(&self) {
        self.active.clear();
    }

    pub fn push_result(&self, record: ExperimentRecord) {
        self.results.lock().push(record);
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().len()
    }

    pub fn results(&self) -> Vec<ExperimentRecord> {
        self.results.lock().clone()
    }
}
