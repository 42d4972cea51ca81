use crate::allocation_store::AllocationErrorCode::*;
use crate::dead_lock_detector::{DeadlockDetector, DetectionReport};
use crate::outcome::{GrantStatus, ReleaseOutcome, RequestOutcome};
use crate::resource::{
    Allocation, Demand, MaxDemand, PendingRequest, Process, ProcessId, Resource, ResourceId,
    SystemDefinition, Units,
};
use crate::validate;
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AllocationErrorCode {
    #[error("Unknown process PID {0}")]
    UnknownProcess(ProcessId),
    #[error("Unknown resource RES_ID {0}")]
    UnknownResource(ResourceId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Capacity inconsistency on RES_ID {rid}: {detail}")]
    CapacityInconsistency { rid: ResourceId, detail: String },
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct StoreConfig {
    /// Reject starting requests and asks that would push a process past its
    /// declared max demand. Detection ignores max demand either way.
    pub enforce_max_demand: bool,
}

impl StoreConfig {
    pub fn enforcing_max_demand() -> Self {
        Self {
            enforce_max_demand: true,
        }
    }
}

/// Deep copy of the store at one point in time.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AllocationSnapshot {
    pub resources: BTreeMap<ResourceId, Resource>,
    pub processes: BTreeMap<ProcessId, Process>,
}

impl AllocationSnapshot {
    pub fn available(&self, rid: &str) -> Option<Units> {
        self.resources.get(rid).map(|resource| resource.available)
    }

    pub fn process(&self, pid: &str) -> Option<&Process> {
        self.processes.get(pid)
    }

    /// Checks vector shapes and `available + sum(allocation) == total`.
    pub fn verify(&self) -> Result<()> {
        validate::ensure_snapshot_shape(self)?;
        validate::ensure_conservation(self)
    }
}

impl fmt::Display for AllocationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current State of Resources:")?;
        for (rid, resource) in self.resources.iter() {
            writeln!(f, "{}: {} available", rid, resource.available)?;
        }
        writeln!(f)?;
        writeln!(f, "Current State of Processes:")?;
        for (pid, process) in self.processes.iter() {
            writeln!(
                f,
                "Process {}: Allocation {}, Request {}",
                pid, process.allocation, process.request
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AllocationStore {
    config: StoreConfig,
    resources: BTreeMap<ResourceId, Resource>,
    processes: BTreeMap<ProcessId, Process>,
}

impl AllocationStore {
    pub fn new(definition: SystemDefinition) -> Result<Self> {
        Self::with_config(definition, StoreConfig::default())
    }

    pub fn with_config(definition: SystemDefinition, config: StoreConfig) -> Result<Self> {
        validate::ensure_unique(definition.resources.iter().map(|(rid, _)| rid), "resource")?;
        validate::ensure_unique(definition.processes.iter().map(|(pid, _)| pid), "process")?;
        if definition.resources.is_empty() {
            return Err(anyhow!(InvalidInput("no resources defined".to_string())));
        }

        let resources = definition
            .resources
            .into_iter()
            .map(|(rid, total)| (rid.clone(), Resource::new(rid, total)))
            .collect::<BTreeMap<_, _>>();

        let mut processes = BTreeMap::new();
        for (pid, process_def) in definition.processes {
            let named = process_def
                .max_demand
                .iter()
                .chain(process_def.request.iter())
                .map(|(rid, _)| rid);
            if let Some(rid) = validate::first_unknown(&resources, named) {
                return Err(anyhow!(InvalidInput(format!(
                    "process {} names undeclared resource {}",
                    pid, rid
                ))));
            }
            validate::ensure_unique(
                process_def.max_demand.iter().map(|(rid, _)| rid),
                "max demand entry",
            )?;
            validate::ensure_unique(
                process_def.request.iter().map(|(rid, _)| rid),
                "request entry",
            )?;

            let mut max_demand = MaxDemand::zeroed(resources.keys());
            for (rid, units) in process_def.max_demand.iter() {
                max_demand.set(rid, *units);
            }
            let mut request = PendingRequest::zeroed(resources.keys());
            for (rid, units) in process_def.request.iter() {
                if config.enforce_max_demand && *units > max_demand.get(rid) {
                    return Err(anyhow!(InvalidInput(format!(
                        "process {} starts requesting {} of {} above max demand {}",
                        pid,
                        units,
                        rid,
                        max_demand.get(rid)
                    ))));
                }
                request.set(rid, *units);
            }
            let process = Process {
                id: pid.clone(),
                max_demand,
                allocation: Allocation::zeroed(resources.keys()),
                request,
            };
            processes.insert(pid, process);
        }

        debug!(
            resources = resources.len(),
            processes = processes.len(),
            "AllocationStore created"
        );
        Ok(Self {
            config,
            resources,
            processes,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn resource(&self, rid: &str) -> Result<&Resource> {
        self.resources
            .get(rid)
            .ok_or_else(|| anyhow!(UnknownResource(rid.to_string())))
    }

    pub fn process(&self, pid: &str) -> Result<&Process> {
        self.processes
            .get(pid)
            .ok_or_else(|| anyhow!(UnknownProcess(pid.to_string())))
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &ResourceId> + '_ {
        self.resources.keys()
    }

    pub fn process_ids(&self) -> impl Iterator<Item = &ProcessId> + '_ {
        self.processes.keys()
    }

    pub fn snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            resources: self.resources.clone(),
            processes: self.processes.clone(),
        }
    }

    /// Records `demand` as pending (entry-wise max with what is already
    /// pending), then grants all of it or none of it.
    pub fn request(&mut self, pid: &str, demand: &Demand) -> Result<RequestOutcome> {
        let process = self.process(pid)?;
        validate::ensure_known_resources(&self.resources, demand.keys())?;
        if self.config.enforce_max_demand {
            for (rid, units) in demand.iter() {
                let wanted = u64::from(process.allocation.get(rid)) + u64::from(units);
                if wanted > u64::from(process.max_demand.get(rid)) {
                    return Err(anyhow!(InvalidInput(format!(
                        "process {} would hold {} of {} above max demand {}",
                        pid,
                        wanted,
                        rid,
                        process.max_demand.get(rid)
                    ))));
                }
            }
        }

        let satisfiable = demand
            .iter()
            .all(|(rid, units)| units <= self.resources[rid].available);

        // Staged so a failed check leaves the store untouched.
        let mut staged = Vec::with_capacity(demand.len());
        for (rid, units) in demand.iter() {
            let pending = process.request.get(rid).max(units);
            if satisfiable {
                staged.push((
                    rid.clone(),
                    validate::sub_units(rid, self.resources[rid].available, units)?,
                    validate::add_units(rid, process.allocation.get(rid), units)?,
                    validate::sub_units(rid, pending, units)?,
                ));
            } else {
                let available = self.resources[rid].available;
                staged.push((rid.clone(), available, process.allocation.get(rid), pending));
            }
        }

        let process = self
            .processes
            .get_mut(pid)
            .ok_or_else(|| anyhow!(UnknownProcess(pid.to_string())))?;
        for (rid, available, allocation, pending) in staged {
            if let Some(resource) = self.resources.get_mut(&rid) {
                resource.available = available;
            }
            process.allocation.set(&rid, allocation);
            process.request.set(&rid, pending);
        }

        let status = if satisfiable {
            debug!(pid, %demand, "request granted");
            GrantStatus::Granted
        } else {
            debug!(pid, %demand, "request deferred, resources unavailable");
            GrantStatus::Deferred
        };
        Ok(RequestOutcome::new(pid.to_string(), status, self.snapshot()))
    }

    /// Returns every held unit to `available`. Pending requests stay.
    pub fn release(&mut self, pid: &str) -> Result<ReleaseOutcome> {
        let process = self.process(pid)?;
        let released = process.allocation.clone();

        let mut staged = Vec::with_capacity(released.len());
        for (rid, units) in released.iter() {
            let resource = self
                .resources
                .get(rid)
                .ok_or_else(|| anyhow!(UnknownResource(rid.clone())))?;
            let available = validate::add_units(rid, resource.available, units)?;
            if available > resource.total {
                return Err(anyhow!(CapacityInconsistency {
                    rid: rid.clone(),
                    detail: format!("{} available exceeds {} total", available, resource.total),
                }));
            }
            staged.push((rid.clone(), available));
        }

        for (rid, available) in staged {
            if let Some(resource) = self.resources.get_mut(&rid) {
                resource.available = available;
            }
        }
        if let Some(process) = self.processes.get_mut(pid) {
            process.allocation = Allocation::zeroed(self.resources.keys());
        }

        debug!(pid, %released, "resources released");
        Ok(ReleaseOutcome::new(pid.to_string(), released, self.snapshot()))
    }

    pub fn detect(&self) -> Result<DetectionReport> {
        DeadlockDetector::detect(&self.snapshot())
    }
}

/// Store handle for concurrent callers. Each request and release runs as one
/// transaction under the write lock; snapshots are taken under the read lock.
#[derive(Debug, Clone)]
pub struct SharedAllocationStore {
    store: Arc<RwLock<AllocationStore>>,
}

impl SharedAllocationStore {
    pub fn new(store: AllocationStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    pub fn request(&self, pid: &str, demand: &Demand) -> Result<RequestOutcome> {
        let store = &mut *self.store.write();
        store.request(pid, demand)
    }

    pub fn release(&self, pid: &str) -> Result<ReleaseOutcome> {
        let store = &mut *self.store.write();
        store.release(pid)
    }

    pub fn snapshot(&self) -> AllocationSnapshot {
        self.store.read().snapshot()
    }

    pub fn detect(&self) -> Result<DetectionReport> {
        let snapshot = self.snapshot();
        DeadlockDetector::detect(&snapshot)
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&AllocationStore) -> R) -> R {
        let store = &*self.store.read();
        f(store)
    }
}

impl From<AllocationStore> for SharedAllocationStore {
    fn from(store: AllocationStore) -> Self {
        Self::new(store)
    }
}

#[cfg(test)]
mod tests {
    use crate::allocation_store::AllocationErrorCode::*;
    use crate::allocation_store::{AllocationErrorCode, AllocationStore, StoreConfig};
    use crate::resource::{Demand, SystemDefinition};

    fn three_process_definition() -> SystemDefinition {
        SystemDefinition::new()
            .resource("R1", 3)
            .resource("R2", 2)
            .resource("R3", 2)
            .process_with_request(
                "P1",
                [("R1", 0), ("R2", 1), ("R3", 1)],
                [("R1", 0), ("R2", 1), ("R3", 1)],
            )
            .process_with_request(
                "P2",
                [("R1", 0), ("R2", 1), ("R3", 1)],
                [("R1", 0), ("R2", 1), ("R3", 1)],
            )
            .process_with_request(
                "P3",
                [("R1", 1), ("R2", 0), ("R3", 1)],
                [("R1", 1), ("R2", 0), ("R3", 1)],
            )
    }

    fn error_code(err: &anyhow::Error) -> AllocationErrorCode {
        err.downcast_ref::<AllocationErrorCode>()
            .cloned()
            .expect("allocation error code")
    }

    #[test]
    pub fn test_initial_state() {
        let store = AllocationStore::new(three_process_definition()).unwrap();
        assert_eq!(store.resource("R1").unwrap().available, 3);
        assert_eq!(store.resource("R2").unwrap().available, 2);
        let p3 = store.process("P3").unwrap();
        assert!(p3.allocation.is_zero());
        assert_eq!(p3.request.get("R1"), 1);
        assert_eq!(p3.max_demand.len(), 3);
        store.snapshot().verify().unwrap();
    }

    #[test]
    pub fn test_request_granted() {
        let mut store = AllocationStore::new(three_process_definition()).unwrap();
        let outcome = store
            .request("P1", &Demand::from_pairs([("R2", 1), ("R3", 1)]))
            .unwrap();
        assert!(outcome.granted());
        let snapshot = outcome.snapshot;
        assert_eq!(snapshot.available("R1"), Some(3));
        assert_eq!(snapshot.available("R2"), Some(1));
        assert_eq!(snapshot.available("R3"), Some(1));
        let p1 = snapshot.process("P1").unwrap();
        assert_eq!(p1.allocation.get("R1"), 0);
        assert_eq!(p1.allocation.get("R2"), 1);
        assert_eq!(p1.allocation.get("R3"), 1);
        assert!(p1.request.is_zero());
        snapshot.verify().unwrap();
    }

    #[test]
    pub fn test_request_all_or_nothing() {
        let mut store = AllocationStore::new(three_process_definition()).unwrap();
        store
            .request("P1", &Demand::from_pairs([("R3", 2)]))
            .unwrap();
        let before = store.snapshot();
        // R1 fits, R3 is exhausted.
        let outcome = store
            .request("P3", &Demand::from_pairs([("R1", 1), ("R3", 1)]))
            .unwrap();
        assert!(!outcome.granted());
        for (rid, resource) in before.resources.iter() {
            assert_eq!(outcome.snapshot.available(rid), Some(resource.available));
        }
        assert_eq!(
            outcome.snapshot.process("P3").unwrap().allocation,
            before.process("P3").unwrap().allocation
        );
        assert_eq!(outcome.snapshot.process("P3").unwrap().request.get("R1"), 1);
    }

    #[test]
    pub fn test_request_merges_pending() {
        let definition = SystemDefinition::new()
            .resource("R1", 1)
            .process("P1", [("R1", 2)]);
        let mut store = AllocationStore::new(definition).unwrap();
        let outcome = store.request("P1", &Demand::from_pairs([("R1", 2)])).unwrap();
        assert!(!outcome.granted());
        assert_eq!(store.process("P1").unwrap().request.get("R1"), 2);

        let outcome = store.request("P1", &Demand::from_pairs([("R1", 1)])).unwrap();
        assert!(outcome.granted());
        let p1 = store.process("P1").unwrap();
        assert_eq!(p1.allocation.get("R1"), 1);
        assert_eq!(p1.request.get("R1"), 1);
        assert_eq!(store.resource("R1").unwrap().available, 0);
    }

    #[test]
    pub fn test_release_keeps_request_and_is_idempotent() {
        let mut store = AllocationStore::new(three_process_definition()).unwrap();
        store
            .request("P3", &Demand::from_pairs([("R1", 1)]))
            .unwrap();
        let first = store.release("P3").unwrap();
        assert_eq!(first.released.get("R1"), 1);
        assert_eq!(first.snapshot.available("R1"), Some(3));
        let p3 = first.snapshot.process("P3").unwrap();
        assert!(p3.allocation.is_zero());
        assert_eq!(p3.request.get("R3"), 1);
        assert!(p3.is_waiting());
        assert_eq!(store.resource("R1").unwrap().held(), 0);

        let second = store.release("P3").unwrap();
        assert!(second.released.is_zero());
        assert_eq!(first.snapshot, second.snapshot);
    }

    #[test]
    pub fn test_unknown_entities() {
        let mut store = AllocationStore::new(three_process_definition()).unwrap();
        let err = store
            .request("P9", &Demand::from_pairs([("R1", 1)]))
            .unwrap_err();
        assert_eq!(error_code(&err), UnknownProcess("P9".to_string()));

        let before = store.snapshot();
        let err = store
            .request("P1", &Demand::from_pairs([("R2", 1), ("R7", 1)]))
            .unwrap_err();
        assert_eq!(error_code(&err), UnknownResource("R7".to_string()));
        assert_eq!(before, store.snapshot());

        let err = store.release("P0").unwrap_err();
        assert_eq!(error_code(&err), UnknownProcess("P0".to_string()));
    }

    #[test]
    pub fn test_invalid_definitions() {
        let duplicate = SystemDefinition::new().resource("R1", 1).resource("R1", 2);
        let err = AllocationStore::new(duplicate).unwrap_err();
        assert!(matches!(error_code(&err), InvalidInput(_)));

        let undeclared = SystemDefinition::new()
            .resource("R1", 1)
            .process("P1", [("R2", 1)]);
        let err = AllocationStore::new(undeclared).unwrap_err();
        assert!(matches!(error_code(&err), InvalidInput(_)));

        let err = AllocationStore::new(SystemDefinition::new()).unwrap_err();
        assert!(matches!(error_code(&err), InvalidInput(_)));
    }

    #[test]
    pub fn test_max_demand_enforcement() {
        let over_start = SystemDefinition::new().resource("R1", 3).process_with_request(
            "P1",
            [("R1", 1)],
            [("R1", 2)],
        );
        assert!(AllocationStore::new(over_start.clone()).is_ok());
        let err =
            AllocationStore::with_config(over_start, StoreConfig::enforcing_max_demand()).unwrap_err();
        assert!(matches!(error_code(&err), InvalidInput(_)));

        let definition = SystemDefinition::new().resource("R1", 3).process("P1", [("R1", 2)]);
        let mut store =
            AllocationStore::with_config(definition, StoreConfig::enforcing_max_demand()).unwrap();
        assert!(store.config().enforce_max_demand);
        assert!(store
            .request("P1", &Demand::from_pairs([("R1", 2)]))
            .unwrap()
            .granted());
        let err = store
            .request("P1", &Demand::from_pairs([("R1", 1)]))
            .unwrap_err();
        assert!(matches!(error_code(&err), InvalidInput(_)));
        assert_eq!(store.resource("R1").unwrap().available, 1);
    }

    #[test]
    pub fn test_snapshot_display() {
        let store = AllocationStore::new(three_process_definition()).unwrap();
        let rendered = store.snapshot().to_string();
        assert!(rendered.contains("R1: 3 available"));
        assert!(rendered.contains(
            "Process P1: Allocation {R1: 0, R2: 0, R3: 0}, Request {R1: 0, R2: 1, R3: 1}"
        ));
    }

    #[test]
    pub fn test_verify_detects_tampering() {
        let store = AllocationStore::new(three_process_definition()).unwrap();
        let mut snapshot = store.snapshot();
        if let Some(resource) = snapshot.resources.get_mut("R1") {
            resource.available = 2;
        }
        let err = snapshot.verify().unwrap_err();
        assert!(matches!(error_code(&err), CapacityInconsistency { .. }));
    }
}
