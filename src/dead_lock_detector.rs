use crate::allocation_store::AllocationErrorCode::*;
use crate::allocation_store::AllocationSnapshot;
use crate::resource::{Process, ProcessId, ResourceId};
use crate::validate;
use anyhow::{anyhow, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DetectionReport {
    /// Processes whose pending request can never be met.
    pub deadlocked: BTreeSet<ProcessId>,
    /// Order in which processes were found able to finish.
    pub finish_order: Vec<ProcessId>,
}

impl DetectionReport {
    pub fn is_deadlocked(&self) -> bool {
        !self.deadlocked.is_empty()
    }
}

/// Work/finish reachability over the pending requests of a snapshot.
///
/// A process can finish once its whole pending request fits in `work`;
/// finishing returns its allocation to `work`. Whatever cannot finish once
/// no pass makes progress is deadlocked. Max demand is not consulted.
pub struct DeadlockDetector;

impl DeadlockDetector {
    pub fn detect(snapshot: &AllocationSnapshot) -> Result<DetectionReport> {
        validate::ensure_snapshot_shape(snapshot)?;
        let order = snapshot.processes.values().collect::<Vec<_>>();
        Ok(Self::run(snapshot, order))
    }

    /// Evaluates processes in the given order within each pass. The
    /// deadlocked set does not depend on it; `finish_order` may.
    pub fn detect_with_order(
        snapshot: &AllocationSnapshot,
        order: &[ProcessId],
    ) -> Result<DetectionReport> {
        validate::ensure_snapshot_shape(snapshot)?;
        validate::ensure_unique(order.iter(), "process in order")?;
        if order.len() != snapshot.processes.len() {
            return Err(anyhow!(InvalidInput(format!(
                "order names {} processes, snapshot has {}",
                order.len(),
                snapshot.processes.len()
            ))));
        }
        let processes = order
            .iter()
            .map(|pid| {
                snapshot
                    .processes
                    .get(pid)
                    .ok_or_else(|| anyhow!(UnknownProcess(pid.clone())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::run(snapshot, processes))
    }

    fn run(snapshot: &AllocationSnapshot, order: Vec<&Process>) -> DetectionReport {
        let mut work = snapshot
            .resources
            .iter()
            .map(|(rid, resource)| (rid, u64::from(resource.available)))
            .collect::<BTreeMap<_, _>>();
        let mut finish = order
            .iter()
            .map(|process| (&process.id, false))
            .collect::<BTreeMap<_, _>>();
        let mut finish_order = vec![];

        loop {
            let mut progress = false;
            for process in order.iter() {
                if finish[&process.id] {
                    continue;
                }
                let can_finish = process
                    .request
                    .iter()
                    .all(|(rid, units)| u64::from(units) <= work.get(rid).copied().unwrap_or(0));
                if can_finish {
                    for (rid, units) in process.allocation.iter() {
                        if let Some(free) = work.get_mut(rid) {
                            *free += u64::from(units);
                        }
                    }
                    finish.insert(&process.id, true);
                    finish_order.push(process.id.clone());
                    progress = true;
                    debug!(pid = %process.id, "process can finish");
                }
            }
            if !progress {
                break;
            }
        }

        let deadlocked = finish
            .into_iter()
            .filter(|(_, done)| !done)
            .map(|(pid, _)| pid.clone())
            .collect::<BTreeSet<_>>();
        if deadlocked.is_empty() {
            info!("no deadlock detected");
        } else {
            warn!(?deadlocked, "deadlock detected");
        }
        DetectionReport {
            deadlocked,
            finish_order,
        }
    }

    /// Edge `p -> q` labelled `r` when `p` waits on `r` (pending above
    /// available) and `q` holds units of `r`.
    pub fn wait_for_graph(snapshot: &AllocationSnapshot) -> Result<DiGraph<ProcessId, ResourceId>> {
        validate::ensure_snapshot_shape(snapshot)?;
        let mut graph = DiGraph::new();
        let nodes = snapshot
            .processes
            .keys()
            .map(|pid| (pid, graph.add_node(pid.clone())))
            .collect::<BTreeMap<_, NodeIndex>>();

        for (pid, waiter) in snapshot.processes.iter() {
            for (rid, units) in waiter.request.iter() {
                if units <= snapshot.resources[rid].available {
                    continue;
                }
                for (holder_id, holder) in snapshot.processes.iter() {
                    if holder_id != pid && holder.allocation.get(rid) > 0 {
                        graph.add_edge(nodes[pid], nodes[holder_id], rid.clone());
                    }
                }
            }
        }
        Ok(graph)
    }

    /// A cycle among waiting holders. Informational; the deadlocked set
    /// always comes from [`DeadlockDetector::detect`].
    pub fn has_wait_cycle(snapshot: &AllocationSnapshot) -> Result<bool> {
        let graph = Self::wait_for_graph(snapshot)?;
        Ok(is_cyclic_directed(&graph))
    }
}
