use crate::allocation_store::{AllocationStore, SharedAllocationStore};
use crate::dead_lock_detector::DeadlockDetector;
use crate::operation::{OpType, Operation, OperationOutcome};
use crate::resource::{Demand, ProcessId, ResourceId, Units};
use anyhow::{anyhow, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

static OP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Drives operations against a store, one at a time per caller.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct OperationScheduler;

impl OperationScheduler {
    pub fn op_id() -> String {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!("{}/{}", time, OP_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    pub fn apply(store: &mut AllocationStore, operation: &Operation) -> Result<OperationOutcome> {
        debug!(op_id = %operation.id, process = ?operation.process(), "apply operation");
        let outcome = match &operation.op_type {
            OpType::Request { process, demand } => {
                OperationOutcome::Requested(store.request(process, demand)?)
            }
            OpType::Release { process } => OperationOutcome::Released(store.release(process)?),
            OpType::Detect => OperationOutcome::Detected(DeadlockDetector::detect(&store.snapshot())?),
        };
        Ok(outcome)
    }

    /// Applies in order and stops at the first error.
    pub fn apply_all(
        store: &mut AllocationStore,
        operations: &[Operation],
    ) -> Result<Vec<OperationOutcome>> {
        operations
            .iter()
            .map(|operation| Self::apply(store, operation))
            .collect()
    }

    pub fn apply_shared(
        store: &SharedAllocationStore,
        operation: &Operation,
    ) -> Result<OperationOutcome> {
        debug!(op_id = %operation.id, process = ?operation.process(), "apply shared operation");
        let outcome = match &operation.op_type {
            OpType::Request { process, demand } => {
                OperationOutcome::Requested(store.request(process, demand)?)
            }
            OpType::Release { process } => OperationOutcome::Released(store.release(process)?),
            OpType::Detect => OperationOutcome::Detected(store.detect()?),
        };
        Ok(outcome)
    }

    /// Runs every batch on its own task. Operations inside a batch keep their
    /// order; batches interleave only between whole operations.
    pub async fn schedule_with_task(
        store: SharedAllocationStore,
        batches: Vec<Vec<Operation>>,
    ) -> Result<Vec<OperationOutcome>> {
        let mut join_handlers = vec![];
        for (worker_num, batch) in batches.into_iter().enumerate() {
            let store = store.clone();
            let join_handler = tokio::task::spawn(async move {
                debug!(worker_num, operations = batch.len(), "worker started");
                batch
                    .iter()
                    .map(|operation| Self::apply_shared(&store, operation))
                    .collect::<Result<Vec<_>>>()
            });
            join_handlers.push(join_handler);
        }

        let mut outcomes = vec![];
        for joined in futures::future::join_all(join_handlers).await {
            let batch_outcomes = joined.map_err(|e| anyhow!("worker task failed: {}", e))??;
            outcomes.extend(batch_outcomes);
        }
        info!(operations = outcomes.len(), "scheduled operations finished");
        Ok(outcomes)
    }

    /// Random mix of requests and releases over the given ids.
    pub fn random_operations(
        process_ids: &[ProcessId],
        resource_ids: &[ResourceId],
        count: usize,
        max_units: Units,
    ) -> Vec<Operation> {
        let mut rng = rand::thread_rng();
        let mut operations = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(process) = process_ids.choose(&mut rng) else {
                break;
            };
            if rng.gen_bool(0.3) {
                operations.push(Operation::release(Self::op_id(), process.clone()));
                continue;
            }
            let picks = rng.gen_range(1..=resource_ids.len().max(1));
            let demand = resource_ids
                .choose_multiple(&mut rng, picks)
                .map(|rid| (rid.clone(), rng.gen_range(0..=max_units)))
                .collect::<Demand>();
            operations.push(Operation::request(Self::op_id(), process.clone(), demand));
        }
        operations
    }
}

#[cfg(test)]
mod tests {
    use crate::allocation_store::{AllocationStore, SharedAllocationStore};
    use crate::operation::{Operation, OperationOutcome};
    use crate::operation_scheduler::OperationScheduler;
    use crate::resource::{Demand, SystemDefinition};

    fn definition() -> SystemDefinition {
        SystemDefinition::new()
            .resource("R1", 3)
            .resource("R2", 2)
            .resource("R3", 2)
            .process("P1", [("R1", 0), ("R2", 1), ("R3", 1)])
            .process("P2", [("R1", 0), ("R2", 1), ("R3", 1)])
            .process("P3", [("R1", 1), ("R2", 0), ("R3", 1)])
    }

    fn pair() -> Demand {
        Demand::from_pairs([("R1", 0), ("R2", 1), ("R3", 1)])
    }

    #[test]
    pub fn test_apply_script() {
        let mut store = AllocationStore::new(definition()).unwrap();
        let script = vec![
            Operation::request(OperationScheduler::op_id(), "P1", pair()),
            Operation::request(OperationScheduler::op_id(), "P2", pair()),
            Operation::request(
                OperationScheduler::op_id(),
                "P3",
                Demand::from_pairs([("R1", 1), ("R2", 0), ("R3", 1)]),
            ),
            Operation::release(OperationScheduler::op_id(), "P1"),
            Operation::detect(OperationScheduler::op_id()),
        ];
        let outcomes = OperationScheduler::apply_all(&mut store, &script).unwrap();
        assert_eq!(outcomes.len(), 5);
        let granted = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                OperationOutcome::Requested(requested) => Some(requested.granted()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(granted, vec![true, true, false]);
        match outcomes.last() {
            Some(OperationOutcome::Detected(report)) => {
                assert!(!report.is_deadlocked());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.snapshot().available("R3"), Some(1));
    }

    #[test]
    pub fn test_apply_all_stops_on_error() {
        let mut store = AllocationStore::new(definition()).unwrap();
        let script = vec![
            Operation::request(OperationScheduler::op_id(), "P1", pair()),
            Operation::release(OperationScheduler::op_id(), "P7"),
            Operation::request(OperationScheduler::op_id(), "P2", pair()),
        ];
        assert!(OperationScheduler::apply_all(&mut store, &script).is_err());
        assert!(store.process("P2").unwrap().allocation.is_zero());
    }

    #[test]
    pub fn test_operation_process() {
        let request = Operation::request(OperationScheduler::op_id(), "P1", pair());
        let release = Operation::release(OperationScheduler::op_id(), "P2");
        let detect = Operation::detect(OperationScheduler::op_id());
        assert_eq!(request.process().map(String::as_str), Some("P1"));
        assert_eq!(release.process().map(String::as_str), Some("P2"));
        assert_eq!(detect.process(), None);
    }

    #[test]
    pub fn test_op_id_unique() {
        let first = OperationScheduler::op_id();
        let second = OperationScheduler::op_id();
        assert_ne!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    pub async fn test_concurrent_operations_keep_invariant() {
        let store = AllocationStore::new(definition()).unwrap();
        let process_ids = store.process_ids().cloned().collect::<Vec<_>>();
        let resource_ids = store.resource_ids().cloned().collect::<Vec<_>>();
        let shared = SharedAllocationStore::new(store);

        let batches = (0..4)
            .map(|_| OperationScheduler::random_operations(&process_ids, &resource_ids, 200, 2))
            .collect::<Vec<_>>();
        let total_ops = batches.iter().map(|batch| batch.len()).sum::<usize>();
        let outcomes = OperationScheduler::schedule_with_task(shared.clone(), batches)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), total_ops);
        for outcome in outcomes.iter() {
            match outcome {
                OperationOutcome::Requested(requested) => requested.snapshot.verify().unwrap(),
                OperationOutcome::Released(released) => released.snapshot.verify().unwrap(),
                OperationOutcome::Detected(_) => {}
            }
        }
        shared.snapshot().verify().unwrap();
        assert!(shared.detect().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn test_concurrent_requests_never_overallocate() {
        let definition = SystemDefinition::new()
            .resource("R1", 1)
            .process("P1", [("R1", 1)])
            .process("P2", [("R1", 1)]);
        let shared = SharedAllocationStore::new(AllocationStore::new(definition).unwrap());
        let mut join_handlers = vec![];
        for pid in ["P1", "P2"] {
            let shared = shared.clone();
            join_handlers.push(tokio::task::spawn(async move {
                shared
                    .request(pid, &Demand::from_pairs([("R1", 1)]))
                    .unwrap()
                    .granted()
            }));
        }
        let granted = futures::future::join_all(join_handlers)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
        assert_eq!(shared.snapshot().available("R1"), Some(0));
        shared.with_store(|store| store.snapshot().verify().unwrap());
    }
}
