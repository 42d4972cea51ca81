use once_cell::sync::Lazy;
use rag_deadlock::allocation_store::{AllocationStore, SharedAllocationStore};
use rag_deadlock::logging::setup_tracing;
use rag_deadlock::operation::{Operation, OperationOutcome};
use rag_deadlock::operation_scheduler::OperationScheduler;
use rag_deadlock::resource::{Demand, SystemDefinition};
use tracing::info;

const WORKER_NUM: usize = 4;
const OPERATIONS_PER_WORKER: usize = 1000;

static SYSTEM: Lazy<SystemDefinition> = Lazy::new(|| {
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
});

fn report(outcome: &OperationOutcome) {
    match outcome {
        OperationOutcome::Requested(requested) => {
            if requested.granted() {
                info!("Resources allocated to Process {}", requested.process_id);
            } else {
                info!("Process {} must wait: Resources unavailable", requested.process_id);
            }
            info!("\n{}", requested.snapshot);
        }
        OperationOutcome::Released(released) => {
            info!("Process {} released {}", released.process_id, released.released);
            info!("\n{}", released.snapshot);
        }
        OperationOutcome::Detected(detection) => {
            for pid in detection.finish_order.iter() {
                info!("Process {} can finish", pid);
            }
            if detection.is_deadlocked() {
                info!(
                    "Deadlock Detected: Processes in deadlock: {:?}",
                    detection.deadlocked
                );
            } else {
                info!("No Deadlock Detected");
            }
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 6)]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    let mut store = AllocationStore::new(SYSTEM.clone())?;
    info!(config = ?store.config(), "allocation store ready");
    let script = vec![
        Operation::request(
            OperationScheduler::op_id(),
            "P1",
            Demand::from_pairs([("R1", 0), ("R2", 1), ("R3", 1)]),
        ),
        Operation::request(
            OperationScheduler::op_id(),
            "P2",
            Demand::from_pairs([("R1", 0), ("R2", 1), ("R3", 1)]),
        ),
        Operation::request(
            OperationScheduler::op_id(),
            "P3",
            Demand::from_pairs([("R1", 1), ("R2", 0), ("R3", 1)]),
        ),
        Operation::detect(OperationScheduler::op_id()),
    ];
    for outcome in OperationScheduler::apply_all(&mut store, &script)?.iter() {
        report(outcome);
    }

    let process_ids = store.process_ids().cloned().collect::<Vec<_>>();
    let resource_ids = store.resource_ids().cloned().collect::<Vec<_>>();
    let shared = SharedAllocationStore::new(AllocationStore::new(SYSTEM.clone())?);
    let batches = (0..WORKER_NUM)
        .map(|_| {
            OperationScheduler::random_operations(
                &process_ids,
                &resource_ids,
                OPERATIONS_PER_WORKER,
                2,
            )
        })
        .collect::<Vec<_>>();
    let outcomes = OperationScheduler::schedule_with_task(shared.clone(), batches).await?;
    let snapshot = shared.snapshot();
    snapshot.verify()?;
    for resource in snapshot.resources.values() {
        info!("{}: {} held, {} available", resource.id, resource.held(), resource.available);
    }
    let waiting = snapshot
        .processes
        .values()
        .filter(|process| process.is_waiting())
        .map(|process| process.id.as_str())
        .collect::<Vec<_>>();
    info!(?waiting, "processes with pending requests");
    info!(operations = outcomes.len(), "concurrent run finished");
    report(&OperationOutcome::Detected(shared.detect()?));
    Ok(())
}
