use crate::allocation_store::AllocationSnapshot;
use crate::resource::{Allocation, ProcessId};

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum GrantStatus {
    Granted,
    /// Not every named resource had enough units; nothing was allocated.
    Deferred,
}

impl GrantStatus {
    pub fn is_granted(&self) -> bool {
        matches!(*self, GrantStatus::Granted)
    }
}

impl Default for GrantStatus {
    fn default() -> Self {
        GrantStatus::Deferred
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestOutcome {
    pub process_id: ProcessId,
    pub status: GrantStatus,
    pub snapshot: AllocationSnapshot,
}

impl RequestOutcome {
    pub fn new(process_id: ProcessId, status: GrantStatus, snapshot: AllocationSnapshot) -> Self {
        Self {
            process_id,
            status,
            snapshot,
        }
    }

    pub fn granted(&self) -> bool {
        self.status.is_granted()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReleaseOutcome {
    pub process_id: ProcessId,
    /// Units handed back to `available`.
    pub released: Allocation,
    pub snapshot: AllocationSnapshot,
}

impl ReleaseOutcome {
    pub fn new(process_id: ProcessId, released: Allocation, snapshot: AllocationSnapshot) -> Self {
        Self {
            process_id,
            released,
            snapshot,
        }
    }
}
