pub mod allocation_store;
pub mod dead_lock_detector;
pub mod logging;
pub mod operation;
pub mod operation_scheduler;
pub mod outcome;
pub mod resource;
pub mod resource_vector_macro;
mod validate;

pub use allocation_store::{
    AllocationErrorCode, AllocationSnapshot, AllocationStore, SharedAllocationStore, StoreConfig,
};
pub use dead_lock_detector::{DeadlockDetector, DetectionReport};
pub use outcome::{GrantStatus, ReleaseOutcome, RequestOutcome};
pub use resource::{Demand, ProcessId, ResourceId, SystemDefinition, Units};
