use crate::dead_lock_detector::DetectionReport;
use crate::outcome::{ReleaseOutcome, RequestOutcome};
use crate::resource::{Demand, ProcessId};

#[derive(Eq, PartialEq, Hash, Debug, Clone)]
pub enum OpType {
    Request { process: ProcessId, demand: Demand },
    Release { process: ProcessId },
    Detect,
}

impl Default for OpType {
    fn default() -> Self {
        OpType::Detect
    }
}

#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct Operation {
    pub op_type: OpType,
    pub id: String,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            op_type: OpType::Detect,
            id: "_NONE".to_string(),
        }
    }
}

impl Operation {
    pub fn new(id: String, op_type: OpType) -> Self {
        Self { op_type, id }
    }

    pub fn request(id: String, process: impl Into<ProcessId>, demand: Demand) -> Self {
        Self::new(
            id,
            OpType::Request {
                process: process.into(),
                demand,
            },
        )
    }

    pub fn release(id: String, process: impl Into<ProcessId>) -> Self {
        Self::new(
            id,
            OpType::Release {
                process: process.into(),
            },
        )
    }

    pub fn detect(id: String) -> Self {
        Self::new(id, OpType::Detect)
    }

    pub fn process(&self) -> Option<&ProcessId> {
        match &self.op_type {
            OpType::Request { process, .. } | OpType::Release { process } => Some(process),
            OpType::Detect => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OperationOutcome {
    Requested(RequestOutcome),
    Released(ReleaseOutcome),
    Detected(DetectionReport),
}
