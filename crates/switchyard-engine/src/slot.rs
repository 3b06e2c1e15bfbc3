use std::path::PathBuf;

use switchyard_core::{CorrelationId, ExecutorState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::UnitOutcome;

/// The executor's single in-flight slot.
#[derive(Debug, Default)]
pub enum Slot {
    #[default]
    Idle,
    Running(RunningUnit),
}

#[derive(Debug)]
pub struct RunningUnit {
    pub correlation_id: CorrelationId,
    pub action: String,
    pub cancel: CancellationToken,
    pub task: JoinHandle<UnitOutcome>,
    pub started_at: String,
    /// The response goes to the session the unit started in, even after a
    /// session switch.
    pub responses_path: PathBuf,
}

impl Slot {
    pub fn state(&self) -> ExecutorState {
        match self {
            Self::Idle => ExecutorState::Idle,
            Self::Running(_) => ExecutorState::Running,
        }
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Self::Idle => None,
            Self::Running(unit) => Some(&unit.correlation_id),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Cancel the running unit when `target` names it. A unit whose task has
    /// already completed keeps its outcome.
    pub fn cancel_if(&self, target: &CorrelationId) -> bool {
        match self {
            Self::Running(unit) if &unit.correlation_id == target && !unit.task.is_finished() => {
                unit.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// True when the running task has completed and can be reaped.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Idle => false,
            Self::Running(unit) => unit.task.is_finished(),
        }
    }

    pub fn take(&mut self) -> Option<RunningUnit> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::Running(unit) => Some(unit),
        }
    }
}
