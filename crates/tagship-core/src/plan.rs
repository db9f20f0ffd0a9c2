//! What a run would do for an event, without doing it.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::event::Event;
use crate::matrix::{JobSpec, MatrixConfig};
use crate::trigger::{evaluate_trigger, TriggerConfig, TriggerDecision};

/// Trigger decision plus the jobs a run would start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub decision: TriggerDecision,

    /// Empty whenever `decision.should_run` is false.
    pub jobs: Vec<JobSpec>,
}

impl RunPlan {
    pub fn new(trigger: &TriggerConfig, matrix: &MatrixConfig, event: &Event) -> Self {
        let decision = evaluate_trigger(trigger, event);
        let jobs = if decision.should_run {
            matrix.expand()
        } else {
            Vec::new()
        };
        Self { decision, jobs }
    }

    /// Whether the planned jobs attach their archives to a release.
    pub fn publishes(&self) -> bool {
        self.decision.is_publishable && !self.jobs.is_empty()
    }
}

impl PipelineConfig {
    /// Plan a run of this configuration for `event`.
    pub fn plan(&self, event: &Event) -> RunPlan {
        RunPlan::new(&self.trigger, &self.matrix_config(), event)
    }
}
