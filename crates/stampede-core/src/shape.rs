//! Staged ramp profile.

use serde_yaml::Value;
use tracing::error;

use crate::config::ConfigTree;

/// One raw stage record. `users` and `spawn_rate` stay optional so an incomplete
/// record can be reported when it becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Elapsed-seconds threshold; the stage is active while elapsed time is below it.
    pub duration: f64,
    pub users: Option<u64>,
    pub spawn_rate: Option<f64>,
}

/// What the engine should do at a given tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeTick {
    Target { users: u64, spawn_rate: f64 },
    Terminal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadShape {
    stages: Vec<Stage>,
}

impl LoadShape {
    /// Stages are sorted ascending by duration.
    pub fn new(mut stages: Vec<Stage>) -> Self {
        stages.sort_by(|a, b| a.duration.total_cmp(&b.duration));
        Self { stages }
    }

    /// Build from the `load_shape.stages` key of a project view. `None` when the key is
    /// absent or holds no usable stage, in which case the engine's CLI parameters apply.
    pub fn from_config(view: &ConfigTree) -> Option<Self> {
        let records = view.get("load_shape.stages")?.as_sequence()?;
        let stages: Vec<Stage> = records.iter().filter_map(parse_stage).collect();
        if stages.is_empty() {
            return None;
        }
        Some(Self::new(stages))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total planned run time, i.e. the largest threshold.
    pub fn total_duration(&self) -> f64 {
        self.stages.last().map(|s| s.duration).unwrap_or(0.0)
    }

    /// Target for `elapsed` seconds into the run.
    pub fn tick(&self, elapsed: f64) -> ShapeTick {
        let Some(stage) = self.stages.iter().find(|s| elapsed < s.duration) else {
            return ShapeTick::Terminal;
        };
        match (stage.users, stage.spawn_rate) {
            (Some(users), Some(spawn_rate)) => ShapeTick::Target { users, spawn_rate },
            _ => {
                error!(duration = stage.duration, "Load shape stage is missing users or spawn_rate");
                ShapeTick::Terminal
            }
        }
    }
}

fn parse_stage(record: &Value) -> Option<Stage> {
    let Some(duration) = record.get("duration").and_then(Value::as_f64) else {
        error!(stage = ?record, "Load shape stage has no numeric duration, dropping it");
        return None;
    };
    Some(Stage {
        duration,
        users: record.get("users").and_then(Value::as_u64),
        spawn_rate: record.get("spawn_rate").and_then(Value::as_f64),
    })
}
