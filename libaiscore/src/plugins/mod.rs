//! Scheduler plugin seam.
//!
//! The extension points mirror their namesakes in the Kubernetes
//! scheduling framework. Only the scoring half of the cycle is modelled.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::FrameworkHandle;
use crate::cycle_state::CycleState;
use crate::error::PluginError;
use crate::models::{NodeInfo, PodInfo};

pub mod ai_score;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// Informational plugin called once per cycle with the nodes that passed filtering.
#[async_trait]
pub trait PreScorePlugin: Plugin {
    /// Runs before any Score call of the same cycle.
    /// Returning a non-success status rejects the pod.
    /// `ctx` is cancelled when the framework abandons the cycle.
    async fn pre_score(
        &self,
        ctx: &CancellationToken,
        state: &mut CycleState,
        pod: &PodInfo,
        nodes: &[NodeInfo],
    ) -> Status;
}

/// Plugin that ranks nodes passing the filtering phase.
pub trait ScorePlugin: Plugin {
    /// Assigns a score to a node (higher = better fit).
    /// May be called concurrently for different nodes of one cycle.
    fn score(&self, state: &CycleState, pod: &PodInfo, node_name: &str) -> (i64, Status);
}

/// A plugin registered at both PreScore and Score.
pub trait ScoringPlugin: PreScorePlugin + ScorePlugin {}

impl<T: PreScorePlugin + ScorePlugin> ScoringPlugin for T {}

/// Constructor signature stored by the host registry.
pub type PluginFactory = fn(
    Option<&serde_yaml::Value>,
    Arc<dyn FrameworkHandle>,
) -> Result<Arc<dyn ScoringPlugin>, PluginError>;

#[derive(Clone, Debug)]
pub struct Status {
    pub code: Code,
    pub reasons: Vec<String>,
    pub err: String,
    pub plugin: String,
}

impl Default for Status {
    /// Default success status
    fn default() -> Self {
        Self {
            code: Code::Success,
            reasons: vec![],
            err: String::new(),
            plugin: String::new(),
        }
    }
}

impl Status {
    pub fn error(error: &str) -> Self {
        Self {
            code: Code::Error,
            err: error.to_string(),
            ..Default::default()
        }
    }

    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = plugin.to_string();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

/// Code is the Status code/type which is returned from plugins.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Code {
    /// The plugin ran correctly.
    Success,
    /// Unexpected failure such as bad input from the framework.
    /// The pod is requeued rather than marked unschedulable.
    Error,
}
