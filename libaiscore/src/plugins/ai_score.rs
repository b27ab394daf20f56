//! Score plugin backed by an external oracle.
//!
//! PreScore sends the pod identity and all candidate nodes to the oracle in
//! one request and stores the returned per-node scores in the cycle state.
//! Score only reads that map. Any oracle failure degrades to "no
//! preference": nothing is stored and every node scores 0.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::FrameworkHandle;
use crate::config::{AiScoreArgs, LabelGate};
use crate::cycle_state::{CycleState, ReadError, StateData};
use crate::error::{OracleError, PluginError};
use crate::models::{NodeInfo, PodInfo};
use crate::oracle::model::{InstanceAllocationRequest, InstanceAllocationResponse, InstanceInfo};
use crate::oracle::{HttpOracle, ScoreOracle};
use crate::plugins::{Plugin, PreScorePlugin, ScorePlugin, ScoringPlugin, Status};

/// Name is the name of the plugin used in the registry and configurations.
pub const NAME: &str = "AiScore";
const AI_SCORE_PRE_SCORE_KEY: &str = "PreScoreAiScore";
/// Score given to nodes the oracle has no opinion about.
pub const NEUTRAL_SCORE: i64 = 0;

const APP_LABEL: &str = "app";
const APP_ID_LABEL: &str = "appid";
const ENV_LABEL: &str = "env";
const IP_LABEL: &str = "ip";

/// Per-node scores computed at PreScore and read at Score.
#[derive(Clone, Debug, Default)]
pub struct AiScoreState {
    scores: Arc<HashMap<String, i64>>,
}

impl AiScoreState {
    pub fn get(&self, node_name: &str) -> Option<i64> {
        self.scores.get(node_name).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl StateData for AiScoreState {
    fn clone_state(&self) -> Box<dyn StateData> {
        // The map is never mutated after PreScore, sharing it is enough.
        Box::new(self.clone())
    }
}

impl From<HashMap<String, i64>> for AiScoreState {
    fn from(scores: HashMap<String, i64>) -> Self {
        Self {
            scores: Arc::new(scores),
        }
    }
}

pub struct AiScore {
    args: AiScoreArgs,
    handle: Arc<dyn FrameworkHandle>,
    oracle: Arc<dyn ScoreOracle>,
}

impl AiScore {
    /// Initializes a new plugin. No network I/O happens here.
    pub fn new(
        configuration: Option<&serde_yaml::Value>,
        handle: Arc<dyn FrameworkHandle>,
    ) -> Result<Self, PluginError> {
        let args = AiScoreArgs::decode(configuration)?;
        let oracle = Arc::new(HttpOracle::from_args(&args)?);
        Ok(Self::with_oracle(args, handle, oracle))
    }

    pub fn with_oracle(
        args: AiScoreArgs,
        handle: Arc<dyn FrameworkHandle>,
        oracle: Arc<dyn ScoreOracle>,
    ) -> Self {
        Self {
            args,
            handle,
            oracle,
        }
    }

    fn build_request(&self, pod: &PodInfo, nodes: &[NodeInfo]) -> InstanceAllocationRequest {
        let labels = &pod.labels;
        InstanceAllocationRequest {
            env: self.args.env.clone(),
            ins_info: InstanceInfo {
                env: labels.get_or_default(ENV_LABEL).to_string(),
                app: labels.get_or_default(APP_LABEL).to_string(),
                app_id: labels.get_or_default(APP_ID_LABEL).to_string(),
                ip: labels.get_or_default(IP_LABEL).to_string(),
                node_ip: nodes.iter().map(|n| n.name.clone()).collect(),
            },
        }
    }

    /// Turns an oracle answer into the cycle score map.
    /// `None` when the answer carries no usable scores.
    fn to_state(&self, resp: InstanceAllocationResponse) -> Option<AiScoreState> {
        if resp.code != self.args.success_code {
            log::warn!(
                "oracle returned code {} ({:?}), expected {}",
                resp.code,
                resp.message,
                self.args.success_code
            );
            return None;
        }
        if resp.data.node_scores.is_empty() {
            log::debug!("oracle returned no node scores for app {:?}", resp.data.app);
            return None;
        }
        let scores: HashMap<String, i64> = resp
            .data
            .node_scores
            .into_iter()
            .map(|s| (s.ip, s.score))
            .collect();
        Some(scores.into())
    }

    async fn query_oracle(
        &self,
        ctx: &CancellationToken,
        request: &InstanceAllocationRequest,
    ) -> Result<InstanceAllocationResponse, OracleError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(OracleError::Cancelled),
            resp = self.oracle.fetch_scores(request) => resp,
        }
    }
}

fn gate_allows(gate: Option<&LabelGate>, pod: &PodInfo) -> bool {
    match gate {
        Some(gate) => pod.labels.get_or_default(&gate.key) == gate.value,
        None => true,
    }
}

impl Plugin for AiScore {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl PreScorePlugin for AiScore {
    async fn pre_score(
        &self,
        ctx: &CancellationToken,
        state: &mut CycleState,
        pod: &PodInfo,
        nodes: &[NodeInfo],
    ) -> Status {
        if nodes.is_empty() {
            // No nodes to score.
            return Status::default();
        }
        if !gate_allows(self.args.label_gate.as_ref(), pod) {
            log::trace!("pod {} not gated for oracle scoring", pod.name);
            return Status::default();
        }

        let request = self.build_request(pod, nodes);
        log::debug!(
            "querying oracle for pod {} app: {} appId: {} env: {} ip: {} nodes: {}",
            pod.name,
            request.ins_info.app,
            request.ins_info.app_id,
            request.ins_info.env,
            request.ins_info.ip,
            nodes.len()
        );

        let resp = match self.query_oracle(ctx, &request).await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("oracle unavailable for pod {}: {e}", pod.name);
                return Status::default();
            }
        };

        if let Some(scores) = self.to_state(resp) {
            log::debug!("pod {} got {} oracle scores", pod.name, scores.len());
            state.write(AI_SCORE_PRE_SCORE_KEY, Box::new(scores));
        }
        Status::default()
    }
}

impl ScorePlugin for AiScore {
    fn score(&self, state: &CycleState, pod: &PodInfo, node_name: &str) -> (i64, Status) {
        if let Err(e) = self.handle.node_infos().get(node_name) {
            return (
                NEUTRAL_SCORE,
                Status::error(&format!("getting node {node_name:?} from snapshot: {e}"))
                    .with_plugin(NAME),
            );
        }

        let scores = match state.read::<AiScoreState>(AI_SCORE_PRE_SCORE_KEY) {
            Ok(s) => s,
            Err(e @ ReadError::NotFound(_)) => {
                log::trace!("no oracle scores for pod {}: {e}", pod.name);
                return (NEUTRAL_SCORE, Status::default());
            }
            Err(e @ ReadError::WrongType(_)) => {
                log::warn!("ignoring cycle state for pod {}: {e}", pod.name);
                return (NEUTRAL_SCORE, Status::default());
            }
        };

        let score = scores.get(node_name).unwrap_or(NEUTRAL_SCORE);
        log::trace!(
            "pod {} app: {} node: {node_name} score: {score}",
            pod.name,
            pod.labels.get_or_default(APP_LABEL)
        );
        (score, Status::default())
    }
}

/// Registry entry point.
pub fn factory(
    configuration: Option<&serde_yaml::Value>,
    handle: Arc<dyn FrameworkHandle>,
) -> Result<Arc<dyn ScoringPlugin>, PluginError> {
    Ok(Arc::new(AiScore::new(configuration, handle)?))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::Snapshot;
    use crate::models::Labels;
    use crate::oracle::model::{InstanceAllocationData, NodeScore};
    use crate::plugins::{Code, PluginFactory};

    /// Oracle double answering from a fixed result and recording requests.
    struct FakeOracle {
        reply: Mutex<Option<Result<InstanceAllocationResponse, OracleError>>>,
        calls: AtomicUsize,
        last_request: Mutex<Option<InstanceAllocationRequest>>,
    }

    impl FakeOracle {
        fn new(reply: Result<InstanceAllocationResponse, OracleError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScoreOracle for FakeOracle {
        async fn fetch_scores(
            &self,
            request: &InstanceAllocationRequest,
        ) -> Result<InstanceAllocationResponse, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(OracleError::Cancelled))
        }
    }

    /// Oracle that never answers.
    struct PendingOracle;

    #[async_trait]
    impl ScoreOracle for PendingOracle {
        async fn fetch_scores(
            &self,
            _: &InstanceAllocationRequest,
        ) -> Result<InstanceAllocationResponse, OracleError> {
            std::future::pending().await
        }
    }

    fn response(code: i64, scores: &[(&str, i64)]) -> InstanceAllocationResponse {
        InstanceAllocationResponse {
            code,
            message: String::new(),
            data: InstanceAllocationData {
                node_scores: scores
                    .iter()
                    .map(|(ip, score)| NodeScore {
                        score: *score,
                        ip: ip.to_string(),
                    })
                    .collect(),
                ..Default::default()
            },
        }
    }

    fn nodes() -> Vec<NodeInfo> {
        ["10.0.0.1", "10.0.0.2", "10.0.0.3"]
            .into_iter()
            .map(NodeInfo::new)
            .collect()
    }

    fn make_pod() -> PodInfo {
        PodInfo::new(
            "web-0",
            [("app", "web"), ("appid", "1001"), ("env", "fat")]
                .into_iter()
                .collect(),
        )
    }

    fn make_plugin(oracle: Arc<dyn ScoreOracle>, args: AiScoreArgs) -> AiScore {
        AiScore::with_oracle(args, Arc::new(Snapshot::new(nodes())), oracle)
    }

    async fn run_pre_score(plugin: &AiScore, nodes: &[NodeInfo]) -> (CycleState, Status) {
        let mut state = CycleState::new();
        let status = plugin
            .pre_score(&CancellationToken::new(), &mut state, &make_pod(), nodes)
            .await;
        (state, status)
    }

    #[tokio::test]
    async fn test_pre_score_empty_nodes_is_noop() {
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7)])));
        let plugin = make_plugin(oracle.clone(), AiScoreArgs::default());
        let (state, status) = run_pre_score(&plugin, &[]).await;
        assert!(status.is_success());
        assert!(!state.contains(AI_SCORE_PRE_SCORE_KEY));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_pre_score_builds_request_from_labels() {
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7)])));
        let plugin = make_plugin(oracle.clone(), AiScoreArgs::default());
        run_pre_score(&plugin, &nodes()).await;

        let request = oracle.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.env, "TEST");
        assert_eq!(request.ins_info.app, "web");
        assert_eq!(request.ins_info.app_id, "1001");
        assert_eq!(request.ins_info.env, "fat");
        // Missing label is sent as an empty string.
        assert_eq!(request.ins_info.ip, "");
        assert_eq!(
            request.ins_info.node_ip,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[tokio::test]
    async fn test_pre_score_duplicate_ip_last_wins() {
        let oracle = FakeOracle::new(Ok(response(
            100000,
            &[("10.0.0.1", 7), ("10.0.0.2", 3), ("10.0.0.1", 9)],
        )));
        let plugin = make_plugin(oracle, AiScoreArgs::default());
        let (state, _) = run_pre_score(&plugin, &nodes()).await;

        let scores = state.read::<AiScoreState>(AI_SCORE_PRE_SCORE_KEY).unwrap();
        assert!(!scores.is_empty());
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get("10.0.0.1"), Some(9));
        assert_eq!(scores.get("10.0.0.2"), Some(3));
    }

    #[tokio::test]
    async fn test_pre_score_invalid_responses_write_nothing() {
        let cases: Vec<Result<InstanceAllocationResponse, OracleError>> = vec![
            Ok(response(1, &[("10.0.0.1", 7)])),
            Ok(response(100000, &[])),
            Err(OracleError::Timeout(std::time::Duration::from_millis(10))),
            Err(OracleError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY)),
            Err(OracleError::Decode(
                serde_json::from_str::<InstanceAllocationResponse>("{").unwrap_err(),
            )),
        ];
        for reply in cases {
            let plugin = make_plugin(FakeOracle::new(reply), AiScoreArgs::default());
            let (state, status) = run_pre_score(&plugin, &nodes()).await;
            assert!(status.is_success());
            assert!(!state.contains(AI_SCORE_PRE_SCORE_KEY));
        }
    }

    #[tokio::test]
    async fn test_pre_score_cancelled_writes_nothing() {
        let plugin = make_plugin(Arc::new(PendingOracle), AiScoreArgs::default());
        let ctx = CancellationToken::new();
        ctx.cancel();
        let mut state = CycleState::new();
        let status = plugin.pre_score(&ctx, &mut state, &make_pod(), &nodes()).await;
        assert!(status.is_success());
        assert!(!state.contains(AI_SCORE_PRE_SCORE_KEY));
    }

    #[tokio::test]
    async fn test_pre_score_label_gate() {
        let args = AiScoreArgs {
            label_gate: Some(LabelGate {
                key: "aiScheduler".to_string(),
                value: "aiScheduler".to_string(),
            }),
            ..Default::default()
        };
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7)])));
        let plugin = make_plugin(oracle.clone(), args.clone());
        let (state, status) = run_pre_score(&plugin, &nodes()).await;
        assert!(status.is_success());
        assert!(!state.contains(AI_SCORE_PRE_SCORE_KEY));
        assert_eq!(oracle.calls(), 0);

        let mut labels = Labels::new();
        labels.insert("aiScheduler", "aiScheduler");
        let pod = PodInfo::new("gated", labels);
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7)])));
        let plugin = make_plugin(oracle.clone(), args);
        let mut state = CycleState::new();
        plugin
            .pre_score(&CancellationToken::new(), &mut state, &pod, &nodes())
            .await;
        assert_eq!(oracle.calls(), 1);
        assert!(state.contains(AI_SCORE_PRE_SCORE_KEY));
    }

    #[tokio::test]
    async fn test_score_reads_map() {
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7), ("10.0.0.2", 0)])));
        let plugin = make_plugin(oracle, AiScoreArgs::default());
        let (state, _) = run_pre_score(&plugin, &nodes()).await;
        let pod = make_pod();

        let (score, status) = plugin.score(&state, &pod, "10.0.0.1");
        assert_eq!(score, 7);
        assert!(status.is_success());

        // Zero is a real oracle score.
        let (score, status) = plugin.score(&state, &pod, "10.0.0.2");
        assert_eq!(score, 0);
        assert!(status.is_success());

        let (score, status) = plugin.score(&state, &pod, "10.0.0.3");
        assert_eq!(score, NEUTRAL_SCORE);
        assert!(status.is_success());
    }

    #[test]
    fn test_score_without_state_is_neutral() {
        let plugin = make_plugin(Arc::new(PendingOracle), AiScoreArgs::default());
        let (score, status) = plugin.score(&CycleState::new(), &make_pod(), "10.0.0.1");
        assert_eq!(score, NEUTRAL_SCORE);
        assert!(status.is_success());
    }

    #[test]
    fn test_score_wrong_state_type_is_neutral() {
        #[derive(Clone)]
        struct Foreign;
        impl StateData for Foreign {
            fn clone_state(&self) -> Box<dyn StateData> {
                Box::new(self.clone())
            }
        }

        let plugin = make_plugin(Arc::new(PendingOracle), AiScoreArgs::default());
        let mut state = CycleState::new();
        state.write(AI_SCORE_PRE_SCORE_KEY, Box::new(Foreign));
        let (score, status) = plugin.score(&state, &make_pod(), "10.0.0.1");
        assert_eq!(score, NEUTRAL_SCORE);
        assert!(status.is_success());
    }

    #[test]
    fn test_score_unknown_node_is_error() {
        let plugin = make_plugin(Arc::new(PendingOracle), AiScoreArgs::default());
        let mut state = CycleState::new();
        let scores: HashMap<String, i64> = [("10.9.9.9".to_string(), 5)].into_iter().collect();
        state.write(AI_SCORE_PRE_SCORE_KEY, Box::new(AiScoreState::from(scores)));

        let (score, status) = plugin.score(&state, &make_pod(), "10.9.9.9");
        assert_eq!(score, 0);
        assert_eq!(status.code, Code::Error);
        assert_eq!(status.plugin, NAME);
    }

    #[tokio::test]
    async fn test_cloned_state_keeps_scores() {
        let oracle = FakeOracle::new(Ok(response(100000, &[("10.0.0.1", 7)])));
        let plugin = make_plugin(oracle, AiScoreArgs::default());
        let (state, _) = run_pre_score(&plugin, &nodes()).await;

        let cloned = state.clone();
        drop(state);
        let (score, _) = plugin.score(&cloned, &make_pod(), "10.0.0.1");
        assert_eq!(score, 7);
    }

    #[test]
    fn test_factory_builds_plugin_without_network() {
        let factory: PluginFactory = factory;
        let config: serde_yaml::Value =
            serde_yaml::from_str("endpoint: http://10.255.255.1:1/score").unwrap();
        let plugin = factory(Some(&config), Arc::new(Snapshot::default())).unwrap();
        assert_eq!(plugin.name(), NAME);

        let bad: serde_yaml::Value = serde_yaml::from_str("timeout_ms: 0").unwrap();
        assert!(factory(Some(&bad), Arc::new(Snapshot::default())).is_err());
    }
}
