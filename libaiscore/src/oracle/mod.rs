//! Client for the external score oracle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::AiScoreArgs;
use crate::error::{OracleError, PluginError};

pub mod model;

use model::{InstanceAllocationRequest, InstanceAllocationResponse};

/// Source of per-node scores for one scheduling cycle.
#[async_trait]
pub trait ScoreOracle: Send + Sync {
    async fn fetch_scores(
        &self,
        request: &InstanceAllocationRequest,
    ) -> Result<InstanceAllocationResponse, OracleError>;
}

/// Oracle reached over JSON/HTTP.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpOracle {
    /// Builds the client. Does not open any connection.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PluginError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn from_args(args: &AiScoreArgs) -> Result<Self, PluginError> {
        Self::new(args.endpoint.clone(), args.timeout())
    }

    fn map_transport(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else {
            OracleError::Transport(err)
        }
    }
}

#[async_trait]
impl ScoreOracle for HttpOracle {
    async fn fetch_scores(
        &self,
        request: &InstanceAllocationRequest,
    ) -> Result<InstanceAllocationResponse, OracleError> {
        if request.ins_info.node_ip.is_empty() {
            return Err(OracleError::EmptyCandidates);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        // Read the whole body on every path so the connection goes back to the pool.
        let bytes = resp.bytes().await.map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            log::trace!(
                "oracle {} replied {status} with {} byte body",
                self.endpoint,
                bytes.len()
            );
            return Err(OracleError::HttpStatus(status));
        }

        serde_json::from_slice(&bytes).map_err(OracleError::Decode)
    }
}
