use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the score oracle.
///
/// The score plugin treats every variant as "no opinion this cycle".
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("scoring request has no candidate nodes")]
    EmptyCandidates,

    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),

    #[error("oracle request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("oracle replied with HTTP status {0}")]
    HttpStatus(StatusCode),

    #[error("failed to decode oracle response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("oracle request cancelled")]
    Cancelled,
}

/// Errors raised while constructing the plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to decode plugin arguments: {0}")]
    DecodeArgs(#[from] serde_yaml::Error),

    #[error("failed to build oracle client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Node lookup failure reported by the framework handle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("node {0:?} not found in snapshot")]
    NodeNotFound(String),
}
