use serde::{Deserialize, Serialize};

/// Identity of the instance being placed plus the candidate node addresses.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceInfo {
    pub env: String,
    pub app: String,
    #[serde(rename = "appId")]
    pub app_id: String,
    pub ip: String,
    #[serde(rename = "nodeIp")]
    pub node_ip: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceAllocationRequest {
    pub env: String,
    pub ins_info: InstanceInfo,
}

/// Missing or null fields decode to their zero value.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeScore {
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
}

/// The echoed identity is informational only; null values are tolerated.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceAllocationData {
    #[serde(deserialize_with = "null_as_default")]
    pub app: String,
    #[serde(deserialize_with = "null_as_default")]
    pub env: String,
    #[serde(rename = "appId", deserialize_with = "null_as_default")]
    pub app_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(rename = "nodeScores", deserialize_with = "null_as_default")]
    pub node_scores: Vec<NodeScore>,
}

/// Body returned by the oracle. `message` and `data` may be missing or
/// null on business errors.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceAllocationResponse {
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: InstanceAllocationData,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
