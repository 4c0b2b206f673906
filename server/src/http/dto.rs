use serde::{Deserialize, Serialize};
use shared_types::{Config, Group, LabelSet, VersionRef};
use std::collections::BTreeMap;

/// Request body for creating a config or storing a new version of one
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigRequest {
    pub version: String,
    pub entries: BTreeMap<String, String>,
}

impl ConfigRequest {
    /// The entry this request describes. `id` comes from the URL, if any.
    pub fn into_config(self, id: Option<String>) -> Config {
        Config {
            id: id.unwrap_or_default(),
            version: self.version,
            entries: self.entries,
        }
    }
}

/// Request body for creating a group or storing a new version of one
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupRequest {
    pub version: String,
    pub configs: Vec<LabelSet>,
}

impl GroupRequest {
    pub fn into_group(self, id: Option<String>) -> Group {
        Group {
            id: id.unwrap_or_default(),
            version: self.version,
            configs: self.configs,
        }
    }
}

/// Request body for appending label-sets to a group version
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelsRequest {
    pub configs: Vec<LabelSet>,
}

/// Response for listing config versions
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigVersionsResponse {
    pub versions: Vec<Config>,
}

/// Response for listing group versions
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupVersionsResponse {
    pub versions: Vec<Group>,
}

/// Label-sets of a group, either all of them or the ones matching a query
#[derive(Debug, Serialize, Deserialize)]
pub struct LabelsResponse {
    pub configs: Vec<LabelSet>,
}

/// Response for a successful delete
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub message: String,
    pub deleted: VersionRef,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
