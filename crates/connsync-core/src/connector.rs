//! Connector domain types.

use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, SyncCursor};

/// Feature flags of a connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub incremental_sync_enabled: bool,
    #[serde(default)]
    pub sync_rules_enabled: bool,
    /// Document-level security; access-control syncs then require a platinum license.
    #[serde(default)]
    pub document_level_security_enabled: bool,
    /// Native connectors authenticate with an API key fetched from secret storage.
    #[serde(default)]
    pub native_connector_api_keys_enabled: bool,
}

/// A configured data-source instance with persistent cross-job state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,

    /// Service type of the data source (e.g. "servicenow").
    pub service_type: String,

    /// Destination index.
    pub index_name: String,

    /// Native connectors are managed by the hosting service.
    #[serde(default)]
    pub native: bool,

    #[serde(default)]
    pub features: Features,

    /// Status of the last content (full/incremental) sync.
    pub last_sync_status: Option<JobStatus>,

    /// Status of the last access-control sync.
    pub last_access_control_sync_status: Option<JobStatus>,

    /// Cursor saved by the last content sync.
    pub sync_cursor: Option<SyncCursor>,

    /// Secret storage id of the native connector API key.
    pub api_key_secret_id: Option<String>,
}

impl Connector {
    /// Creates a connector with no sync history.
    pub fn new(
        id: impl Into<String>,
        service_type: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            index_name: index_name.into(),
            native: false,
            features: Features::default(),
            last_sync_status: None,
            last_access_control_sync_status: None,
            sync_cursor: None,
            api_key_secret_id: None,
        }
    }
}
