use super::ids::FlowId;
use crate::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a flow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Being edited, not yet released
    #[default]
    Draft,
    /// Released for use
    Published,
    /// Retired; no new executions may start
    Archived,
}

/// Aggregate: a named, versioned process definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Unique identifier
    pub id: FlowId,
    /// Display name
    pub name: String,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step graph document; stored and returned verbatim
    pub dsl: Value,
    /// Version label
    pub version: String,
    /// Lifecycle status
    pub status: FlowStatus,
    /// Creation timestamp
    pub created_at: Timestamp,
    /// Last updated timestamp
    pub updated_at: Timestamp,
}

/// Fields accepted when registering a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlow {
    /// Display name
    pub name: String,
    /// Optional free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Step graph document
    pub dsl: Value,
    /// Version label
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl NewFlow {
    /// Create a flow request with the default version
    pub fn new(name: impl Into<String>, dsl: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            dsl,
            version: default_version(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the version label
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Partial update of a flow; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowPatch {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement DSL document
    #[serde(default)]
    pub dsl: Option<Value>,
    /// New version label
    #[serde(default)]
    pub version: Option<String>,
    /// New lifecycle status
    #[serde(default)]
    pub status: Option<FlowStatus>,
}

impl FlowPatch {
    /// True when no field is supplied
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.dsl.is_none()
            && self.version.is_none()
            && self.status.is_none()
    }
}

impl Flow {
    /// Create a new draft flow
    pub fn new(new_flow: NewFlow) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::new_v4(),
            name: new_flow.name,
            description: new_flow.description,
            dsl: new_flow.dsl,
            version: new_flow.version,
            status: FlowStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge the supplied fields and refresh `updated_at`
    pub fn apply(&mut self, patch: FlowPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(dsl) = patch.dsl {
            self.dsl = dsl;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }

    /// Whether executions may be started against this flow
    #[inline]
    pub fn accepts_executions(&self) -> bool {
        self.status != FlowStatus::Archived
    }
}
