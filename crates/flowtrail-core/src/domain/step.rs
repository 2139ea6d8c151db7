use super::ids::{FlowId, StepId};
use crate::types::{JsonMap, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a step performs; selects its dispatch handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    /// Delegates to the remote-call gateway
    RemoteCall,
    /// Chooses the next step from a predicate
    Condition,
    /// Iterates over a bounded collection
    Loop,
    /// Binds execution parameters
    Input,
    /// Projects parameters into the execution result
    Output,
    /// Starts a nested execution of another flow
    Subflow,
}

impl StepType {
    /// All step types, in declaration order
    pub const ALL: [StepType; 6] = [
        StepType::RemoteCall,
        StepType::Condition,
        StepType::Loop,
        StepType::Input,
        StepType::Output,
        StepType::Subflow,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::RemoteCall => "remote-call",
            StepType::Condition => "condition",
            StepType::Loop => "loop",
            StepType::Input => "input",
            StepType::Output => "output",
            StepType::Subflow => "subflow",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a step on the designer canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: i64,
    /// Vertical coordinate
    pub y: i64,
}

impl Position {
    /// Create a position
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Entity: one typed unit of work inside a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier
    pub id: StepId,
    /// Owning flow; immutable after creation
    pub flow_id: FlowId,
    /// Display name
    pub name: String,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step type
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Type-specific configuration
    pub config: JsonMap,
    /// Canvas position
    pub position: Position,
    /// Creation timestamp
    pub created_at: Timestamp,
    /// Last updated timestamp
    pub updated_at: Timestamp,
}

/// Fields accepted when creating a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStep {
    /// Owning flow
    pub flow_id: FlowId,
    /// Display name
    pub name: String,
    /// Optional free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Step type
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Type-specific configuration
    #[serde(default)]
    pub config: JsonMap,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
}

impl NewStep {
    /// Create a step request with empty config at the origin
    pub fn new(flow_id: FlowId, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            flow_id,
            name: name.into(),
            description: None,
            step_type,
            config: JsonMap::new(),
            position: Position::default(),
        }
    }

    /// Replace the config
    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.config = config;
        self
    }

    /// Set the canvas position
    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of a step. There is no `flow_id`: steps are never re-parented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New type
    #[serde(default, rename = "type")]
    pub step_type: Option<StepType>,
    /// Replacement config
    #[serde(default)]
    pub config: Option<JsonMap>,
    /// New canvas position
    #[serde(default)]
    pub position: Option<Position>,
}

impl Step {
    /// Create a step from a request
    pub fn new(new_step: NewStep) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::new_v4(),
            flow_id: new_step.flow_id,
            name: new_step.name,
            description: new_step.description,
            step_type: new_step.step_type,
            config: new_step.config,
            position: new_step.position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge the supplied fields and refresh `updated_at`
    pub fn apply(&mut self, patch: StepPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(step_type) = patch.step_type {
            self.step_type = step_type;
        }
        if let Some(config) = patch.config {
            self.config = config;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        self.updated_at = Utc::now();
    }
}
