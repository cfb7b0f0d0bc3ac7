//! Scripted sync sessions for `livecal replay`.

use std::path::Path;

use anyhow::{Context, Result};
use livecal_core::codec;
use livecal_core::event::DATE_FIELDS;
use livecal_core::wire::{DocumentData, Timestamp, WireValue};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

/// One thing that happens during a session, either on the peer or in the local scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Another client writes a whole document
    PeerPut { id: String, data: Map<String, Value> },
    /// Another client merges fields into a document
    PeerUpdate { id: String, data: Map<String, Value> },
    PeerDelete { id: String },
    /// The user adds an event. Without an id the scheduler picks a temp one.
    LocalCreate {
        #[serde(default)]
        id: Option<String>,
        fields: Map<String, Value>,
    },
    LocalUpdate { id: String, fields: Map<String, Value> },
    LocalDelete { id: String },
    OpenEditor { id: String },
    CloseEditor,
    /// Save the editor. A draft stashed by a remote delete becomes a new event.
    SaveEditor,
    /// Whether the editor vetoes remote deletes of the record it has open
    RejectCollisions { enabled: bool },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::PeerPut { id, .. } => format!("peer writes {}", id),
            Step::PeerUpdate { id, .. } => format!("peer updates {}", id),
            Step::PeerDelete { id } => format!("peer deletes {}", id),
            Step::LocalCreate { id: Some(id), .. } => format!("local create {}", id),
            Step::LocalCreate { id: None, .. } => "local create".to_string(),
            Step::LocalUpdate { id, .. } => format!("local update {}", id),
            Step::LocalDelete { id } => format!("local delete {}", id),
            Step::OpenEditor { id } => format!("open editor on {}", id),
            Step::CloseEditor => "close editor".to_string(),
            Step::SaveEditor => "save editor".to_string(),
            Step::RejectCollisions { enabled: true } => "editor rejects collisions".to_string(),
            Step::RejectCollisions { enabled: false } => "editor accepts collisions".to_string(),
        }
    }
}

/// Document data as a peer would write it: parseable date fields become timestamps.
pub fn document_data(data: &Map<String, Value>) -> DocumentData {
    data.iter()
        .map(|(key, value)| {
            let wire = if DATE_FIELDS.contains(&key.as_str()) {
                match codec::parse_date_value(value) {
                    Ok(dt) => WireValue::Timestamp(Timestamp::from_datetime(&dt)),
                    Err(_) => WireValue::Json(value.clone()),
                }
            } else {
                WireValue::Json(value.clone())
            };
            (key.clone(), wire)
        })
        .collect()
}
