//! Values exchanged with the EDI-Crop service.
//!
//! Everything here is produced fresh per call and owned by the caller; the
//! client keeps none of it between calls.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{MalformedInput, Result};
use crate::geometry::Geometry;
use crate::tree::XmlNode;

/// Property that closes a crop field; mandatory on every delete.
pub const END_DATE: &str = "EndDate";

/// Property identifying an existing crop field.
pub const CROP_FIELD_ID: &str = "CropFieldID";

/// Server-side handle of a submitted mutation batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MutationTicket(String);

impl MutationTicket {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MutationTicket {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MutationTicket {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Point-in-time progress of a ticket. The code is passed through verbatim;
/// [`ProcessStatus::state`] classifies it for callers that drive a loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    pub code: String,
    pub message: String,
    pub percentage: u8,
}

impl ProcessStatus {
    pub fn state(&self) -> ProcessState {
        ProcessState::from_code(&self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Submitted,
    InProgress,
    Validated,
    ValidationError,
    TechnicalError,
    Formalized,
    Cancelled,
    Unknown,
}

impl ProcessState {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Self::Submitted,
            "IN_PROGRESS" => Self::InProgress,
            "VALIDATED" => Self::Validated,
            "VALIDATION_ERROR" => Self::ValidationError,
            "TECHNICAL_ERROR" => Self::TechnicalError,
            "FORMALIZED" => Self::Formalized,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Polling can stop: the ticket either awaits formalize/cancel or is
    /// finished.
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Submitted | Self::InProgress | Self::Unknown)
    }

    /// No further operation may reference the ticket.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ValidationError | Self::TechnicalError | Self::Formalized | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationMessage {
    pub code: String,
    pub message: String,
    pub severity: String,
    pub crop_field_id: Option<String>,
}

/// Diagnostics for a ticket. `fields` holds the raw field nodes under
/// validation, untouched, for callers that want to show them.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub ticket: MutationTicket,
    pub messages: Vec<ValidationMessage>,
    pub fields: Vec<XmlNode>,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Sequence number authorising one formalize attempt. Fetch a new one
/// before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TanSequence(u64);

impl TanSequence {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub ticket: MutationTicket,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Insert,
    Update,
    Delete,
}

impl MutationAction {
    pub fn code(self) -> &'static str {
        match self {
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insert" | "i" => Some(Self::Insert),
            "update" | "u" => Some(Self::Update),
            "delete" | "d" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// New border of a mutated crop field.
#[derive(Debug, Clone, PartialEq)]
pub enum BorderInput {
    /// WGS84 geometry, encoded to RD New GML on submit.
    Geometry(Geometry),
    /// GML the caller already serialised; sent verbatim.
    Gml(String),
}

/// One crop-field change in a submit batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMutation {
    pub action: MutationAction,
    pub properties: Vec<(String, String)>,
    pub border: Option<BorderInput>,
}

impl FieldMutation {
    pub fn new(action: MutationAction) -> Self {
        Self {
            action,
            properties: Vec::new(),
            border: None,
        }
    }

    pub fn insert() -> Self {
        Self::new(MutationAction::Insert)
    }

    pub fn update() -> Self {
        Self::new(MutationAction::Update)
    }

    pub fn delete() -> Self {
        Self::new(MutationAction::Delete)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.border = Some(BorderInput::Geometry(geometry));
        self
    }

    pub fn with_gml(mut self, gml: impl Into<String>) -> Self {
        self.border = Some(BorderInput::Gml(gml.into()));
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Reads a mutation from JSON:
    /// `{"action": "insert", "properties": {...}, "geometry": {...}}`, with
    /// `"gml": "<gml:Polygon>..."` accepted instead of `geometry`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let invalid = |message: String| MalformedInput::InvalidGeoJson(message);

        let action = value
            .get("action")
            .and_then(Value::as_str)
            .and_then(MutationAction::parse)
            .ok_or_else(|| invalid(format!("mutation has no valid `action`: {value}")))?;

        let mut mutation = Self::new(action);
        if let Some(properties) = value.get("properties").and_then(Value::as_object) {
            for (key, property) in properties {
                let text = match property {
                    Value::String(text) => text.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                mutation.properties.push((key.clone(), text));
            }
        }

        if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
            mutation.border = Some(BorderInput::Geometry(Geometry::from_geojson(geometry)?));
        } else if let Some(gml) = value.get("gml").and_then(Value::as_str) {
            mutation.border = Some(BorderInput::Gml(gml.to_string()));
        }

        Ok(mutation)
    }
}

/// Inclusive date range (`YYYY-MM-DD`) for crop-field queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub begin: String,
    pub end: String,
}

impl Period {
    pub fn new(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }
}
