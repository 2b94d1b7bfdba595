//! Normalized webhook events.

use crate::LicenseKitError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event field populated by a [`FieldRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    /// `event_type`.
    Type,
    /// `created_at`.
    CreatedAt,
    /// `data`.
    Data,
}

/// Maps one source key of the raw payload onto an event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// Key looked up in the raw JSON object.
    pub source: &'static str,
    /// Field it populates.
    pub target: EventField,
}

/// Source keys in priority order. For each target, the first rule whose
/// source key is present and non-null wins.
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule { source: "type", target: EventField::Type },
    FieldRule { source: "event", target: EventField::Type },
    FieldRule { source: "created_at", target: EventField::CreatedAt },
    FieldRule { source: "createdAt", target: EventField::CreatedAt },
    FieldRule { source: "data", target: EventField::Data },
    FieldRule { source: "object", target: EventField::Data },
];

/// A webhook delivery, normalized across payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
}

impl WebhookEvent {
    /// Build an event directly.
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        created_at: Option<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            created_at,
            data,
        }
    }

    /// Normalize a raw JSON payload using [`FIELD_RULES`].
    ///
    /// # Errors
    /// `InvalidPayload` if the payload is not an object, or if the resolved
    /// data field is neither an object nor null.
    pub fn from_value(value: Value) -> Result<Self, LicenseKitError> {
        let Value::Object(mut raw) = value else {
            return Err(LicenseKitError::InvalidPayload(
                "webhook payload must be a JSON object".to_string(),
            ));
        };

        let id = raw.get("id").map(scalar_text).unwrap_or_default();

        let mut event_type = None;
        let mut created_at = None;
        let mut data = None;

        for rule in FIELD_RULES {
            let slot_filled = match rule.target {
                EventField::Type => event_type.is_some(),
                EventField::CreatedAt => created_at.is_some(),
                EventField::Data => data.is_some(),
            };
            if slot_filled {
                continue;
            }

            let Some(found) = raw.remove(rule.source).filter(|v| !v.is_null()) else {
                continue;
            };

            match rule.target {
                EventField::Type => event_type = Some(scalar_text(&found)),
                EventField::CreatedAt => created_at = Some(scalar_text(&found)),
                EventField::Data => data = Some(found),
            }
        }

        let data = match data {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(LicenseKitError::InvalidPayload(format!(
                    "event data must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Self {
            id,
            event_type: event_type.unwrap_or_default(),
            created_at,
            data,
        })
    }

    /// Opaque event identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dot-namespaced event type, e.g. `license.created`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Timestamp text as delivered.
    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    /// Event body.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Decode the event body into a typed model.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, LicenseKitError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| LicenseKitError::InvalidPayload(format!("event data: {}", e)))
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
