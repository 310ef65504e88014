//! Identity returned by the identity lookup endpoint
//!
//! The backend's user schema is not fixed, so the identity is kept as the raw
//! JSON object with a few typed accessors. Responses shaped `{ "user": {...} }`
//! are unwrapped to the inner object.

use serde::{Deserialize, Serialize};

/// The current user as reported by `GET /api/auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(serde_json::Value);

impl Identity {
    /// Build an identity from a lookup response body.
    pub fn from_response(body: serde_json::Value) -> Self {
        match body {
            serde_json::Value::Object(mut map) if map.get("user").is_some_and(|u| u.is_object()) => {
                Self(map.remove("user").unwrap_or_default())
            }
            other => Self(other),
        }
    }

    /// User identifier, whether the backend sends it as a string or a number.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Display name: `username`, falling back to `name` then `email`.
    pub fn display_name(&self) -> Option<&str> {
        ["username", "name", "email"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(|v| v.as_str()))
    }

    /// Raw field lookup.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}
