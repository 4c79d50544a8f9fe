//! Context type for tracing which app caused a change

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin and causality of a state write, event or service call
///
/// Apps stamp every write with a context naming the app, so a listener can
/// tell a change it caused itself from a change made by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Name of the app that initiated the action, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,

    /// Parent context id, set when an action was caused by another one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            app: None,
            parent_id: None,
        }
    }

    /// Create a context attributed to an app
    pub fn from_app(app: impl Into<String>) -> Self {
        Self {
            app: Some(app.into()),
            ..Self::new()
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            app: self.app.clone(),
            parent_id: Some(self.id.clone()),
        }
    }

    /// Whether this context was created by the named app
    pub fn is_from_app(&self, app: &str) -> bool {
        self.app.as_deref() == Some(app)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
