//! Message attributes as seen by the routing layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// String-keyed attribute map for one outbound message.
///
/// Filters look attributes up by name; a missing attribute reads as the
/// empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    attributes: HashMap<String, String>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup; absent keys read as empty.
    pub fn get(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl From<HashMap<String, String>> for MessageContext {
    fn from(attributes: HashMap<String, String>) -> Self {
        Self { attributes }
    }
}
