// UserIdentity: the shape of the user data injected into Context Memory.
//
// Authentication and the identity source system are out of scope here —
// they're an external collaborator — so this is modeled as an explicit,
// minimal struct (id, email, messaging handles) rather than a free-form map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    /// Messaging handles keyed by channel name (e.g. "sms", "slack").
    #[serde(default)]
    pub messaging_handles: HashMap<String, String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            messaging_handles: HashMap::new(),
        }
    }
}
