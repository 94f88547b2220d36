//! Stored credential records (§4.6, §4.5 credential resolution).
//!
//! `data` holds the encrypted blob produced by `wfengine_core::credentials::
//! CredentialService` — the model crate never sees plaintext.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub name: String,
    /// Provider tag, e.g. `"anthropic"` (§4.5 credential resolution order).
    pub kind: String,
    /// `base64(nonce || ciphertext)`, opaque to every layer above Store.
    pub encrypted_data: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Credential {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, encrypted_data: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind: kind.into(),
            encrypted_data: encrypted_data.into(),
            created_at: chrono::Utc::now(),
        }
    }
}
