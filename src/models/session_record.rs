use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable note that a subject completed its first provider handshake.
///
/// `session_key` and `secret_key` are secrets; `Debug` redacts them.
#[derive(Clone)]
pub struct SessionRecord {
    /// The unique identifier of the record.
    pub id: Uuid,
    /// The provider-issued subject id. Unique across records.
    pub openid: String,
    /// The provider session secret returned by the handshake.
    pub session_key: String,
    /// The token key in effect when the record was written, base64url text.
    pub secret_key: String,
    /// The timestamp when the record was created.
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("openid", &self.openid)
            .field("session_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}
