use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CUSTOMER_OBJECT_TYPE: &str = "customer";
pub const ISSUING_CARD_OBJECT_TYPE: &str = "issuing.card";

/// key: ephemeral-key-model
/// Parsed credential. Immutable; a refresh replaces it wholesale.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKey {
    pub id: String,
    pub created: Option<i64>,
    /// Expiry in seconds since the Unix epoch.
    pub expires: i64,
    pub livemode: bool,
    pub secret: String,
    pub associated_objects: Vec<AssociatedObject>,
    pub(crate) raw: String,
}

/// Resource the key is scoped to, e.g. a customer or an issuing card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
}

impl EphemeralKey {
    /// Original provider payload, forwarded untouched to downstream API clients.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn expires_millis(&self) -> i64 {
        self.expires.saturating_mul(1000)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires, 0).single()
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_millis() <= now_millis
    }

    pub fn associated_object(&self, object_type: &str) -> Option<&AssociatedObject> {
        self.associated_objects
            .iter()
            .find(|object| object.object_type == object_type)
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.associated_object(CUSTOMER_OBJECT_TYPE)
            .map(|object| object.id.as_str())
    }

    pub fn issuing_card_id(&self) -> Option<&str> {
        self.associated_object(ISSUING_CARD_OBJECT_TYPE)
            .map(|object| object.id.as_str())
    }

    /// Short digest of the secret, safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.secret.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("id", &self.id)
            .field("created", &self.created)
            .field("expires", &self.expires)
            .field("livemode", &self.livemode)
            .field("secret", &"<redacted>")
            .field("fingerprint", &self.fingerprint())
            .field("associated_objects", &self.associated_objects)
            .finish()
    }
}
