//! Encryption Envelope Module
//!
//! Self-describing encrypted payload with base64-encoded binary fields.

use serde::{Deserialize, Serialize};

/// Algorithm label written into every envelope.
pub const ALGORITHM: &str = "AES-256-GCM";

// == Encryption Envelope ==
/// Output of one encryption: ciphertext (tag appended), nonce, salt,
/// algorithm label and creation timestamp (Unix milliseconds).
///
/// `salt` is optional only so that legacy payloads without one can be read
/// and rejected explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64", alias = "iv")]
    pub nonce: Vec<u8>,
    #[serde(default, with = "b64_opt", skip_serializing_if = "Option::is_none")]
    pub salt: Option<Vec<u8>>,
    pub algorithm: String,
    pub timestamp: u64,
}

impl EncryptionEnvelope {
    pub fn has_salt(&self) -> bool {
        self.salt.as_ref().is_some_and(|salt| !salt.is_empty())
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn envelope() -> EncryptionEnvelope {
        EncryptionEnvelope {
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 12],
            salt: Some(vec![9; 32]),
            algorithm: ALGORITHM.to_string(),
            timestamp: 42,
        }
    }

    #[test]
    fn test_envelope_fields_are_base64() {
        let wire: Value = serde_json::to_value(envelope()).unwrap();

        assert_eq!(wire["ciphertext"], "AQID");
        assert_eq!(wire["nonce"], "AAAAAAAAAAAAAAAA");
        assert_eq!(wire["algorithm"], "AES-256-GCM");
        assert_eq!(wire["timestamp"], 42);
    }

    #[test]
    fn test_envelope_without_salt() {
        let parsed: EncryptionEnvelope = serde_json::from_value(json!({
            "ciphertext": "AQID",
            "iv": "AAAAAAAAAAAAAAAA",
            "algorithm": "AES-256-GCM",
            "timestamp": 1
        }))
        .unwrap();

        assert!(!parsed.has_salt());
        assert_eq!(parsed.nonce, vec![0; 12]);
        assert!(serde_json::to_value(&parsed).unwrap().get("salt").is_none());
    }

    #[test]
    fn test_envelope_rejects_bad_base64() {
        let parsed = serde_json::from_value::<EncryptionEnvelope>(json!({
            "ciphertext": "***",
            "nonce": "AAAAAAAAAAAAAAAA",
            "algorithm": "AES-256-GCM",
            "timestamp": 1
        }));
        assert!(parsed.is_err());
    }
}
