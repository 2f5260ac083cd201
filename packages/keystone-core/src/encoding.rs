//! Serde helpers for byte fields on the wire.
//!
//! All JSON byte fields use standard base64 with padding.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::Result;

/// Encode bytes as standard base64
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// `Vec<u8>` as a base64 string
pub mod base64_bytes {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// `Option<Vec<u8>>` as an optional base64 string
pub mod base64_opt {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Body {
        #[serde(with = "base64_bytes")]
        meta: Vec<u8>,
        #[serde(with = "base64_opt", default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Vec<u8>>,
    }

    #[test]
    fn test_base64_fields() {
        let body = Body {
            meta: b"hi".to_vec(),
            snapshot: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"meta":"aGk="}"#);

        let parsed: Body = serde_json::from_str(r#"{"meta":"aGk=","snapshot":"AQ=="}"#).unwrap();
        assert_eq!(parsed.snapshot, Some(vec![1]));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(from_base64("***").is_err());
        assert_eq!(from_base64(&to_base64(b"x")).unwrap(), b"x");
    }
}
