//! Wire types for the command shim.
//!
//! The shim sends one JSON [`ShimRequest`] per connection, without a trailing
//! delimiter. The broker answers with newline-delimited JSON
//! [`ShimResponse`] messages; output payloads are base64 so arbitrary bytes
//! survive the JSON encoding.
//!
//! ```text
//! → {"command":"gh","args":["pr","list"],"cwd":"/work"}
//! ← {"type":"stdout","data":"IzEyIGZpeCB0ZXN0cwo="}
//! ← {"type":"stderr","data":"d2FybmluZwo="}
//! ← {"type":"exit","code":0}
//! ```

use serde::{Deserialize, Serialize};

/// A single command invocation forwarded to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
}

impl ShimRequest {
    /// Serialize to the JSON document written to the socket.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// One message of the broker's response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShimResponse {
    /// Bytes for local standard output.
    Stdout {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Bytes for local standard error.
    Stderr {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// The remote command finished. Terminal.
    Exit { code: i32 },
    /// The broker refused or failed to run the command. Terminal.
    Error { message: String },
}

impl ShimResponse {
    /// Decode one line of the response stream.
    ///
    /// Surrounding whitespace (including the newline and any `\r`) is
    /// ignored; a blank line yields `None`. Unknown `type` tags, invalid JSON
    /// and invalid base64 are all errors.
    pub fn decode_line(line: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(trimmed).map(Some)
    }

    /// Encode as one newline-terminated line of the response stream.
    pub fn encode_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64 payload: {e}")))
    }
}
