use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::engine::vault;
use crate::{Error, Result};

/// The unit of persistence: a version number and the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub version: u64,
    pub data: Map<String, Value>,
}

impl Envelope {
    /// A fresh envelope: version 1, no data.
    pub fn new() -> Self {
        Self { version: 1, data: Map::new() }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns envelopes into file bytes and back.
///
/// Without a key the bytes are pretty-printed JSON. With a key the JSON is
/// sealed by [`vault::encrypt`] and the bytes are the resulting hex string.
#[derive(Clone)]
pub struct Codec {
    passphrase: Option<String>,
}

impl Codec {
    pub fn new(passphrase: Option<String>) -> Self {
        Self { passphrase }
    }

    pub fn plain() -> Self {
        Self { passphrase: None }
    }

    pub fn is_encrypted(&self) -> bool {
        self.passphrase.is_some()
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let text = serde_json::to_vec_pretty(envelope)?;
        match &self.passphrase {
            None => Ok(text),
            Some(passphrase) => Ok(vault::encrypt(&text, passphrase)?.into_bytes()),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        let plaintext = match &self.passphrase {
            None => bytes.to_vec(),
            Some(passphrase) => {
                let cipher_hex = std::str::from_utf8(bytes).map_err(|_| Error::DecryptionFailure)?;
                vault::decrypt(cipher_hex, passphrase)?
            }
        };

        let envelope: Envelope = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::CorruptPayload(e.to_string()))?;
        if envelope.version == 0 {
            return Err(Error::CorruptPayload("envelope version must be at least 1".to_string()));
        }
        Ok(envelope)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
