//! Wire messages between a room and its replicas.
//!
//! Messages are structurally typed JSON objects with no envelope tag;
//! the field set alone tells them apart:
//!
//! ```text
//! {"grid": {...}}                                   snapshot
//! {"changes": [...], "hashBefore": .., "hashAfter": ..}  batch
//! {"ack": ".."}                                     duplicate acknowledgement
//! {"resync": true}                                  resync request
//! ```

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use tessera_core::Fingerprint;
use tessera_grid::{Batch, GridSnapshot};

/// Messages a room sends to replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Full state, sent on join and as a resync response
    Snapshot {
        /// The authoritative grid
        grid: GridSnapshot,
    },
    /// An applied batch, broadcast to every replica
    Batch(Batch),
    /// The batch was already reflected; the room is at this fingerprint
    Ack {
        /// Current room fingerprint
        ack: Fingerprint,
    },
}

impl ServerMessage {
    /// Build a snapshot message
    #[must_use]
    pub fn snapshot(grid: GridSnapshot) -> Self {
        Self::Snapshot { grid }
    }

    /// Short name for log lines
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Batch(_) => "batch",
            Self::Ack { .. } => "ack",
        }
    }

    /// Encode as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and structurally validate a JSON message
    ///
    /// # Errors
    ///
    /// `Malformed` if the text does not parse or the batch is invalid
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_str(text)?;
        if let Self::Batch(batch) = &message {
            validate_batch(batch)?;
        }
        Ok(message)
    }
}

/// Messages a replica sends to its room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// A locally applied batch
    Batch(Batch),
    /// Ask the room for a fresh snapshot
    ResyncRequest {
        /// Always true
        resync: bool,
    },
}

impl ClientMessage {
    /// Build a resync request
    #[must_use]
    pub const fn resync_request() -> Self {
        Self::ResyncRequest { resync: true }
    }

    /// Short name for log lines
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::ResyncRequest { .. } => "resync",
        }
    }

    /// Encode as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and structurally validate a JSON message
    ///
    /// # Errors
    ///
    /// `Malformed` if the text does not parse, the batch is invalid, or a
    /// resync request is not `true`
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Structural validation applied to every inbound client message
    ///
    /// # Errors
    ///
    /// `Malformed` describing the first problem
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Batch(batch) => validate_batch(batch),
            Self::ResyncRequest { resync: true } => Ok(()),
            Self::ResyncRequest { resync: false } => {
                Err(ProtocolError::Malformed("resync must be true".to_string()))
            }
        }
    }
}

fn validate_batch(batch: &Batch) -> Result<(), ProtocolError> {
    if batch.is_empty() {
        return Err(ProtocolError::Malformed("batch has no changes".to_string()));
    }
    for change in &batch.changes {
        change
            .id()
            .validate()
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_grid::{Change, GridEngine};

    fn batch() -> Batch {
        let mut engine = GridEngine::new(16, 12);
        tessera_grid::recorder::record(&mut engine, vec![Change::add("a", 2, 2, 2, 4)]).unwrap()
    }

    #[test]
    fn test_server_messages_are_told_apart_by_shape() {
        let snapshot = ServerMessage::snapshot(GridEngine::new(4, 4).serialize());
        let batch = ServerMessage::Batch(batch());
        let ack = ServerMessage::Ack {
            ack: Fingerprint::compute(b"h"),
        };

        for message in [snapshot, batch, ack] {
            let text = message.encode().unwrap();
            assert_eq!(ServerMessage::decode(&text).unwrap(), message);
        }
    }

    #[test]
    fn test_batch_wire_shape() {
        let text = ClientMessage::Batch(batch()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["changes"][0]["type"], "add");
        assert!(value["hashBefore"].is_string());
        assert!(value["hashAfter"].is_string());
        assert!(value.get("type").is_none());
    }

    #[test]
    fn test_resync_request() {
        let text = ClientMessage::resync_request().encode().unwrap();
        assert_eq!(text, r#"{"resync":true}"#);
        assert_eq!(ClientMessage::decode(&text).unwrap().kind(), "resync");
        assert!(ClientMessage::decode(r#"{"resync":false}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases = [
            "not json",
            "{}",
            r#"{"changes": [], "hashBefore": "00", "hashAfter": "00"}"#,
            r#"{"changes": [{"type": "teleport", "id": "a"}]}"#,
        ];
        for text in cases {
            assert!(
                matches!(ClientMessage::decode(text), Err(ProtocolError::Malformed(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_empty_batch_and_bad_ids() {
        let mut empty = batch();
        empty.changes.clear();
        let text = serde_json::to_string(&empty).unwrap();
        assert!(matches!(ClientMessage::decode(&text), Err(ProtocolError::Malformed(_))));
        assert!(matches!(ServerMessage::decode(&text), Err(ProtocolError::Malformed(_))));

        let mut spaced = batch();
        spaced.changes = vec![Change::remove("a b")];
        let text = serde_json::to_string(&spaced).unwrap();
        assert!(matches!(ClientMessage::decode(&text), Err(ProtocolError::Malformed(_))));
    }
}
