//! Collaboration messages
//!
//! `RemoteEdit` is the wire unit of collaboration: one field-level change.
//! Presence signals travel on the same channel so that every collaborator
//! sees edits and focus changes in one FIFO order.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{FieldId, FieldValue, FormError, FormId, FormResult, PeerId, UserId};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Single field-level change made by a collaborator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEdit {
    pub form_id: FormId,
    pub field_id: FieldId,
    pub value: FieldValue,
    pub origin_user_id: UserId,
    /// Milliseconds since the Unix epoch at the origin
    pub timestamp: i64,
}

impl RemoteEdit {
    pub fn new(
        form_id: FormId,
        field_id: FieldId,
        value: FieldValue,
        origin_user_id: UserId,
    ) -> Self {
        RemoteEdit {
            form_id,
            field_id,
            value,
            origin_user_id,
            timestamp: now_millis(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Everything carried on a collaboration channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WireMessage {
    Edit(RemoteEdit),
    #[serde(rename_all = "camelCase")]
    Focus {
        form_id: FormId,
        field_id: FieldId,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    Blur {
        form_id: FormId,
        field_id: FieldId,
        user_id: UserId,
    },
    /// The user tore down their session for this form
    #[serde(rename_all = "camelCase")]
    Leave { form_id: FormId, user_id: UserId },
}

/// A message as sent on the channel, stamped with the sending synchronizer
///
/// `sender` identifies the synchronizer instance and is what receivers use
/// to skip their own frames. Attribution stays with the user ids inside
/// the message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub sender: PeerId,
    pub message: WireMessage,
}

impl WireEnvelope {
    pub fn new(sender: PeerId, message: WireMessage) -> Self {
        WireEnvelope { sender, message }
    }

    /// Encode envelope for the wire
    pub fn encode(&self) -> FormResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FormError::MalformedMessage(e.to_string()))
    }

    /// Decode envelope from the wire
    pub fn decode(buf: &[u8]) -> FormResult<Self> {
        serde_json::from_slice(buf).map_err(|e| FormError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_wire_shape() {
        let edit = RemoteEdit::new(
            FormId::new("deal"),
            FieldId::new("name"),
            FieldValue::from("Alpha"),
            UserId::new("alice"),
        )
        .with_timestamp(42);
        let envelope = WireEnvelope::new(PeerId::new(7), WireMessage::Edit(edit));

        let bytes = envelope.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["sender"], 7);
        assert_eq!(json["message"]["kind"], "edit");
        assert_eq!(json["message"]["formId"], "deal");
        assert_eq!(json["message"]["fieldId"], "name");
        assert_eq!(json["message"]["originUserId"], "alice");
        assert_eq!(json["message"]["timestamp"], 42);

        assert_eq!(WireEnvelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_presence_wire_shape() {
        let envelope = WireEnvelope::new(
            PeerId::new(1),
            WireMessage::Leave {
                form_id: FormId::new("deal"),
                user_id: UserId::new("bob"),
            },
        );
        let json: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();
        assert_eq!(json["message"]["kind"], "leave");
        assert_eq!(json["message"]["userId"], "bob");
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            WireEnvelope::decode(b"{not json"),
            Err(FormError::MalformedMessage(_))
        ));
        assert!(WireEnvelope::decode(br#"{"sender": 1, "message": {"kind": "teleport"}}"#).is_err());
        assert!(WireEnvelope::decode(br#"{"kind": "leave", "formId": "deal", "userId": "bob"}"#).is_err());
    }
}
