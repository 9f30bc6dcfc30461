//! OCPP-J message framing
//!
//! OCPP 1.6 JSON over WebSocket wraps every message in an array:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]
//!
//! The engine treats payloads as opaque bytes. Here a CallError payload is the
//! JSON object `{errorCode, errorDescription, errorDetails}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::message::{InboundMessage, Message};
use crate::types::{MessageRole, MessageType};

/// OCPP-J 1.6 error codes, spelled as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

/// Errors in OCPP-J framing
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Unknown action {action} in call {message_id}")]
    UnknownAction { message_id: String, action: String },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),

    #[error("Role {0} has no wire form")]
    NotOnWire(MessageRole),
}

/// Payload carried by a CallError
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallErrorPayload {
    pub error_code: ErrorCode,
    pub error_description: String,
    #[serde(default = "empty_object")]
    pub error_details: Value,
}

impl CallErrorPayload {
    pub fn new(error_code: ErrorCode, error_description: impl Into<String>) -> Self {
        Self {
            error_code,
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Payload bytes as JSON; anything unparsable goes out as `{}`
fn payload_value(message: &Message) -> Value {
    if message.payload.is_empty() {
        return empty_object();
    }
    serde_json::from_slice(&message.payload).unwrap_or_else(|e| {
        warn!("Payload of {} is not JSON ({}), sending {{}}", message.id, e);
        empty_object()
    })
}

/// Serialize to the OCPP-J wire format
pub fn encode(message: &Message) -> Result<String, FrameError> {
    let id = message.id.as_str();

    let array = match message.role {
        MessageRole::Call => serde_json::json!([
            MessageRole::Call as i32,
            id,
            message.message_type.as_str(),
            payload_value(message)
        ]),
        MessageRole::CallResult => serde_json::json!([
            MessageRole::CallResult as i32,
            id,
            payload_value(message)
        ]),
        MessageRole::CallError => {
            let error = CallErrorPayload::from_bytes(&message.payload)
                .unwrap_or_else(|_| CallErrorPayload::new(ErrorCode::GenericError, ""));
            serde_json::json!([
                MessageRole::CallError as i32,
                id,
                error.error_code,
                error.error_description,
                error.error_details
            ])
        }
        role => return Err(FrameError::NotOnWire(role)),
    };

    Ok(serde_json::to_string(&array)?)
}

/// Parse an OCPP-J frame into an inbound envelope
pub fn decode(bytes: &[u8]) -> Result<InboundMessage, FrameError> {
    let array: Vec<Value> = serde_json::from_slice(bytes)?;

    let code = array
        .first()
        .and_then(Value::as_i64)
        .ok_or(FrameError::InvalidFormat)?;
    let role = MessageRole::from_code(code).ok_or(FrameError::UnknownMessageType(code))?;

    let expected_len = match role {
        MessageRole::Call => 4,
        MessageRole::CallResult => 3,
        _ => 5,
    };
    if array.len() != expected_len {
        return Err(FrameError::InvalidFormat);
    }

    let id = array[1]
        .as_str()
        .ok_or(FrameError::InvalidFormat)?
        .to_string();

    match role {
        MessageRole::Call => {
            // CALL: [2, messageId, action, payload]
            let action = array[2].as_str().ok_or(FrameError::InvalidFormat)?;
            let message_type: MessageType =
                action.parse().map_err(|_| FrameError::UnknownAction {
                    message_id: id.clone(),
                    action: action.to_string(),
                })?;

            Ok(InboundMessage {
                id,
                role,
                message_type: Some(message_type),
                payload: serde_json::to_vec(&array[3])?,
            })
        }
        MessageRole::CallResult => Ok(InboundMessage {
            id,
            role,
            message_type: None,
            payload: serde_json::to_vec(&array[2])?,
        }),
        _ => {
            // CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]
            let error_code = array[2]
                .as_str()
                .and_then(|s| serde_json::from_value(Value::String(s.to_string())).ok())
                .unwrap_or(ErrorCode::GenericError);
            let error = CallErrorPayload {
                error_code,
                error_description: array[3].as_str().unwrap_or_default().to_string(),
                error_details: array[4].clone(),
            };

            Ok(InboundMessage {
                id,
                role,
                message_type: None,
                payload: error.to_bytes()?,
            })
        }
    }
}
