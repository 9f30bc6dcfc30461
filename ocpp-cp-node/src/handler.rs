//! Answers to requests from the central system
//!
//! Configuration requests are served from the shared store; every other
//! action is rejected with `NotImplemented`.

use ocpp_core::frame::{CallErrorPayload, ErrorCode};
use ocpp_core::{Configuration, ConfigurationError, Message, MessageType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Payload to hand to `Engine::push_response`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub payload: Vec<u8>,
    pub is_error: bool,
}

impl Answer {
    fn result<T: Serialize>(conf: &T) -> Self {
        match serde_json::to_vec(conf) {
            Ok(payload) => Self {
                payload,
                is_error: false,
            },
            Err(e) => Self::error(ErrorCode::InternalError, e.to_string()),
        }
    }

    fn error(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            payload: CallErrorPayload::new(code, description)
                .to_bytes()
                .unwrap_or_default(),
            is_error: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetConfigurationReq {
    #[serde(default)]
    key: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyValue {
    key: String,
    readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetConfigurationConf {
    configuration_key: Vec<KeyValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unknown_key: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeConfigurationReq {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct StatusConf {
    status: &'static str,
}

/// Build the answer to an inbound call
pub fn answer(request: &Message, configuration: &mut Configuration) -> Answer {
    match request.message_type {
        MessageType::GetConfiguration => get_configuration(&request.payload, configuration),
        MessageType::ChangeConfiguration => change_configuration(&request.payload, configuration),
        other => {
            info!("No handler for {} {}", other, request.id);
            Answer::error(
                ErrorCode::NotImplemented,
                format!("{} is not implemented", other),
            )
        }
    }
}

fn get_configuration(payload: &[u8], configuration: &Configuration) -> Answer {
    let req: GetConfigurationReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(e) => return Answer::error(ErrorCode::FormationViolation, e.to_string()),
    };

    let entry = |key: &str| -> Option<KeyValue> {
        if !configuration.is_readable(key) {
            return None;
        }
        Some(KeyValue {
            key: key.to_string(),
            readonly: !configuration.is_writable(key),
            value: configuration.stringify(key).ok(),
        })
    };

    let mut conf = GetConfigurationConf {
        configuration_key: Vec::new(),
        unknown_key: Vec::new(),
    };

    match req.key.filter(|keys| !keys.is_empty()) {
        Some(keys) => {
            for key in keys {
                match entry(&key) {
                    Some(kv) => conf.configuration_key.push(kv),
                    None => conf.unknown_key.push(key),
                }
            }
        }
        None => {
            conf.configuration_key = (0..configuration.len())
                .filter_map(|i| configuration.key_at(i))
                .filter_map(entry)
                .collect();
        }
    }

    debug!(
        "GetConfiguration: {} known, {} unknown",
        conf.configuration_key.len(),
        conf.unknown_key.len()
    );
    Answer::result(&conf)
}

fn change_configuration(payload: &[u8], configuration: &mut Configuration) -> Answer {
    let req: ChangeConfigurationReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(e) => return Answer::error(ErrorCode::FormationViolation, e.to_string()),
    };

    let status = match configuration.set_from_str(&req.key, &req.value) {
        Ok(()) => {
            info!("Configuration {} changed to {}", req.key, req.value);
            "Accepted"
        }
        Err(ConfigurationError::UnknownKey(_)) => "NotSupported",
        Err(e) => {
            info!("ChangeConfiguration rejected: {}", e);
            "Rejected"
        }
    };

    Answer::result(&StatusConf { status })
}
