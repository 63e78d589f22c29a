use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

pub const MESSAGE_ID_KEY: &str = "google.message_id";
pub const FALLBACK_MESSAGE_ID_KEY: &str = "message_id";

const RESERVED_KEYS: [&str; 4] = ["title", "body", "type", "delivery_id"];

// Persisted registration, all three fields or nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    #[serde(rename = "entrig_registration_id")]
    pub registration_id: String,
    #[serde(rename = "entrig_user_id")]
    pub user_id: String,
    #[serde(rename = "entrig_fcm_token")]
    pub push_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationAck {
    Registered(RegistrationRecord),
    AlreadyRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Read,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
        }
    }
}

/// A decoded push notification as handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub delivery_id: Option<String>,
    pub data: Map<String, Value>,
}

impl NotificationEvent {
    /// Decodes the flat data map delivered by the push transport. The nested
    /// `payload` JSON string carries `type`, `delivery_id` and custom keys.
    pub fn from_push_data(data: &HashMap<String, String>) -> Self {
        let mut payload = match data.get("payload") {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    warn!(payload = %other, "Push payload is not a JSON object, ignoring");
                    Map::new()
                }
                Err(e) => {
                    warn!(error = %e, "Failed to decode push payload");
                    Map::new()
                }
            },
            None => Map::new(),
        };

        let notification_type = take_string(&mut payload, "type");
        let delivery_id = take_string(&mut payload, "delivery_id");
        for key in RESERVED_KEYS {
            payload.remove(key);
        }

        Self {
            title: data.get("title").cloned().unwrap_or_default(),
            body: data.get("body").cloned(),
            notification_type,
            delivery_id,
            data: payload,
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// A message handed over by the push transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub data: HashMap<String, String>,
}

/// What a presented notification carries back into the SDK when tapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapIntent {
    pub message_id: String,
    pub extras: HashMap<String, String>,
}

impl TapIntent {
    pub fn into_open_intent(self) -> OpenIntent {
        let mut extras = self.extras;
        extras.insert(MESSAGE_ID_KEY.to_string(), self.message_id);
        OpenIntent {
            extras,
            launched_from_history: false,
        }
    }
}

/// A launch or resume intent as seen by the host application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenIntent {
    pub extras: HashMap<String, String>,
    #[serde(default)]
    pub launched_from_history: bool,
}

impl OpenIntent {
    pub fn message_id(&self) -> Option<&str> {
        self.extras
            .get(MESSAGE_ID_KEY)
            .or_else(|| self.extras.get(FALLBACK_MESSAGE_ID_KEY))
            .map(String::as_str)
    }
}

// Wire models

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmParamsRequest<'a> {
    pub app_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FcmParamsResponse {
    pub data: FcmParams,
}

/// Bootstrap parameters for the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmParams {
    pub sender_id: Option<String>,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub api_key: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub user_id: &'a str,
    pub fcm_token: &'a str,
    pub sdk: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct UnregisterRequest<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DeliveryStatusRequest<'a> {
    pub delivery_id: &'a str,
    pub status: DeliveryStatus,
}
