use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{DisplayItem, InstanceId};
use crate::error::ValidationError;

/// Sending half of the channel towards the display layer
pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Message delivered to the display layer for one instance
///
/// Serialized as `{"kind": ..., "instanceId": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub instance_id: InstanceId,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// Registration rejected; no polling was started
    ConfigurationError { path: String, message: String },
    /// A poll cycle failed; polling continues
    LoadError(String),
    /// Fresh list replacing whatever was shown before
    Data(Vec<DisplayItem>),
}

impl Notification {
    pub fn configuration_error(instance_id: InstanceId, err: &ValidationError) -> Self {
        Self {
            instance_id,
            payload: NotificationPayload::ConfigurationError {
                path: err.path.clone(),
                message: err.message.clone(),
            },
        }
    }

    pub fn load_error(instance_id: InstanceId, message: impl Into<String>) -> Self {
        Self {
            instance_id,
            payload: NotificationPayload::LoadError(message.into()),
        }
    }

    pub fn data(instance_id: InstanceId, items: Vec<DisplayItem>) -> Self {
        Self {
            instance_id,
            payload: NotificationPayload::Data(items),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            NotificationPayload::ConfigurationError { .. } => "configuration_error",
            NotificationPayload::LoadError(_) => "load_error",
            NotificationPayload::Data(_) => "data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let notification = Notification::load_error(
            InstanceId::from("w1"),
            "Loading provider list failed (timeout)",
        );

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(
            value,
            json!({
                "instanceId": "w1",
                "kind": "load_error",
                "payload": "Loading provider list failed (timeout)"
            })
        );
        assert_eq!(notification.kind(), "load_error");
    }

    #[test]
    fn test_configuration_error_envelope() {
        let err = ValidationError::new("locale", "is required");
        let notification = Notification::configuration_error(InstanceId::from("w2"), &err);

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["kind"], "configuration_error");
        assert_eq!(value["payload"]["path"], "locale");
        assert_eq!(value["payload"]["message"], "is required");
    }

    #[test]
    fn test_data_envelope_round_trips() {
        let notification = Notification::data(InstanceId::from("w3"), Vec::new());
        let json = serde_json::to_string(&notification).unwrap();
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, notification);
        assert_eq!(back.kind(), "data");
    }
}
