use std::collections::HashMap;
use std::sync::Arc;

use tokio::{sync::RwLock, task::JoinHandle};

use crate::models::{InstanceId, Notification, NotificationPayload, NotificationReceiver};
use crate::services::InstanceRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub instances: Arc<InstanceRegistry>,
    /// Last notification delivered per instance
    pub latest: Arc<RwLock<HashMap<InstanceId, Notification>>>,
}

impl AppState {
    pub fn new(instances: Arc<InstanceRegistry>) -> Self {
        Self {
            instances,
            latest: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Consumes the notification channel, replacing each instance's last
    /// delivered notification as new ones arrive.
    ///
    /// Poll results of an instance that is no longer registered are dropped,
    /// so a teardown is not undone by a notification still in the channel.
    pub fn spawn_notification_pump(&self, mut receiver: NotificationReceiver) -> JoinHandle<()> {
        let latest = Arc::clone(&self.latest);
        let instances = Arc::clone(&self.instances);

        tokio::spawn(async move {
            tracing::info!("Notification pump started");

            while let Some(notification) = receiver.recv().await {
                // Checked under the write lock; delete removes the entry after teardown
                let mut recorded = latest.write().await;

                let rejected = matches!(
                    notification.payload,
                    NotificationPayload::ConfigurationError { .. }
                );
                if !rejected && instances.config(&notification.instance_id).await.is_none() {
                    tracing::debug!(
                        instance_id = %notification.instance_id,
                        kind = notification.kind(),
                        "Dropping notification of a stopped instance"
                    );
                    continue;
                }

                tracing::debug!(
                    instance_id = %notification.instance_id,
                    kind = notification.kind(),
                    "Notification delivered"
                );
                recorded.insert(notification.instance_id.clone(), notification);
            }

            tracing::info!("Notification pump stopped");
        })
    }
}
