use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::{
    error::ValidationError,
    models::{validate, InstanceConfig, InstanceId, Notification},
    services::{
        cancellation::{cancel_pair, CancelHandle, CancelSummary},
        scheduler::{PollContext, PollTask},
    },
};

/// One registered widget and the task polling for it
struct Instance {
    config: Arc<InstanceConfig>,
    stop: CancelHandle,
    task: JoinHandle<()>,
}

/// Tracks every independently configured poll task of the process
pub struct InstanceRegistry {
    ctx: PollContext,
    instances: RwLock<HashMap<InstanceId, Instance>>,
}

impl InstanceRegistry {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Validates `raw` and starts polling for `instance_id`
    ///
    /// An invalid configuration is reported downstream and nothing is
    /// scheduled. Registering an id that is already polling replaces it.
    pub async fn register(
        &self,
        instance_id: InstanceId,
        raw: &Value,
    ) -> Result<Arc<InstanceConfig>, ValidationError> {
        let config = match validate(raw) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                tracing::error!(
                    instance_id = %instance_id,
                    path = %e.path,
                    error = %e.message,
                    "Invalid configuration"
                );
                let _ = self
                    .ctx
                    .notifier
                    .send(Notification::configuration_error(instance_id, &e));
                return Err(e);
            }
        };

        // Registry entries are keyed by instance id: every stop happens under
        // this lock and a replaced task is joined before its successor spawns
        let mut instances = self.instances.write().await;
        if let Some(previous) = instances.remove(&instance_id) {
            tracing::info!(instance_id = %instance_id, "Replacing existing instance");
            let task = self.stop_instance(&instance_id, previous);
            join(&instance_id, task).await;
        }

        let (stop, token) = cancel_pair();
        let task = PollTask::new(
            instance_id.clone(),
            Arc::clone(&config),
            self.ctx.clone(),
            token,
        );
        let task = tokio::spawn(task.run());

        instances.insert(
            instance_id.clone(),
            Instance {
                config: Arc::clone(&config),
                stop,
                task,
            },
        );
        drop(instances);

        tracing::info!(instance_id = %instance_id, "Instance registered");

        Ok(config)
    }

    /// Stops one instance; returns false if it was not registered
    pub async fn teardown(&self, instance_id: &InstanceId) -> bool {
        let task = {
            let mut instances = self.instances.write().await;
            match instances.remove(instance_id) {
                Some(instance) => self.stop_instance(instance_id, instance),
                None => return false,
            }
        };

        join(instance_id, task).await;
        true
    }

    /// Stops every instance and clears the timer and request registries
    pub async fn shutdown(&self) -> CancelSummary {
        let (tasks, summary) = {
            let mut instances = self.instances.write().await;
            let tasks: Vec<(InstanceId, JoinHandle<()>)> = instances
                .drain()
                .map(|(instance_id, instance)| {
                    instance.stop.cancel();
                    (instance_id, instance.task)
                })
                .collect();

            (tasks, self.ctx.registry.cancel_all())
        };

        for (instance_id, task) in tasks {
            join(&instance_id, task).await;
        }

        tracing::info!(
            timers = summary.timers,
            requests = summary.requests,
            "All instances stopped"
        );

        summary
    }

    pub async fn config(&self, instance_id: &InstanceId) -> Option<Arc<InstanceConfig>> {
        self.instances
            .read()
            .await
            .get(instance_id)
            .map(|instance| Arc::clone(&instance.config))
    }

    pub async fn ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.instances.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn stop_instance(&self, instance_id: &InstanceId, instance: Instance) -> JoinHandle<()> {
        instance.stop.cancel();
        let summary = self.ctx.registry.cancel_instance(instance_id);
        tracing::debug!(
            instance_id = %instance_id,
            timers = summary.timers,
            requests = summary.requests,
            "Instance stopped"
        );
        instance.task
    }
}

async fn join(instance_id: &InstanceId, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        tracing::warn!(instance_id = %instance_id, error = %e, "Poll task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApiProviderGroup, ApiReleaseDay, ApiReleaseItem, ApiReleasePage, NotificationPayload,
        ObjectType, ProviderMap,
    };
    use crate::services::{
        aggregator::Aggregator,
        cancellation::{EntryKind, Registry},
        clock::FixedClock,
        providers::MockReleaseSource,
    };
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn registry() -> (
        InstanceRegistry,
        Arc<Registry>,
        mpsc::UnboundedReceiver<Notification>,
    ) {
        let mut source = MockReleaseSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_fetch_providers()
            .returning(|_, _| Ok(ProviderMap::new()));
        source.expect_fetch_new_releases().returning(|_, _, _, _| {
            Ok(ApiReleasePage {
                days: vec![ApiReleaseDay {
                    providers: vec![ApiProviderGroup {
                        provider_id: "9".to_string(),
                        items: vec![ApiReleaseItem {
                            id: "1".to_string(),
                            title: Some("A".to_string()),
                            original_title: None,
                            original_release_year: None,
                            object_type: ObjectType::ShowSeason,
                            poster: None,
                        }],
                    }],
                }],
            })
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let cancellations = Arc::new(Registry::new());
        let ctx = PollContext {
            source: Arc::new(source),
            aggregator: Arc::new(Aggregator::new("https://images.justwatch.com")),
            registry: Arc::clone(&cancellations),
            clock: Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
            notifier: tx,
        };

        (InstanceRegistry::new(ctx), cancellations, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_starts_polling() {
        let (instances, _, mut rx) = registry();

        let config = instances
            .register(InstanceId::from("w1"), &json!({ "locale": "en_US", "search": {} }))
            .await
            .unwrap();
        assert_eq!(config.max_entries, 10);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.instance_id, InstanceId::from("w1"));
        match notification.payload {
            NotificationPayload::Data(items) => {
                assert_eq!(items[0].provider_name, "unknown");
            }
            other => panic!("expected data, got {other:?}"),
        }

        assert_eq!(instances.ids().await, vec![InstanceId::from("w1")]);
        instances.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_schedules_nothing() {
        let (instances, cancellations, mut rx) = registry();

        let err = instances
            .register(InstanceId::from("w1"), &json!({ "locale": "en_US" }))
            .await
            .unwrap_err();
        assert_eq!(err.path, "search");

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.kind(), "configuration_error");
        assert!(instances.ids().await.is_empty());
        assert_eq!(cancellations.pending(EntryKind::Timer), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_replaces_config() {
        let (instances, _, mut rx) = registry();
        let id = InstanceId::from("w1");

        instances
            .register(id.clone(), &json!({ "locale": "en_US", "search": {} }))
            .await
            .unwrap();
        rx.recv().await.unwrap();

        instances
            .register(id.clone(), &json!({ "locale": "de_DE", "search": {} }))
            .await
            .unwrap();

        assert_eq!(instances.ids().await.len(), 1);
        assert_eq!(instances.config(&id).await.unwrap().locale, "de_DE");
        instances.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_only_stops_one_instance() {
        let (instances, cancellations, mut rx) = registry();
        let raw = json!({ "locale": "en_US", "search": {} });

        instances.register(InstanceId::from("a"), &raw).await.unwrap();
        instances.register(InstanceId::from("b"), &raw).await.unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        assert!(instances.teardown(&InstanceId::from("a")).await);
        assert!(!instances.teardown(&InstanceId::from("a")).await);
        assert_eq!(instances.ids().await, vec![InstanceId::from("b")]);

        // b keeps polling
        let next = rx.recv().await.unwrap();
        assert_eq!(next.instance_id, InstanceId::from("b"));

        instances.shutdown().await;
        assert_eq!(cancellations.pending(EntryKind::Timer), 0);
        assert_eq!(cancellations.pending(EntryKind::Request), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_timers() {
        let (instances, cancellations, mut rx) = registry();
        let raw = json!({ "locale": "en_US", "search": {} });

        for id in ["a", "b", "c"] {
            instances.register(InstanceId::from(id), &raw).await.unwrap();
        }
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        while cancellations.pending(EntryKind::Timer) < 3 {
            tokio::task::yield_now().await;
        }

        let summary = instances.shutdown().await;

        assert_eq!(summary.timers, 3);
        assert!(instances.ids().await.is_empty());
        assert_eq!(cancellations.pending(EntryKind::Timer), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_registers_keep_one_task_polling() {
        let (instances, cancellations, mut rx) = registry();
        let instances = Arc::new(instances);
        let raw = json!({ "locale": "en_US", "updateInterval": 1000, "search": {} });

        // Both calls validate, then queue up behind the map lock
        let guard = instances.instances.write().await;
        let pending: Vec<_> = (0..2)
            .map(|_| {
                let instances = Arc::clone(&instances);
                let raw = raw.clone();
                tokio::spawn(async move { instances.register(InstanceId::from("w1"), &raw).await })
            })
            .collect();
        tokio::task::yield_now().await;
        drop(guard);

        for handle in pending {
            handle.await.unwrap().unwrap();
        }
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(10_500)).await;

        let mut delivered = 0;
        while let Ok(notification) = rx.try_recv() {
            assert_eq!(notification.kind(), "data");
            delivered += 1;
        }
        assert!(delivered >= 9, "only {delivered} cycles after replacement");
        assert_eq!(instances.ids().await, vec![InstanceId::from("w1")]);
        assert_eq!(cancellations.pending(EntryKind::Timer), 1);

        instances.shutdown().await;
        assert_eq!(cancellations.pending(EntryKind::Timer), 0);
    }
}
