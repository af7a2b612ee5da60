/// Per-instance poll task.
///
/// One task per registered instance runs `fetch -> aggregate -> deliver ->
/// sleep` in a loop. The next sleep only starts after the current cycle has
/// finished, so an instance never has two cycles in flight. A failed cycle is
/// reported downstream and polling carries on.
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::{PollError, UpstreamError},
    models::{DisplayItem, InstanceConfig, InstanceId, Notification, NotificationSender},
    services::{
        aggregator::Aggregator,
        cancellation::{CancelToken, EntryKind, Registry},
        clock::Clock,
        providers::ReleaseSource,
    },
};

/// Collaborators shared by every poll task of the process
#[derive(Clone)]
pub struct PollContext {
    pub source: Arc<dyn ReleaseSource>,
    pub aggregator: Arc<Aggregator>,
    pub registry: Arc<Registry>,
    pub clock: Arc<dyn Clock>,
    pub notifier: NotificationSender,
}

pub struct PollTask {
    instance_id: InstanceId,
    config: Arc<InstanceConfig>,
    ctx: PollContext,
    stop: CancelToken,
}

impl PollTask {
    pub fn new(
        instance_id: InstanceId,
        config: Arc<InstanceConfig>,
        ctx: PollContext,
        stop: CancelToken,
    ) -> Self {
        Self {
            instance_id,
            config,
            ctx,
            stop,
        }
    }

    /// Polls until `stop` fires, a tracked timer or request of this instance
    /// is cancelled, or the display side hangs up.
    pub async fn run(self) {
        let interval = self.config.update_interval();

        tracing::info!(
            instance_id = %self.instance_id,
            locale = %self.config.locale,
            interval_ms = self.config.update_interval,
            source = self.ctx.source.name(),
            "Polling started"
        );

        loop {
            let cycle_id = Uuid::new_v4();
            let span = tracing::debug_span!(
                "poll_cycle",
                instance_id = %self.instance_id,
                cycle_id = %cycle_id,
            );
            let outcome = self.run_cycle().instrument(span).await;

            // A torn-down instance must not deliver the result of a superseded cycle
            if self.stop.is_cancelled() {
                break;
            }

            let notification = match outcome {
                Ok(items) => {
                    tracing::debug!(
                        instance_id = %self.instance_id,
                        cycle_id = %cycle_id,
                        items = items.len(),
                        "Update successful"
                    );
                    Notification::data(self.instance_id.clone(), items)
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        cycle_id = %cycle_id,
                        error = %e,
                        "Update failed"
                    );
                    Notification::load_error(self.instance_id.clone(), e.to_string())
                }
            };

            if self.ctx.notifier.send(notification).is_err() {
                tracing::warn!(instance_id = %self.instance_id, "Notification channel closed");
                break;
            }

            tracing::debug!(
                instance_id = %self.instance_id,
                seconds = self.config.update_interval.div_ceil(1000),
                "Next update scheduled"
            );

            let timer = self.ctx.registry.track(EntryKind::Timer, &self.instance_id);
            let woke = tokio::select! {
                _ = self.stop.cancelled() => false,
                _ = timer.token().cancelled() => false,
                _ = self.ctx.clock.sleep(interval) => true,
            };
            if !woke {
                break;
            }
        }

        tracing::info!(instance_id = %self.instance_id, "Polling stopped");
    }

    /// One fetch-aggregate pass; providers first since releases are joined
    /// against them.
    pub async fn run_cycle(&self) -> Result<Vec<DisplayItem>, PollError> {
        let config = &self.config;

        let providers = {
            let request = self.ctx.registry.track(EntryKind::Request, &self.instance_id);
            self.guarded(self.ctx.source.fetch_providers(&config.locale, request.token()))
                .await
                .map_err(PollError::Providers)?
        };

        let releases = {
            let request = self.ctx.registry.track(EntryKind::Request, &self.instance_id);
            let reference_date = self.ctx.clock.today();
            self.guarded(self.ctx.source.fetch_new_releases(
                &config.locale,
                &config.search,
                reference_date,
                request.token(),
            ))
            .await
            .map_err(PollError::Releases)?
        };

        Ok(self.ctx.aggregator.aggregate(&providers, &releases, config)?)
    }

    /// Also aborts the call when the instance itself is stopped, which covers
    /// a request tracked after its instance was already torn down.
    async fn guarded<T, F>(&self, call: F) -> Result<T, UpstreamError>
    where
        F: std::future::Future<Output = Result<T, UpstreamError>>,
    {
        self.stop
            .run_until_cancelled(call)
            .await
            .unwrap_or(Err(UpstreamError::Cancelled))
    }
}
