/// Upstream catalog abstraction
///
/// The poll pipeline needs two read-only calls: the provider catalog for a
/// locale and the "new releases" listing. Both take a cancellation token so a
/// teardown can abort them while they are in flight.
use chrono::NaiveDate;

use crate::{
    error::UpstreamError,
    models::{ApiReleasePage, ProviderMap, SearchQuery},
    services::cancellation::CancelToken,
};

pub mod justwatch;

pub use justwatch::JustWatchClient;

/// Trait for the upstream release catalog
///
/// Implementations must resolve with [`UpstreamError::Cancelled`] once the
/// token fires, never with a late success. Calls are never retried here; the
/// next poll cycle is the retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Provider catalog for a locale, keyed by provider id
    async fn fetch_providers(
        &self,
        locale: &str,
        cancel: &CancelToken,
    ) -> Result<ProviderMap, UpstreamError>;

    /// New releases matching `query`, paged relative to `reference_date`
    async fn fetch_new_releases(
        &self,
        locale: &str,
        query: &SearchQuery,
        reference_date: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<ApiReleasePage, UpstreamError>;

    /// Source name for logging and debugging
    fn name(&self) -> &'static str;
}
