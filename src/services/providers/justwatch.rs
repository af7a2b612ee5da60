/// JustWatch content API client
///
/// API Flow:
/// 1. Providers: GET providers/locale/{locale} → array of providers
/// 2. New releases: GET titles/{locale}/new?body={filters + page} → releases
///    grouped by day, then by provider
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::UpstreamError,
    models::{ApiProvider, ApiReleasePage, Provider, ProviderMap, SearchQuery},
    services::{cancellation::CancelToken, clock::Clock, providers::ReleaseSource},
};

#[derive(Clone)]
pub struct JustWatchClient {
    http_client: HttpClient,
    api_url: String,
    clock: Arc<dyn Clock>,
}

impl JustWatchClient {
    pub fn new(api_url: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            clock,
        }
    }

    /// GETs `path` and decodes the JSON body, unless `cancel` fires first
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancelToken,
    ) -> Result<T, UpstreamError> {
        let url = format!("{}/{}", self.api_url, path);

        let request = async {
            let response = self.http_client.get(&url).query(query).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(url = %url, status = %status, "Upstream request failed");
                return Err(UpstreamError::Status { status, body });
            }

            let response_text = response.text().await?;
            serde_json::from_str::<T>(&response_text)
                .map_err(|e| UpstreamError::Decode(e.to_string()))
        };

        cancel
            .run_until_cancelled(request)
            .await
            .unwrap_or(Err(UpstreamError::Cancelled))
    }
}

/// 1-based page for a reference date: today is page 1, yesterday page 2, ...
///
/// Dates in the future clamp to page 1.
pub fn page_for(today: NaiveDate, reference_date: NaiveDate) -> i64 {
    ((today - reference_date).num_days() + 1).max(1)
}

/// Serializes the search filters with the page merged in
fn release_query_body(query: &SearchQuery, page: i64) -> Result<String, UpstreamError> {
    let mut body = match serde_json::to_value(query) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(UpstreamError::Decode(format!(
                "search filters serialized to {} instead of an object",
                other
            )))
        }
        Err(e) => return Err(UpstreamError::Decode(e.to_string())),
    };
    body.insert("page".to_string(), Value::from(page));

    Ok(Value::Object(body).to_string())
}

#[async_trait::async_trait]
impl ReleaseSource for JustWatchClient {
    async fn fetch_providers(
        &self,
        locale: &str,
        cancel: &CancelToken,
    ) -> Result<ProviderMap, UpstreamError> {
        let providers: Vec<ApiProvider> = self
            .get_json(&format!("providers/locale/{}", locale), &[], cancel)
            .await?;

        tracing::debug!(
            locale = %locale,
            providers = providers.len(),
            source = self.name(),
            "Provider catalog fetched"
        );

        Ok(providers
            .into_iter()
            .map(Provider::from)
            .map(|provider| (provider.id.clone(), provider))
            .collect())
    }

    async fn fetch_new_releases(
        &self,
        locale: &str,
        query: &SearchQuery,
        reference_date: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<ApiReleasePage, UpstreamError> {
        let page = page_for(self.clock.today(), reference_date);
        let body = release_query_body(query, page)?;

        let releases: ApiReleasePage = self
            .get_json(&format!("titles/{}/new", locale), &[("body", body)], cancel)
            .await?;

        tracing::debug!(
            locale = %locale,
            page = page,
            days = releases.days.len(),
            source = self.name(),
            "New releases fetched"
        );

        Ok(releases)
    }

    fn name(&self) -> &'static str {
        "justwatch"
    }
}
