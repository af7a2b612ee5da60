use std::cmp::Ordering;
use std::collections::HashSet;

use crate::{
    error::AggregationError,
    models::{
        ApiReleaseItem, ApiReleasePage, DisplayItem, InstanceConfig, Provider, ProviderMap,
        SortDirection, SortKey, SortRule,
    },
};

const POSTER_PROFILE: &str = "s166";
const PROVIDER_ICON_PROFILE: &str = "s25";

/// Turns one release listing into the display list of an instance
///
/// Steps: join releases with providers, map to display items, sort by the
/// configured keys, drop repeated ids, truncate to `max_entries`.
#[derive(Debug, Clone)]
pub struct Aggregator {
    image_base_url: String,
}

impl Aggregator {
    pub fn new(image_base_url: impl Into<String>) -> Self {
        Self {
            image_base_url: image_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn aggregate(
        &self,
        providers: &ProviderMap,
        page: &ApiReleasePage,
        config: &InstanceConfig,
    ) -> Result<Vec<DisplayItem>, AggregationError> {
        let day = page.days.first().ok_or(AggregationError::MissingDay)?;

        let mut items: Vec<DisplayItem> = day
            .providers
            .iter()
            .flat_map(|group| {
                let provider = providers.get(&group.provider_id).cloned().unwrap_or_else(|| {
                    tracing::debug!(
                        provider_id = %group.provider_id,
                        "Unknown provider, using placeholder"
                    );
                    Provider::placeholder(&group.provider_id)
                });

                group
                    .items
                    .iter()
                    .map(|item| self.display_item(item, &provider, config))
                    .collect::<Vec<_>>()
            })
            .collect();

        // sort_by is stable: items tied on every key keep their input order
        items.sort_by(|a, b| compare(a, b, &config.sort));

        let mut seen = HashSet::new();
        items.retain(|item| seen.insert(item.id.clone()));
        items.truncate(config.max_entries);

        Ok(items)
    }

    fn display_item(
        &self,
        item: &ApiReleaseItem,
        provider: &Provider,
        config: &InstanceConfig,
    ) -> DisplayItem {
        let localized = item.title.clone().unwrap_or_default();
        let title = if config.always_show_original_title {
            item.original_title.clone().unwrap_or(localized)
        } else {
            localized
        };

        let provider_icon = if config.hide_provider_icon {
            None
        } else {
            self.image_url(provider.icon.as_deref(), PROVIDER_ICON_PROFILE)
        };

        DisplayItem {
            id: item.id.clone(),
            title,
            year: item.original_release_year,
            object_type: item.object_type,
            poster: self.image_url(item.poster.as_deref(), POSTER_PROFILE),
            provider_name: provider.name.clone(),
            provider_icon,
        }
    }

    /// Absolute image URL for a templated path, `None` when there is no path
    fn image_url(&self, path: Option<&str>, profile: &str) -> Option<String> {
        let path = path.filter(|p| !p.is_empty())?.replace("{profile}", profile);
        let separator = if path.starts_with('/') { "" } else { "/" };
        Some(format!("{}{}{}", self.image_base_url, separator, path))
    }
}

/// Applies the sort rules in order; later rules only break ties
fn compare(a: &DisplayItem, b: &DisplayItem, rules: &[SortRule]) -> Ordering {
    rules
        .iter()
        .map(|rule| {
            let ordering = match rule.key {
                // None sorts before every year
                SortKey::Year => a.year.cmp(&b.year),
                SortKey::Title => compare_text(&a.title, &b.title),
                SortKey::ProviderName => compare_text(&a.provider_name, &b.provider_name),
            };
            match rule.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Case-insensitive first, exact text as tie-breaker
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
