use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashMap, fmt::Display};

pub mod instance_config;
pub mod notification;

pub use instance_config::{
    validate, InstanceConfig, ScoreRange, ScoringFilters, SearchQuery, SortDirection, SortKey,
    SortRule, Vocabulary,
};
pub use notification::{Notification, NotificationPayload, NotificationReceiver, NotificationSender};

/// Opaque identifier of one registered widget
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Provider lookup table keyed by provider identifier
pub type ProviderMap = HashMap<String, Provider>;

/// A streaming service as known to the display pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Templated icon path, still containing the `{profile}` token
    pub icon: Option<String>,
}

impl Provider {
    /// Stand-in used when a release references a provider missing from the catalog
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "unknown".to_string(),
            icon: None,
        }
    }
}

/// Normalized, ready-to-render record handed to the display layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayItem {
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub poster: Option<String>,
    pub provider_name: String,
    pub provider_icon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Movie,
    ShowSeason,
    Show,
    #[default]
    #[serde(other)]
    Other,
}

// ============================================================================
// Content API Types
// ============================================================================

/// Entry of GET providers/locale/{locale}
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProvider {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub clear_name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl From<ApiProvider> for Provider {
    fn from(provider: ApiProvider) -> Self {
        Provider {
            id: provider.id,
            name: provider.clear_name,
            icon: provider.icon_url.filter(|url| !url.is_empty()),
        }
    }
}

/// Response of GET titles/{locale}/new
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiReleasePage {
    #[serde(default)]
    pub days: Vec<ApiReleaseDay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiReleaseDay {
    #[serde(default)]
    pub providers: Vec<ApiProviderGroup>,
}

/// Releases of one day grouped under the provider offering them
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProviderGroup {
    #[serde(deserialize_with = "string_or_number")]
    pub provider_id: String,
    #[serde(default)]
    pub items: Vec<ApiReleaseItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiReleaseItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_release_year: Option<i32>,
    #[serde(default)]
    pub object_type: ObjectType,
    #[serde(default)]
    pub poster: Option<String>,
}

/// The catalog uses numeric ids in production and string ids in some fixtures
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}
