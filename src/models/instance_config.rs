/// Per-instance configuration and its closed-world validator.
///
/// A widget hands over an untyped JSON object. [`validate`] checks it against
/// the known schema field by field, applies defaults, and returns the first
/// violation with the path of the offending field. Unknown keys are rejected
/// at every level.
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_MAX_ENTRIES: usize = 10;
const MIN_RELEASE_YEAR: u32 = 1900;

static LOCALE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+_[A-Z]+$").expect("locale pattern is valid"));

const TOP_LEVEL_FIELDS: &[&str] = &[
    "locale",
    "updateInterval",
    "maxEntries",
    "alwaysShowOriginalTitle",
    "hideProviderIcon",
    "coverFlow",
    "sort",
    "search",
];

const SORT_FIELDS: &[&str] = &["key", "direction"];

const SEARCH_FIELDS: &[&str] = &[
    "content_types",
    "age_certifications",
    "genres",
    "monetization_types",
    "presentation_types",
    "providers",
    "release_year_from",
    "release_year_until",
    "scoring_filter_types",
];

const SCORE_RANGE_FIELDS: &[&str] = &["min_scoring_value", "max_scoring_value"];

/// Validated configuration of one polling instance
///
/// Serializes back into the raw shape it was validated from, so validating
/// the serialized form again yields an equal value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub locale: String,
    /// Delay between two poll cycles, in milliseconds
    pub update_interval: u64,
    pub max_entries: usize,
    pub always_show_original_title: bool,
    pub hide_provider_icon: bool,
    /// Display-only flag, carried through untouched
    pub cover_flow: bool,
    pub sort: Vec<SortRule>,
    pub search: SearchQuery,
}

impl InstanceConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub key: SortKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Title,
    Year,
    ProviderName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Filter query forwarded verbatim to the new-releases endpoint
///
/// Every set-valued filter is either `None` (no filtering) or a set of codes
/// from a fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchQuery {
    pub content_types: Option<BTreeSet<ContentType>>,
    pub age_certifications: Option<BTreeSet<AgeCertification>>,
    pub genres: Option<BTreeSet<Genre>>,
    pub monetization_types: Option<BTreeSet<MonetizationType>>,
    pub presentation_types: Option<BTreeSet<PresentationType>>,
    pub providers: Option<BTreeSet<ProviderCode>>,
    pub release_year_from: Option<u32>,
    pub release_year_until: Option<u32>,
    pub scoring_filter_types: Option<ScoringFilters>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringFilters {
    #[serde(rename = "imdb:score", skip_serializing_if = "Option::is_none")]
    pub imdb_score: Option<ScoreRange>,
    #[serde(rename = "tomato:meter", skip_serializing_if = "Option::is_none")]
    pub tomato_meter: Option<ScoreRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRange {
    pub min_scoring_value: f64,
    pub max_scoring_value: f64,
}

/// Defines a closed vocabulary of wire codes
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl Vocabulary for $name {
            const ALL: &'static [$name] = &[$($name::$variant),+];

            fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code,)+
                }
            }
        }
    };
}

/// Closed set of wire codes accepted by a `search` field
pub trait Vocabulary: Copy + Ord + 'static {
    const ALL: &'static [Self];

    fn code(self) -> &'static str;

    fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|value| value.code() == code)
    }

    /// Comma-separated list of every accepted code
    fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|value| value.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

vocabulary!(ContentType {
    Movie => "movie",
    ShowSeason => "show_season",
});

vocabulary!(AgeCertification {
    All => "0",
    Six => "6",
    Twelve => "12",
    Sixteen => "16",
    Eighteen => "18",
});

vocabulary!(Genre {
    ActionAdventure => "act",
    Animation => "ani",
    Comedy => "cmy",
    Crime => "crm",
    Documentary => "doc",
    Drama => "drm",
    KidsFamily => "fml",
    Fantasy => "fnt",
    Horror => "hrr",
    History => "hst",
    Music => "msc",
    Romance => "rma",
    ScienceFiction => "scf",
    Sport => "spt",
    MysteryThriller => "trl",
    WarMilitary => "war",
    Western => "wsn",
});

vocabulary!(MonetizationType {
    Flatrate => "flatrate",
    Rent => "rent",
    Buy => "buy",
    Ads => "ads",
    Free => "free",
});

vocabulary!(PresentationType {
    Sd => "sd",
    Hd => "hd",
    UltraHd => "4k",
});

vocabulary!(
    /// Provider short codes accepted by the search filter
    ProviderCode {
        Netflix => "nfx",
        AmazonPrimeVideo => "amp",
        AmazonVideo => "amz",
        SkyTicket => "sko",
        SkyGo => "skg",
        Maxdome => "max",
        AppleItunes => "itu",
        GooglePlay => "ply",
        YouTube => "yot",
        StarzPlayAmazonChannel => "ast",
        AnimaxPlusAmazonChannel => "aan",
        SkyStore => "sks",
        RakutenTv => "wki",
        MaxdomeStore => "mds",
        MicrosoftStore => "msf",
        PlayStation => "pls",
        Realeyz => "rlz",
        Videobuster => "vdb",
        Pantaflix => "pfx",
        Chili => "chi",
        Universcine => "uni",
        Kividoo => "kvd",
        Shudder => "shd",
        EntertainTv => "etv",
        Netzkino => "ntz",
        Alleskino => "als",
        Flimmit => "fli",
        Watchbox => "wbx",
        Mubi => "mbi",
        GuideDoc => "gdc",
        NetflixKids => "nfk",
        YouTubePremium => "ytr",
        DasErsteMediathek => "dem",
        Arte => "art",
    }
);

/// Validates a raw instance configuration and applies defaults
///
/// Returns the first violation found; nothing of a failing configuration is
/// kept.
pub fn validate(raw: &Value) -> Result<InstanceConfig, ValidationError> {
    let obj = as_object(raw, "config")?;
    reject_unknown(obj, TOP_LEVEL_FIELDS, "")?;

    let locale: String = required(obj, "locale", "locale")?;
    if !LOCALE_PATTERN.is_match(&locale) {
        return Err(ValidationError::new(
            "locale",
            format!("\"{}\" does not match language_COUNTRY (e.g. en_US)", locale),
        ));
    }

    let update_interval = positive(
        optional::<u64>(obj, "updateInterval", "updateInterval")?
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_MS),
        "updateInterval",
    )?;
    let max_entries = positive(
        optional::<usize>(obj, "maxEntries", "maxEntries")?.unwrap_or(DEFAULT_MAX_ENTRIES),
        "maxEntries",
    )?;

    let always_show_original_title =
        optional(obj, "alwaysShowOriginalTitle", "alwaysShowOriginalTitle")?.unwrap_or(false);
    let hide_provider_icon = optional(obj, "hideProviderIcon", "hideProviderIcon")?.unwrap_or(false);
    let cover_flow = optional(obj, "coverFlow", "coverFlow")?.unwrap_or(false);

    let sort = match obj.get("sort") {
        None => vec![SortRule {
            key: SortKey::Title,
            direction: SortDirection::Asc,
        }],
        Some(value) => validate_sort(value)?,
    };

    let search = match obj.get("search") {
        None => return Err(ValidationError::new("search", "is required")),
        Some(value) => validate_search(value)?,
    };

    Ok(InstanceConfig {
        locale,
        update_interval,
        max_entries,
        always_show_original_title,
        hide_provider_icon,
        cover_flow,
        sort,
        search,
    })
}

fn validate_sort(value: &Value) -> Result<Vec<SortRule>, ValidationError> {
    let entries = value
        .as_array()
        .ok_or_else(|| ValidationError::new("sort", "must be an array"))?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| -> Result<SortRule, ValidationError> {
            let path = format!("sort[{}]", index);
            let obj = as_object(entry, &path)?;
            reject_unknown(obj, SORT_FIELDS, &path)?;

            Ok(SortRule {
                key: required(obj, "key", &format!("{}.key", path))?,
                direction: optional(obj, "direction", &format!("{}.direction", path))?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn validate_search(value: &Value) -> Result<SearchQuery, ValidationError> {
    let obj = as_object(value, "search")?;
    reject_unknown(obj, SEARCH_FIELDS, "search")?;

    Ok(SearchQuery {
        content_types: nullable_set(obj, "content_types")?,
        age_certifications: nullable_set(obj, "age_certifications")?,
        genres: nullable_set(obj, "genres")?,
        monetization_types: nullable_set(obj, "monetization_types")?,
        presentation_types: nullable_set(obj, "presentation_types")?,
        providers: nullable_set(obj, "providers")?,
        release_year_from: release_year(obj, "release_year_from")?,
        release_year_until: release_year(obj, "release_year_until")?,
        scoring_filter_types: scoring_filters(obj)?,
    })
}

fn release_year(obj: &Map<String, Value>, field: &str) -> Result<Option<u32>, ValidationError> {
    let path = format!("search.{}", field);
    match optional::<Option<u32>>(obj, field, &path)?.flatten() {
        Some(year) if year < MIN_RELEASE_YEAR => Err(ValidationError::new(
            path,
            format!("must be greater than or equal to {}", MIN_RELEASE_YEAR),
        )),
        year => Ok(year),
    }
}

fn scoring_filters(obj: &Map<String, Value>) -> Result<Option<ScoringFilters>, ValidationError> {
    let path = "search.scoring_filter_types";
    let value = match obj.get("scoring_filter_types") {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let filters = as_object(value, path)?;
    reject_unknown(filters, &["imdb:score", "tomato:meter"], path)?;

    Ok(Some(ScoringFilters {
        imdb_score: score_range(filters, "imdb:score", 10.0)?,
        tomato_meter: score_range(filters, "tomato:meter", 100.0)?,
    }))
}

/// Bounds are scoped to the rating provider's native scale, `0..=max`
fn score_range(
    filters: &Map<String, Value>,
    provider: &str,
    max: f64,
) -> Result<Option<ScoreRange>, ValidationError> {
    let path = format!("search.scoring_filter_types.{}", provider);
    let value = match filters.get(provider) {
        None => return Ok(None),
        Some(value) => value,
    };

    let range = as_object(value, &path)?;
    reject_unknown(range, SCORE_RANGE_FIELDS, &path)?;

    let mut bounds = [0.0; 2];
    for (bound, field) in bounds.iter_mut().zip(SCORE_RANGE_FIELDS) {
        let field_path = format!("{}.{}", path, field);
        let score: f64 = required(range, field, &field_path)?;
        if !(0.0..=max).contains(&score) {
            return Err(ValidationError::new(
                field_path,
                format!("must be between 0 and {}", max),
            ));
        }
        *bound = score;
    }

    let [min_scoring_value, max_scoring_value] = bounds;
    if min_scoring_value > max_scoring_value {
        return Err(ValidationError::new(
            path,
            "min_scoring_value must not exceed max_scoring_value",
        ));
    }

    Ok(Some(ScoreRange {
        min_scoring_value,
        max_scoring_value,
    }))
}

/// Absent or null means "no filter"; duplicates collapse
fn nullable_set<T>(
    obj: &Map<String, Value>,
    field: &str,
) -> Result<Option<BTreeSet<T>>, ValidationError>
where
    T: Vocabulary,
{
    let path = format!("search.{}", field);
    let values = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(values)) => values,
        Some(_) => return Err(ValidationError::new(path, "must be an array or null")),
    };

    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_str().and_then(T::from_code).ok_or_else(|| {
                ValidationError::new(
                    format!("{}[{}]", path, index),
                    format!("must be one of: {}", T::allowed()),
                )
            })
        })
        .collect::<Result<BTreeSet<T>, _>>()
        .map(Some)
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "must be an object"))
}

fn reject_unknown(
    obj: &Map<String, Value>,
    known: &[&str],
    path: &str,
) -> Result<(), ValidationError> {
    match obj.keys().find(|key| !known.contains(&key.as_str())) {
        Some(key) => Err(ValidationError::new(join(path, key), "is not allowed")),
        None => Ok(()),
    }
}

fn required<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<T, ValidationError> {
    optional(obj, field, path)?.ok_or_else(|| ValidationError::new(path, "is required"))
}

/// Absent fields yield `None`; present ones must convert (null included)
fn optional<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<Option<T>, ValidationError> {
    obj.get(field).map(|value| convert(value, path)).transpose()
}

fn convert<T: DeserializeOwned>(value: &Value, path: &str) -> Result<T, ValidationError> {
    T::deserialize(value).map_err(|e| ValidationError::new(path, e.to_string()))
}

fn positive<T: Default + PartialOrd>(value: T, path: &str) -> Result<T, ValidationError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ValidationError::new(path, "must be a positive integer"))
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
