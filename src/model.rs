use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_TIME_RANGE: &str = "1h";
pub const DEFAULT_LIMIT: i64 = 50;
pub const DEFAULT_ERROR_LOG_LIMIT: i64 = 100;
pub const DEFAULT_AGGREGATION_SIZE: i64 = 10;

/// `search_logs` 的原始参数。字段均可缺省，默认值在这里定义，校验在 validator 中完成。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLogsArgs {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default = "default_limit", deserialize_with = "lenient_int")]
    pub limit: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub offset: i64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_sort_direction")]
    pub sort_direction: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub decorate: Option<bool>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub highlight: Option<bool>,
}

impl SearchLogsArgs {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            time_range: None,
            fields: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: None,
            sort_direction: default_sort_direction(),
            stream_id: None,
            decorate: None,
            filter: None,
            highlight: None,
        }
    }
}

/// `search_stream_logs` 的原始参数。query 缺省时搜索整个 stream（`*`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSearchArgs {
    #[serde(default)]
    pub stream_id: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default = "default_limit", deserialize_with = "lenient_int")]
    pub limit: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub offset: i64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_sort_direction")]
    pub sort_direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationArgs {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub aggregation_type: String,
    #[serde(default)]
    pub field: String,
    #[serde(default = "default_aggregation_size", deserialize_with = "lenient_int")]
    pub size: i64,
    #[serde(default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamIdArgs {
    #[serde(default)]
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamNameArgs {
    #[serde(default)]
    pub stream_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogsArgs {
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default = "default_error_log_limit", deserialize_with = "lenient_int")]
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelCountArgs {
    #[serde(default)]
    pub time_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastEventArgs {
    #[serde(default)]
    pub stream_id: String,
    #[serde(default)]
    pub time_range: Option<String>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_error_log_limit() -> i64 {
    DEFAULT_ERROR_LOG_LIMIT
}

fn default_aggregation_size() -> i64 {
    DEFAULT_AGGREGATION_SIZE
}

fn default_sort_direction() -> String {
    "desc".to_string()
}

/// 整数参数：接受 `50.0` 这类整值浮点数，超出 i64 的数值饱和到边界，交给 validator 报 OutOfRange。
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientInt;

    impl<'de> Visitor<'de> for LenientInt {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(i64::MAX))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<i64, E> {
            if v.is_finite() && v.fract() == 0.0 {
                // `as` saturates at the i64 bounds
                Ok(v as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(LenientInt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(ValidationError::InvalidEnum {
                field: "sort_direction",
                value: other.to_string(),
                expected: "{asc, desc}",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Terms,
    DateHistogram,
    Cardinality,
    Stats,
    Min,
    Max,
    Avg,
    Sum,
}

impl AggregationType {
    pub const ALL: [AggregationType; 8] = [
        AggregationType::Terms,
        AggregationType::DateHistogram,
        AggregationType::Cardinality,
        AggregationType::Stats,
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::Avg,
        AggregationType::Sum,
    ];

    /// 后端聚合接口路径中的名字。
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Terms => "terms",
            AggregationType::DateHistogram => "date_histogram",
            AggregationType::Cardinality => "cardinality",
            AggregationType::Stats => "stats",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Avg => "avg",
            AggregationType::Sum => "sum",
        }
    }
}

impl FromStr for AggregationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AggregationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAggregation(s.to_string()))
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(TimeUnit::Minutes),
            'h' => Some(TimeUnit::Hours),
            'd' => Some(TimeUnit::Days),
            'w' => Some(TimeUnit::Weeks),
            _ => None,
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
            TimeUnit::Weeks => 604_800,
        }
    }
}

/// 已校验的时间范围：相对（数量 + 单位）或绝对（ISO-8601 原文）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeRange {
    Relative { amount: u64, unit: TimeUnit },
    Absolute { from: String, to: Option<String> },
}

/// 后端期望的时间范围表示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRange {
    Relative { seconds: u64 },
    Absolute { from: String, to: Option<String> },
}

/// 校验通过的搜索参数，可直接映射为后端 query string。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub range: BackendRange,
    pub fields: Vec<String>,
    pub limit: u32,
    pub offset: u64,
    pub sort: Option<(String, SortDirection)>,
    pub stream_id: Option<String>,
    pub decorate: Option<bool>,
    pub filter: Option<String>,
    pub highlight: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationParams {
    pub query: String,
    pub range: BackendRange,
    pub kind: AggregationType,
    pub field: String,
    pub size: u32,
    pub interval: Option<String>,
}
