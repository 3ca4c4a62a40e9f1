//! 工具参数校验：唯一的入口闸门，通过后客户端不再二次校验。

use std::fmt;

use crate::error::ValidationError;
use crate::model::{
    AggregationArgs, AggregationParams, AggregationType, SearchLogsArgs, SearchParams,
    SortDirection, StreamSearchArgs, TimeRange, DEFAULT_TIME_RANGE,
};
use crate::timerange::translate;

/// 闭区间数值约束，`max` 为 `None` 表示无上界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i64,
    pub max: Option<i64>,
}

impl Bounds {
    pub const fn between(min: i64, max: i64) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: i64) -> Self {
        Self { min, max: None }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "between {} and {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

pub const SEARCH_LIMIT: Bounds = Bounds::between(1, 1000);
pub const STREAM_SEARCH_LIMIT: Bounds = Bounds::between(1, 100);
pub const AGGREGATION_SIZE: Bounds = Bounds::between(1, 100);
pub const OFFSET: Bounds = Bounds::at_least(0);

pub fn validate_query(query: &str) -> Result<String, ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    Ok(query.to_string())
}

/// 缺省或空白时使用默认的 `1h`。
pub fn validate_time_range(raw: Option<&str>) -> Result<TimeRange, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse(),
        None => DEFAULT_TIME_RANGE.parse(),
    }
}

pub fn validate_bounded(
    field: &'static str,
    value: i64,
    bounds: Bounds,
) -> Result<i64, ValidationError> {
    if bounds.contains(value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            bounds,
        })
    }
}

pub fn validate_sort_direction(raw: &str) -> Result<SortDirection, ValidationError> {
    raw.parse()
}

pub fn validate_required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// 校验聚合类型；`date_histogram` 额外要求非空的 interval。
pub fn validate_aggregation_kind(
    raw: &str,
    interval: Option<&str>,
) -> Result<(AggregationType, Option<String>), ValidationError> {
    let kind: AggregationType = raw.trim().parse()?;
    let interval = interval
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if kind == AggregationType::DateHistogram && interval.is_none() {
        return Err(ValidationError::MissingInterval);
    }
    Ok((kind, interval))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn clean_fields(fields: &Option<Vec<String>>) -> Vec<String> {
    fields
        .iter()
        .flatten()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

struct CommonSearch<'a> {
    query: &'a str,
    time_range: Option<&'a str>,
    fields: &'a Option<Vec<String>>,
    limit: i64,
    offset: i64,
    sort: &'a Option<String>,
    sort_direction: &'a str,
}

fn validate_common(
    input: CommonSearch<'_>,
    limit_bounds: Bounds,
    stream_id: Option<String>,
) -> Result<SearchParams, ValidationError> {
    let query = validate_query(input.query)?;
    let range = validate_time_range(input.time_range)?;
    let limit = validate_bounded("limit", input.limit, limit_bounds)?;
    let offset = validate_bounded("offset", input.offset, OFFSET)?;
    let direction = validate_sort_direction(input.sort_direction)?;
    let sort = non_blank(input.sort).map(|field| (field, direction));

    Ok(SearchParams {
        query,
        range: translate(&range),
        fields: clean_fields(input.fields),
        limit: limit as u32,
        offset: offset as u64,
        sort,
        stream_id,
        decorate: None,
        filter: None,
        highlight: None,
    })
}

pub fn validate_search(args: &SearchLogsArgs) -> Result<SearchParams, ValidationError> {
    let mut params = validate_common(
        CommonSearch {
            query: &args.query,
            time_range: args.time_range.as_deref(),
            fields: &args.fields,
            limit: args.limit,
            offset: args.offset,
            sort: &args.sort,
            sort_direction: &args.sort_direction,
        },
        SEARCH_LIMIT,
        non_blank(&args.stream_id),
    )?;
    params.decorate = args.decorate;
    params.filter = non_blank(&args.filter);
    params.highlight = args.highlight;
    Ok(params)
}

/// stream 内搜索：上限 100，缺省 query 为 `*`，但显式的空白 query 仍然拒绝。
pub fn validate_stream_search(args: &StreamSearchArgs) -> Result<SearchParams, ValidationError> {
    let query = args.query.as_deref().unwrap_or("*");
    validate_query(query)?;
    let stream_id = validate_required("stream_id", &args.stream_id)?;
    validate_common(
        CommonSearch {
            query,
            time_range: args.time_range.as_deref(),
            fields: &args.fields,
            limit: args.limit,
            offset: args.offset,
            sort: &args.sort,
            sort_direction: &args.sort_direction,
        },
        STREAM_SEARCH_LIMIT,
        Some(stream_id),
    )
}

pub fn validate_aggregation(args: &AggregationArgs) -> Result<AggregationParams, ValidationError> {
    let query = validate_query(&args.query)?;
    let range = validate_time_range(args.time_range.as_deref())?;
    let (kind, interval) = validate_aggregation_kind(&args.aggregation_type, args.interval.as_deref())?;
    let field = validate_required("field", &args.field)?;
    let size = validate_bounded("size", args.size, AGGREGATION_SIZE)?;

    Ok(AggregationParams {
        query,
        range: translate(&range),
        kind,
        field,
        size: size as u32,
        interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendRange;

    fn search(query: &str) -> SearchLogsArgs {
        SearchLogsArgs::new(query)
    }

    fn stream_search(limit: i64) -> StreamSearchArgs {
        StreamSearchArgs {
            stream_id: "5abb3f2f7bb9fd00011595fe".into(),
            query: None,
            time_range: None,
            fields: None,
            limit,
            offset: 0,
            sort: None,
            sort_direction: "desc".into(),
        }
    }

    fn aggregation(kind: &str, interval: Option<&str>) -> AggregationArgs {
        AggregationArgs {
            query: "*".into(),
            time_range: Some("24h".into()),
            aggregation_type: kind.into(),
            field: "source".into(),
            size: 10,
            interval: interval.map(str::to_string),
        }
    }

    #[test]
    fn search_limit_bounds() {
        for bad in [-1, 0, 1001, 5000] {
            let mut args = search("*");
            args.limit = bad;
            assert!(
                matches!(
                    validate_search(&args),
                    Err(ValidationError::OutOfRange { field: "limit", .. })
                ),
                "limit {bad}"
            );
        }
        for good in [1, 50, 1000] {
            let mut args = search("*");
            args.limit = good;
            assert_eq!(validate_search(&args).unwrap().limit, good as u32);
        }
    }

    #[test]
    fn stream_search_limit_bounds() {
        assert!(matches!(
            validate_stream_search(&stream_search(101)),
            Err(ValidationError::OutOfRange { field: "limit", .. })
        ));
        assert!(matches!(
            validate_stream_search(&stream_search(0)),
            Err(ValidationError::OutOfRange { field: "limit", .. })
        ));
        let ok = validate_stream_search(&stream_search(100)).unwrap();
        assert_eq!(ok.limit, 100);
        assert_eq!(ok.query, "*");
        assert_eq!(ok.stream_id.as_deref(), Some("5abb3f2f7bb9fd00011595fe"));
    }

    #[test]
    fn stream_search_requires_stream_id_and_non_blank_query() {
        let mut args = stream_search(10);
        args.stream_id = "  ".into();
        assert_eq!(
            validate_stream_search(&args).unwrap_err(),
            ValidationError::MissingField("stream_id")
        );

        let mut args = stream_search(10);
        args.query = Some("".into());
        assert_eq!(validate_stream_search(&args).unwrap_err(), ValidationError::EmptyQuery);
    }

    #[test]
    fn empty_query_fails_regardless_of_other_fields() {
        let mut args = search("");
        args.limit = 99_999;
        args.offset = -1;
        args.time_range = Some("garbage".into());
        args.sort_direction = "sideways".into();
        assert_eq!(validate_search(&args).unwrap_err(), ValidationError::EmptyQuery);
        assert_eq!(validate_search(&search("   ")).unwrap_err(), ValidationError::EmptyQuery);
    }

    #[test]
    fn negative_offset_rejected() {
        let mut args = search("*");
        args.offset = -1;
        assert!(matches!(
            validate_search(&args),
            Err(ValidationError::OutOfRange { field: "offset", value: -1, .. })
        ));
    }

    #[test]
    fn sort_direction_enum() {
        let mut args = search("*");
        args.sort_direction = "up".into();
        assert!(matches!(
            validate_search(&args),
            Err(ValidationError::InvalidEnum { field: "sort_direction", .. })
        ));

        for dir in ["asc", "desc"] {
            let mut args = search("*");
            args.sort = Some("timestamp".into());
            args.sort_direction = dir.into();
            let params = validate_search(&args).unwrap();
            assert_eq!(params.sort.unwrap().1.as_str(), dir);
        }
    }

    #[test]
    fn default_time_range_is_one_hour() {
        let params = validate_search(&search("*")).unwrap();
        assert_eq!(params.range, BackendRange::Relative { seconds: 3_600 });

        let mut args = search("*");
        args.time_range = Some("  ".into());
        assert_eq!(
            validate_search(&args).unwrap().range,
            BackendRange::Relative { seconds: 3_600 }
        );
    }

    #[test]
    fn invalid_time_range_rejected() {
        let mut args = search("*");
        args.time_range = Some("yesterday".into());
        assert_eq!(
            validate_search(&args).unwrap_err(),
            ValidationError::InvalidTimeRange("yesterday".into())
        );
    }

    #[test]
    fn date_histogram_requires_interval() {
        assert_eq!(
            validate_aggregation(&aggregation("date_histogram", None)).unwrap_err(),
            ValidationError::MissingInterval
        );
        assert_eq!(
            validate_aggregation(&aggregation("date_histogram", Some(" "))).unwrap_err(),
            ValidationError::MissingInterval
        );
        let ok = validate_aggregation(&aggregation("date_histogram", Some("hour"))).unwrap();
        assert_eq!(ok.kind, AggregationType::DateHistogram);
        assert_eq!(ok.interval.as_deref(), Some("hour"));
    }

    #[test]
    fn aggregation_size_and_kind() {
        let mut args = aggregation("terms", None);
        args.size = 101;
        assert!(matches!(
            validate_aggregation(&args),
            Err(ValidationError::OutOfRange { field: "size", .. })
        ));
        args.size = 0;
        assert!(validate_aggregation(&args).is_err());

        assert_eq!(
            validate_aggregation(&aggregation("median", None)).unwrap_err(),
            ValidationError::UnknownAggregation("median".into())
        );

        let mut args = aggregation("cardinality", None);
        args.field = String::new();
        assert_eq!(
            validate_aggregation(&args).unwrap_err(),
            ValidationError::MissingField("field")
        );
    }

    #[test]
    fn fields_and_optional_switches_are_cleaned() {
        let mut args = search("source:nginx");
        args.fields = Some(vec!["message".into(), " ".into(), "level".into()]);
        args.filter = Some("  ".into());
        args.stream_id = Some(String::new());
        args.highlight = Some(true);
        let params = validate_search(&args).unwrap();
        assert_eq!(params.fields, vec!["message".to_string(), "level".to_string()]);
        assert!(params.filter.is_none());
        assert!(params.stream_id.is_none());
        assert_eq!(params.highlight, Some(true));
    }
}
