//! Query parameters shared by one-shot queries and the streaming loop.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::storage::error::ParamError;

/// Relative window applied when neither `since` nor `time_range` is given.
pub const DEFAULT_TIME_RANGE: &str = "1h";

/// Filtering, ordering and paging for a query.
///
/// The time window is half-open: `since <= t < until`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryParams {
    pub service: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
    pub trace_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: Option<String>,
    pub order_desc: bool,
    pub filters: BTreeMap<String, String>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            service: None,
            level: None,
            search: None,
            trace_id: None,
            since: None,
            until: None,
            limit: None,
            offset: 0,
            order_by: None,
            order_desc: true,
            filters: BTreeMap::new(),
        }
    }
}

impl QueryParams {
    /// Parse the query-string representation.
    ///
    /// `since` defaults to `now - time_range` (itself defaulting to 1h);
    /// `until` stays open unless given. Relative times are resolved against
    /// `now`.
    pub fn from_query(query: &HashMap<String, String>, now: DateTime<Utc>) -> Result<Self, ParamError> {
        let get = |key: &str| query.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mut params = Self {
            service: get("service").map(str::to_string),
            level: get("level").map(str::to_string),
            search: get("search").map(str::to_string),
            trace_id: get("trace_id").map(str::to_string),
            order_by: get("order_by").map(str::to_string),
            ..Self::default()
        };

        if let Some(limit) = get("limit") {
            params.limit = Some(parse_usize("limit", limit)?);
        }
        if let Some(offset) = get("offset") {
            params.offset = parse_usize("offset", offset)?;
        }

        params.since = match get("since") {
            Some(since) => Some(parse_time(since, now)?),
            None => {
                let range = parse_duration(get("time_range").unwrap_or(DEFAULT_TIME_RANGE))?;
                Some(now - range)
            }
        };
        if let Some(until) = get("until") {
            params.until = Some(parse_time(until, now)?);
        }

        if let Some(desc) = get("order_desc") {
            params.order_desc = match desc.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ParamError::InvalidValue {
                        name: "order_desc",
                        value: desc.to_string(),
                    })
                }
            };
        } else if let Some(order) = get("order") {
            params.order_desc = match order.to_ascii_lowercase().as_str() {
                "desc" => true,
                "asc" => false,
                _ => {
                    return Err(ParamError::InvalidValue {
                        name: "order",
                        value: order.to_string(),
                    })
                }
            };
        }

        for (key, value) in query {
            if let Some(name) = key.strip_prefix("filter.") {
                if !name.is_empty() {
                    params.filters.insert(name.to_string(), value.clone());
                }
            }
        }

        Ok(params)
    }

    /// True if `t` falls in `[since, until)`.
    pub fn in_window(&self, t: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| t >= since) && self.until.map_or(true, |until| t < until)
    }

    /// Case-insensitive substring match against any of `fields`.
    pub fn search_matches(&self, fields: &[&str]) -> bool {
        match &self.search {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                fields.iter().any(|f| f.to_lowercase().contains(&needle))
            }
        }
    }

    /// Every `filters` entry must equal the corresponding attribute.
    pub fn filters_match(&self, attributes: &HashMap<String, String>) -> bool {
        self.filters
            .iter()
            .all(|(k, v)| attributes.get(k).is_some_and(|a| a == v))
    }
}

fn parse_usize(name: &'static str, value: &str) -> Result<usize, ParamError> {
    value.parse().map_err(|_| ParamError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Parse `Nd`, `Nh`, `Nm` or `Ns`.
pub fn parse_duration(value: &str) -> Result<Duration, ParamError> {
    let value = value.trim();
    let invalid = || ParamError::InvalidDuration(value.to_string());
    let Some((split, _)) = value.char_indices().last().filter(|&(i, _)| i > 0) else {
        return Err(invalid());
    };
    let (number, unit) = value.split_at(split);
    let n: i64 = number.parse().map_err(|_| invalid())?;
    if n < 0 {
        return Err(invalid());
    }
    match unit {
        "d" => Duration::try_days(n),
        "h" => Duration::try_hours(n),
        "m" => Duration::try_minutes(n),
        "s" => Duration::try_seconds(n),
        _ => None,
    }
    .ok_or_else(invalid)
}

/// Parse an RFC3339 timestamp or a relative duration meaning "that long ago".
pub fn parse_time(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ParamError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    parse_duration(value)
        .map(|d| now - d)
        .map_err(|_| ParamError::InvalidTime(value.to_string()))
}
