//! ==============================================================================
//! domain.rs - readings, view settings and push channel events
//! ==============================================================================
//!
//! purpose:
//!     the plain data types shared by the store, the http api, the broadcast
//!     loop and the websocket handler. nothing in here does io.
//!
//! relationships:
//!     - used by: store.rs (Reading, SortOrder)
//!     - used by: broadcast.rs (ViewSettings, SensorUpdate, ServerEvent)
//!     - used by: ws.rs (ClientEvent, FilterParams)
//!
//! ==============================================================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// one persisted sensor reading
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// auto-assigned row id
    pub id: i64,
    /// local wall time formatted `%d/%m/%Y %H:%M:%S`
    pub date: String,
    pub value: f64,
    /// unix milliseconds, used for ordering and range filters only
    #[serde(skip)]
    pub recorded_at: i64,
}

/// body of `POST /add_data` and `PUT /edit_data/:id`
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ValuePayload {
    pub value: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    #[default]
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("asc"),
            SortOrder::Descending => f.write_str("desc"),
        }
    }
}

// ==============================================================================
// date range filter
// ==============================================================================
// bounds are naive local times in the configured zone. the clock turns them
// into unix milliseconds when the broadcast loop builds its query.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognised date bound `{0}`")]
pub struct FilterError(pub String);

/// raw `applyFilter` payload as sent by the dashboard page
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FilterParams {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Clone, Copy)]
enum Edge {
    Start,
    End,
}

// (format, carries seconds)
const DATE_TIME_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%dT%H:%M:%S", true),
    ("%Y-%m-%dT%H:%M", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%d %H:%M", false),
    ("%d/%m/%Y %H:%M:%S", true),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

impl DateFilter {
    pub fn parse(params: &FilterParams) -> Result<Self, FilterError> {
        Ok(Self {
            start: parse_bound(params.start_date.as_deref(), Edge::Start)?,
            end: parse_bound(params.end_date.as_deref(), Edge::End)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

fn parse_bound(raw: Option<&str>, edge: Edge) -> Result<Option<NaiveDateTime>, FilterError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };

    for (fmt, has_seconds) in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            // an end bound covers its whole minute (or second)
            let dt = match edge {
                Edge::Start => dt,
                Edge::End if *has_seconds => last_milli(dt),
                Edge::End => dt.with_second(59).map(last_milli).unwrap_or(dt),
            };
            return Ok(Some(dt));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(raw, fmt) {
            // a bare end date covers the whole day
            let time = match edge {
                Edge::Start => NaiveTime::MIN,
                Edge::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
            };
            return Ok(Some(day.and_time(time)));
        }
    }

    Err(FilterError(raw.to_string()))
}

// stamps carry milliseconds; a widened end bound must include the whole second
fn last_milli(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(999_000_000).unwrap_or(dt)
}

// ==============================================================================
// shared view settings
// ==============================================================================
// process-wide, last writer wins. every client sees (and can change) the
// same sort order and filter.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewSettings {
    pub sort: SortOrder,
    pub filter: DateFilter,
}

pub type SharedView = Arc<RwLock<ViewSettings>>;

// ==============================================================================
// push channel events
// ==============================================================================
// frames look like {"event": "<name>", "data": <payload>}

/// latest readings as three parallel arrays
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    pub ids: Vec<i64>,
    pub values: Vec<f64>,
    /// ISO-8601 local time without offset
    pub dates: Vec<String>,
}

impl SensorUpdate {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// server -> client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "updateSensorData")]
    UpdateSensorData(SensorUpdate),
}

/// client -> server
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "changeSortOrder")]
    ChangeSortOrder(SortOrder),
    #[serde(rename = "applyFilter")]
    ApplyFilter(FilterParams),
}
