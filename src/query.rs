//! Query Service: answers `history/get_values` historical range requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, RequestError};
use crate::ids::ChannelId;
use crate::registry::Registry;
use crate::store::Store;

/// Everything `handle_get_values` can fail with: a bad request (returned to
/// the caller as-is) or a Store failure (the connection/process is in
/// trouble, not just this one request).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Store(#[from] EngineError),
}

fn default_neg_one() -> i64 {
    -1
}

/// Unix seconds, matches `timestamp.gt`'s default lower bound.
fn default_timestamp_gt() -> f64 {
    0.0
}

/// Unix seconds; the largest value `julianday()` round-trips cleanly, used
/// as `timestamp.lt`'s default upper bound.
fn default_timestamp_lt() -> f64 {
    10_675_199_167.0
}

/// One `[device, control]` pair from the request's `channels` array.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelSpec(pub String, pub String);

impl TryFrom<&serde_json::Value> for ChannelSpec {
    type Error = RequestError;

    /// `channels` items arrive as raw JSON rather than through `#[derive]`
    /// so a wrong-shaped item (not a two-element array, or elements that
    /// aren't strings) produces `BadChannelItem` instead of failing the
    /// whole request's deserialization with an unrelated serde error.
    fn try_from(value: &serde_json::Value) -> Result<Self, RequestError> {
        let pair = value.as_array().ok_or(RequestError::BadChannelItem)?;
        let [device, control] = pair.as_slice() else {
            return Err(RequestError::BadChannelItem);
        };
        let device = device.as_str().ok_or(RequestError::BadChannelItem)?;
        let control = control.as_str().ok_or(RequestError::BadChannelItem)?;
        if device.is_empty() || control.is_empty() {
            return Err(RequestError::BadChannelItem);
        }
        Ok(ChannelSpec(device.to_string(), control.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimestampFilter {
    #[serde(default = "default_timestamp_gt")]
    pub gt: f64,
    #[serde(default = "default_timestamp_lt")]
    pub lt: f64,
}

impl Default for TimestampFilter {
    fn default() -> Self {
        Self {
            gt: default_timestamp_gt(),
            lt: default_timestamp_lt(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UidFilter {
    #[serde(default = "default_neg_one")]
    pub gt: i64,
}

impl Default for UidFilter {
    fn default() -> Self {
        Self { gt: default_neg_one() }
    }
}

/// Raw `history/get_values` request, as received from the RPC transport.
#[derive(Debug, Clone, Deserialize)]
pub struct GetValuesRequest {
    #[serde(default)]
    pub ver: u32,
    #[serde(default)]
    pub channels: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: TimestampFilter,
    #[serde(default)]
    pub uid: UidFilter,
    #[serde(default = "default_neg_one")]
    pub limit: i64,
    /// Down-sampling bucket width, in milliseconds. `0` disables it.
    #[serde(default)]
    pub min_interval: i64,
}

/// One row in the `ver = 0` response shape: self-describing, device/control
/// named explicitly.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowV0 {
    pub uid: i64,
    pub device: String,
    pub control: String,
    pub value: String,
    pub timestamp: f64,
}

/// One row in the `ver = 1` response shape: `c` is the channel's index into
/// the request's `channels` array, trading self-description for a smaller
/// payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowV1 {
    pub i: i64,
    pub c: usize,
    pub v: String,
    pub t: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Rows {
    V0(Vec<RowV0>),
    V1(Vec<RowV1>),
}

#[derive(Debug, Clone, Serialize)]
pub struct GetValuesResponse {
    pub values: Rows,
    /// Present and `true` only when the request's `limit` actually cut the
    /// result short; omitted from the wire response otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Validate a raw request's `ver` and `channels` shape, returning the parsed
/// channel specs.
fn validate(request: &GetValuesRequest) -> Result<Vec<ChannelSpec>, RequestError> {
    if request.ver > 1 {
        return Err(RequestError::UnsupportedVersion);
    }
    if request.channels.is_empty() {
        return Err(RequestError::NoChannels);
    }
    request.channels.iter().map(ChannelSpec::try_from).collect()
}

/// Run a validated `history/get_values` request against the store.
///
/// Channels are resolved through the Registry, which creates a device/
/// channel row on first sighting exactly like the ingestion path does — a
/// query for a channel that has never received data still gets a stable id
/// and, correctly, an empty result rather than an error.
///
/// Fetches `limit + 1` rows (when `limit >= 0`) so the extra row, if
/// present, signals `has_more` without a second round trip; it is trimmed
/// before the rows are returned.
pub fn handle_get_values(
    store: &Store,
    registry: &mut Registry,
    request: &GetValuesRequest,
) -> Result<GetValuesResponse, QueryError> {
    let channels = validate(request)?;

    let mut channel_ids: Vec<ChannelId> = Vec::with_capacity(channels.len());
    for ChannelSpec(device, control) in &channels {
        let id = registry.resolve_channel(store, device, control)?;
        channel_ids.push(id);
    }

    let fetch_limit = if request.limit >= 0 { Some(request.limit + 1) } else { None };

    let mut rows = store.query_values(
        &channel_ids,
        request.timestamp.gt,
        request.timestamp.lt,
        request.uid.gt,
        request.min_interval,
        fetch_limit,
    )?;

    let has_more = if let Some(limit) = fetch_limit {
        if rows.len() as i64 >= limit {
            rows.truncate((limit - 1).max(0) as usize);
            Some(true)
        } else {
            None
        }
    } else {
        None
    };

    let values = if request.ver == 0 {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let idx = channel_ids.iter().position(|c| *c == row.channel).unwrap();
            let ChannelSpec(device, control) = &channels[idx];
            out.push(RowV0 {
                uid: row.uid,
                device: device.clone(),
                control: control.clone(),
                value: row.value,
                timestamp: row.timestamp,
            });
        }
        Rows::V0(out)
    } else {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let idx = channel_ids.iter().position(|c| *c == row.channel).unwrap();
            out.push(RowV1 {
                i: row.uid,
                c: idx,
                v: row.value,
                t: row.timestamp,
            });
        }
        Rows::V1(out)
    };

    Ok(GetValuesResponse { values, has_more })
}
