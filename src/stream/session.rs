//! Per-connection tumbling-window query state.
//!
//! A session owns the window boundary of one stream. The first query covers
//! `[params.since, open)` (default: the last hour). Every later poll covers
//! `[previous end, now)` and moves the boundary forward, so windows never
//! overlap and a record is pushed at most once. A record that becomes
//! visible after its window has closed is never pushed.
//!
//! Sessions are synchronous and take `now` explicitly; the connection loop
//! supplies the clock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::storage::{QueryParams, Storage, StorageError};
use crate::stream::envelope::{Envelope, StreamKind};

pub struct StreamSession {
    kind: StreamKind,
    params: QueryParams,
    store: Arc<dyn Storage>,
    /// End of the last successfully queried window. `None` until the
    /// initial query succeeds.
    window_end: Option<DateTime<Utc>>,
}

impl StreamSession {
    pub fn new(kind: StreamKind, params: QueryParams, store: Arc<dyn Storage>) -> Self {
        Self {
            kind,
            params,
            store,
            window_end: None,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_end
    }

    /// Run the initial query anchored at `now`.
    ///
    /// Returns an `initial` batch, an error envelope, or `None` when the
    /// window is empty.
    pub fn open(&mut self, now: DateTime<Utc>) -> Option<Envelope> {
        let since = self.params.since.unwrap_or(now - Duration::hours(1));
        self.run_window(since, now, true)
    }

    /// Query the window since the last boundary and advance it to `now`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<Envelope> {
        let Some(since) = self.window_end else {
            // The initial query failed; retry it.
            return self.open(now);
        };
        if now <= since {
            return None;
        }
        self.run_window(since, now, false)
    }

    fn run_window(&mut self, since: DateTime<Utc>, until: DateTime<Utc>, initial: bool) -> Option<Envelope> {
        match self.fetch(since, until) {
            Ok(payload) => {
                self.window_end = Some(until);
                let empty = payload.as_array().map_or(true, Vec::is_empty);
                (!empty).then(|| Envelope::batch(self.kind, payload, initial))
            }
            Err(e) => {
                tracing::warn!(stream = %self.kind, error = %e, "Stream query failed");
                Some(Envelope::error(e.to_string()))
            }
        }
    }

    /// Collect every record in `[since, until)`, paging through the store.
    fn fetch(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Value, StorageError> {
        let mut params = self.params.clone();
        params.since = Some(since);
        params.until = Some(until);

        let payload = match self.kind {
            StreamKind::Logs => {
                let logs = drain(params, |p| Ok(self.store.query_logs(p)?.logs), |l| l.id.as_str())?;
                serde_json::to_value(logs)?
            }
            StreamKind::Metrics => {
                let metrics = drain(params, |p| self.store.query_metrics(p), |m| m.id.as_str())?;
                serde_json::to_value(metrics)?
            }
            StreamKind::Traces => {
                let traces = drain(params, |p| self.store.query_traces(p), |t| t.trace_id.as_str())?;
                serde_json::to_value(traces)?
            }
        };
        Ok(payload)
    }
}

/// Page through `query` until an empty page.
///
/// A write landing inside the window between two page calls shifts later
/// pages, so records are kept once by `key`.
fn drain<T, Q, K>(mut params: QueryParams, mut query: Q, key: K) -> Result<Vec<T>, StorageError>
where
    Q: FnMut(&QueryParams) -> Result<Vec<T>, StorageError>,
    K: Fn(&T) -> &str,
{
    params.offset = 0;
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    loop {
        let page = query(&params)?;
        if page.is_empty() {
            break;
        }
        params.offset += page.len();
        for record in page {
            if seen.insert(key(&record).to_string()) {
                records.push(record);
            }
        }
    }
    Ok(records)
}
