/// Transport client for the station telemetry servers.
///
/// Every server exposes the same small REST surface: a page name plus GET
/// parameters, answered with a JSON array. This module builds those URLs,
/// performs the request with a short timeout and classifies failures.
///
/// Callers go through [`JsonSource::fetch`], which never fails: a timeout,
/// refused connection, bad status or non-JSON body is logged and turned into
/// an empty batch ("no data this round").

use std::sync::{mpsc, Arc};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use threadpool::ThreadPool;
use tracing::{debug, warn};

use crate::error::{ClientBuildError, FetchError};
use crate::logging;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// A single GET parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    /// Serialized as a comma-joined list.
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Scalar(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Scalar(v.to_string())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::List(v)
    }
}

impl From<&[String]> for ParamValue {
    fn from(v: &[String]) -> Self {
        ParamValue::List(v.to_vec())
    }
}

/// Ordered GET parameters. Order is insertion order so that the same query
/// always produces the same URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, ParamValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.pairs.push((key.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `k1=v1&k2=v2,v3`
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    ParamValue::Scalar(v) => urlencoding::encode(v).into_owned(),
                    ParamValue::List(items) => items
                        .iter()
                        .map(|v| urlencoding::encode(v).into_owned())
                        .collect::<Vec<_>>()
                        .join(","),
                };
                format!("{}={}", urlencoding::encode(key), value)
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Builds `{base_url}/{page}?{params}`. The `?` is left out when there are
/// no parameters.
pub fn build_url(base_url: &str, page: &str, params: &QueryParams) -> String {
    let base = base_url.trim_end_matches('/');
    let page = page.trim_start_matches('/');
    if params.is_empty() {
        format!("{}/{}", base, page)
    } else {
        format!("{}/{}?{}", base, page, params.to_query_string())
    }
}

// ---------------------------------------------------------------------------
// Source capability
// ---------------------------------------------------------------------------

/// Anything that can answer a URL with a JSON array.
///
/// `HttpSource` is the production implementation; tests script responses.
pub trait JsonSource: Send + Sync {
    /// Performs one request. Errors are classified but not logged.
    fn get_json(&self, url: &str) -> Result<Vec<Value>, FetchError>;

    /// Fail-soft query: builds the URL, logs it, and returns an empty batch
    /// on any failure.
    fn fetch(&self, base_url: &str, page: &str, params: &QueryParams) -> Vec<Value> {
        let url = build_url(base_url, page, params);
        debug!(url = %url, "fetching");
        match self.get_json(&url) {
            Ok(rows) => rows,
            Err(e) => {
                logging::log_fetch_failure(&url, &e);
                Vec::new()
            }
        }
    }
}

/// Blocking HTTP implementation with a per-request timeout.
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, ClientBuildError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl JsonSource for HttpSource {
    fn get_json(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        let body = response.text().map_err(classify_reqwest_error)?;
        parse_json_array(&body)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}

/// Parses a response body that must be a JSON array.
pub fn parse_json_array(body: &str) -> Result<Vec<Value>, FetchError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(FetchError::Decode(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(FetchError::Decode(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decodes rows into typed payloads, skipping (and logging) rows that do not
/// match. One bad row never discards the rest of the batch.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, page: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(page, error = %e, "skipping undecodable row");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Runs `f` over `jobs` on the pool and returns the results in job order,
/// whatever order they completed in. A job that panics yields
/// `R::default()`.
pub fn gather<J, R, F>(pool: &ThreadPool, jobs: Vec<J>, f: F) -> Vec<R>
where
    J: Send + 'static,
    R: Send + Default + 'static,
    F: Fn(J) -> R + Send + Sync + 'static,
{
    let count = jobs.len();
    let f = Arc::new(f);
    let (tx, rx) = mpsc::channel();

    for (i, job) in jobs.into_iter().enumerate() {
        let tx = tx.clone();
        let f = Arc::clone(&f);
        pool.execute(move || {
            let _ = tx.send((i, f(job)));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<R>> = (0..count).map(|_| None).collect();
    for (i, result) in rx {
        slots[i] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                warn!(job = i, "worker job produced no result");
                R::default()
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
