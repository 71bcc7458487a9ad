mod gate;

use daybook_core::{
    BlobStore, DaybookError, DaybookResult, NewNote, Note, NoteId, NotePage, NotePatch, NoteStore,
};
use gate::InitGate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const REST_PREFIX: &str = "/rest/v1";
const STORAGE_PREFIX: &str = "/storage/v1/object";
const PREFER_REPRESENTATION: &str = "return=representation";
const LIKE_CAS_ATTEMPTS: usize = 5;

/// Connection settings for the hosted data-and-blob service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub server: String,
    pub api_key: Option<String>,
    pub table: String,
    pub bucket: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
            api_key: None,
            table: "notes".to_string(),
            bucket: "images".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl Endpoint {
    fn new(config: &RemoteConfig) -> DaybookResult<Self> {
        let trimmed = config.server.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(DaybookError::usage("server URL cannot be empty"));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(format!("daybook/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| DaybookError::io(format!("failed to construct API client: {err}")))?;

        Ok(Self {
            base_url: trimmed,
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.api_key.as_deref() {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

/// Remote Store Adapter over the hosted PostgREST-style note table.
///
/// Every CRUD call requires a prior successful [`NoteStore::init`]; until
/// then they fail with a not-initialized connection error.
#[derive(Debug)]
pub struct RemoteNoteStore {
    endpoint: Endpoint,
    table: String,
    connect_timeout: Duration,
    gate: InitGate,
}

impl RemoteNoteStore {
    pub fn new(config: &RemoteConfig) -> DaybookResult<Self> {
        let table = config.table.trim();
        if table.is_empty() {
            return Err(DaybookError::usage("note table name cannot be empty"));
        }

        Ok(Self {
            endpoint: Endpoint::new(config)?,
            table: table.to_string(),
            connect_timeout: config.connect_timeout,
            gate: InitGate::new(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_ready()
    }

    fn table_path(&self) -> String {
        format!("{REST_PREFIX}/{}", self.table)
    }

    fn ensure_ready(&self) -> DaybookResult<()> {
        if self.gate.is_ready() {
            Ok(())
        } else {
            Err(DaybookError::not_initialized("remote note store"))
        }
    }

    fn probe(&self) -> DaybookResult<()> {
        let response = self
            .endpoint
            .request(Method::GET, &self.table_path())
            .query(&[("select", "id"), ("limit", "1")])
            .timeout(self.connect_timeout)
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_text = response.text().unwrap_or_default();
        let cause = parse_error_response(status, &body_text);
        Err(DaybookError::connection(format!(
            "backend rejected the connectivity probe: {}",
            cause.message
        )))
    }

    fn read_likecount(&self, id: i64) -> DaybookResult<Option<i64>> {
        #[derive(Deserialize)]
        struct LikeRow {
            likecount: Option<i64>,
        }

        let response = self
            .endpoint
            .request(Method::GET, &self.table_path())
            .query(&[("select", "likecount".to_string()), ("id", format!("eq.{id}"))])
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        let rows: Vec<LikeRow> = parse_json_response(response)?;
        rows.into_iter()
            .next()
            .map(|row| row.likecount)
            .ok_or_else(|| DaybookError::remote(format!("note {id} does not exist")))
    }
}

impl NoteStore for RemoteNoteStore {
    fn init(&self) -> DaybookResult<()> {
        self.gate.run(|| {
            debug!(server = %self.endpoint.base_url, "probing remote note store");
            self.probe()
        })
    }

    fn create(&self, note: &NewNote) -> DaybookResult<Note> {
        note.validate()?;
        self.ensure_ready()?;

        let response = self
            .endpoint
            .request(Method::POST, &self.table_path())
            .header("Prefer", PREFER_REPRESENTATION)
            .json(note)
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        let rows: Vec<Note> = parse_json_response(response)?;
        first_row(rows, "create")
    }

    fn range_query(&self, offset: usize, limit: usize) -> DaybookResult<NotePage> {
        if limit == 0 {
            return Err(DaybookError::usage("page size must be greater than zero"));
        }
        self.ensure_ready()?;

        let response = self
            .endpoint
            .request(Method::GET, &self.table_path())
            .query(&[
                ("select", "*".to_string()),
                ("order", "timestamp.desc".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        let rows: Vec<Note> = parse_json_response(response)?;
        debug!(offset, limit, rows = rows.len(), "fetched remote page");
        Ok(NotePage::from_rows(rows, limit))
    }

    fn update(&self, id: &NoteId, patch: &NotePatch) -> DaybookResult<Note> {
        let server_id = confirmed_id(id)?;
        if patch.is_empty() {
            return Err(DaybookError::usage("update requires at least one field"));
        }
        self.ensure_ready()?;

        let response = self
            .endpoint
            .request(Method::PATCH, &self.table_path())
            .query(&[("id", format!("eq.{server_id}"))])
            .header("Prefer", PREFER_REPRESENTATION)
            .json(patch)
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        let rows: Vec<Note> = parse_json_response(response)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DaybookError::remote(format!("note {server_id} does not exist")))
    }

    fn delete(&self, id: &NoteId) -> DaybookResult<()> {
        let Some(server_id) = id.as_server() else {
            return Ok(());
        };
        self.ensure_ready()?;

        let response = self
            .endpoint
            .request(Method::DELETE, &self.table_path())
            .query(&[("id", format!("eq.{server_id}"))])
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        parse_no_content_response(response)
    }

    fn clear(&self) -> DaybookResult<()> {
        self.ensure_ready()?;

        let response = self
            .endpoint
            .request(Method::DELETE, &self.table_path())
            .query(&[("id", "neq.0")])
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        parse_no_content_response(response)
    }

    fn toggle_like(&self, id: &NoteId, want_liked: bool) -> DaybookResult<Note> {
        let server_id = confirmed_id(id)?;
        self.ensure_ready()?;

        // Read-modify-write guarded by the value we read; an empty result
        // means another writer moved the counter in between.
        for attempt in 1..=LIKE_CAS_ATTEMPTS {
            let current = self.read_likecount(server_id)?;
            let base = current.unwrap_or(0).max(0);
            let next = if want_liked {
                base + 1
            } else {
                (base - 1).max(0)
            };
            let guard = match current {
                Some(value) => format!("eq.{value}"),
                None => "is.null".to_string(),
            };

            let response = self
                .endpoint
                .request(Method::PATCH, &self.table_path())
                .query(&[("id", format!("eq.{server_id}")), ("likecount", guard)])
                .header("Prefer", PREFER_REPRESENTATION)
                .json(&json!({ "likecount": next }))
                .send()
                .map_err(|err| network_error(err, self.connect_timeout))?;
            let rows: Vec<Note> = parse_json_response(response)?;
            if let Some(note) = rows.into_iter().next() {
                return Ok(note);
            }
            debug!(id = server_id, attempt, "like counter changed underneath; retrying");
        }

        Err(DaybookError::remote(format!(
            "like counter for note {server_id} kept changing; gave up after {LIKE_CAS_ATTEMPTS} attempts"
        )))
    }

    fn label(&self) -> &'static str {
        "remote"
    }
}

/// Public blob bucket next to the note table.
#[derive(Debug, Clone)]
pub struct RemoteBlobStore {
    endpoint: Endpoint,
    bucket: String,
    connect_timeout: Duration,
}

impl RemoteBlobStore {
    pub fn new(config: &RemoteConfig) -> DaybookResult<Self> {
        let bucket = config.bucket.trim();
        if bucket.is_empty() {
            return Err(DaybookError::usage("bucket name cannot be empty"));
        }

        Ok(Self {
            endpoint: Endpoint::new(config)?,
            bucket: bucket.to_string(),
            connect_timeout: config.connect_timeout,
        })
    }

    pub fn public_url(&self, filename: &str) -> String {
        format!(
            "{}{STORAGE_PREFIX}/public/{}/{filename}",
            self.endpoint.base_url, self.bucket
        )
    }
}

impl BlobStore for RemoteBlobStore {
    fn put(&self, filename: &str, content_type: &str, bytes: Vec<u8>) -> DaybookResult<String> {
        if filename.trim().is_empty() || filename.contains('/') {
            return Err(DaybookError::usage(format!(
                "'{filename}' is not a valid object name"
            )));
        }

        let response = self
            .endpoint
            .request(
                Method::POST,
                &format!("{STORAGE_PREFIX}/{}/{filename}", self.bucket),
            )
            .header("Content-Type", content_type)
            .header("Cache-Control", "3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .map_err(|err| network_error(err, self.connect_timeout))?;
        parse_no_content_response(response)?;

        debug!(filename, bucket = %self.bucket, "uploaded blob");
        Ok(self.public_url(filename))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<String>,
    code: Option<Value>,
    details: Option<String>,
    hint: Option<String>,
}

fn confirmed_id(id: &NoteId) -> DaybookResult<i64> {
    id.as_server().ok_or_else(|| {
        DaybookError::usage(format!(
            "note {id} has not been confirmed by the server yet"
        ))
    })
}

fn first_row(rows: Vec<Note>, action: &str) -> DaybookResult<Note> {
    rows.into_iter().next().ok_or_else(|| {
        DaybookError::remote(format!("{action} returned no representation"))
    })
}

fn parse_no_content_response(response: Response) -> DaybookResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body_text = response.text().unwrap_or_default();
    Err(parse_error_response(status, &body_text))
}

fn parse_json_response<T: DeserializeOwned>(response: Response) -> DaybookResult<T> {
    let status = response.status();
    let body_text = response.text().unwrap_or_default();

    if !status.is_success() {
        return Err(parse_error_response(status, &body_text));
    }

    serde_json::from_str::<T>(&body_text).map_err(|err| {
        DaybookError::remote(format!(
            "failed to map API response to expected shape: {err}"
        ))
    })
}

fn parse_error_response(status: StatusCode, body_text: &str) -> DaybookError {
    let body_trimmed = body_text.trim();
    let fallback = if body_trimmed.is_empty() {
        format!("request failed with status {}", status.as_u16())
    } else {
        format!(
            "request failed with status {}: {}",
            status.as_u16(),
            truncate_for_error(body_trimmed, 240)
        )
    };

    let parsed = serde_json::from_str::<ErrorEnvelope>(body_text).ok();
    let message = parsed
        .as_ref()
        .and_then(|payload| payload.message.clone().or_else(|| payload.error.clone()))
        .unwrap_or(fallback);

    let mut cause = message;
    if let Some(code) = parsed.as_ref().and_then(|payload| payload.code.as_ref()) {
        let code = match code {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        cause = format!("{cause} ({code})");
    }
    if let Some(details) = parsed.as_ref().and_then(|payload| payload.details.as_deref())
        && !details.trim().is_empty()
    {
        cause = format!("{cause}: {details}");
    }
    if let Some(hint) = parsed.as_ref().and_then(|payload| payload.hint.as_deref())
        && !hint.trim().is_empty()
    {
        cause = format!("{cause} (hint: {hint})");
    }

    DaybookError::remote(format!("{cause} [http_status={}]", status.as_u16()))
}

fn truncate_for_error(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn network_error(err: reqwest::Error, connect_timeout: Duration) -> DaybookError {
    if err.is_timeout() {
        DaybookError::timeout(format!(
            "request timed out (connect timeout {}s): {err}",
            connect_timeout.as_secs()
        ))
    } else {
        DaybookError::connection(format!("network request failed: {err}"))
    }
}
