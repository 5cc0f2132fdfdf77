//! # Real-time Database Store
//!
//! REST client for the hosted real-time database.
//!
//! ## Protocol
//!
//! ```text
//! PUT    {database_url}/{collection}/{id}.json    overwrite one record
//! DELETE {database_url}/{collection}/{id}.json    remove one record
//! GET    {database_url}/{collection}.json         read the collection
//! GET    ... Accept: text/event-stream            live listener
//! ```
//!
//! The listener receives `put` / `patch` events carrying `{ path, data }`
//! relative to the collection. We keep a local JSON tree, apply every event
//! to it, and publish the whole tree as a snapshot. `keep-alive` is ignored;
//! `cancel` and `auth_revoked` end the subscription. Dropped connections are
//! re-established with capped exponential backoff, and the first `put` after
//! a reconnect replaces the tree.

use super::{CatalogStore, SnapshotResult, Subscription};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{ProductRecord, Snapshot};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Anonymous account exchange for the API key
const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";

pub struct RealtimeStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    auth: Option<String>,
}

impl RealtimeStore {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        collection: &str,
        auth: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
            auth,
        }
    }

    /// Build a client from configuration, signing in if asked to
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::new();

        let auth = match (&config.auth_token, &config.api_key) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(api_key)) if config.anonymous_auth => {
                Some(sign_in_anonymously(&client, api_key).await?)
            }
            (None, None) if config.anonymous_auth => {
                return Err(StoreError::Auth(
                    "anonymous sign-in requires an API key".to_string(),
                ));
            }
            _ => None,
        };

        tracing::debug!(
            database_url = %config.database_url,
            project_id = %config.project_id,
            authenticated = auth.is_some(),
            "Real-time store configured"
        );

        Ok(Self::new(
            client,
            &config.database_url,
            &config.collection,
            auth,
        ))
    }

    fn url(&self, id: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, self.collection);
        if let Some(id) = id {
            url.push('/');
            url.push_str(&urlencoding::encode(id));
        }
        url.push_str(".json");
        if let Some(token) = &self.auth {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl CatalogStore for RealtimeStore {
    async fn set(&self, id: &str, record: &ProductRecord) -> Result<(), StoreError> {
        let response = self.client.put(self.url(Some(id))).json(record).send().await?;
        check_status(response).await?;
        tracing::debug!(id = %id, "Record written");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.url(Some(id))).send().await?;
        check_status(response).await?;
        tracing::debug!(id = %id, "Record removed");
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let response = self.client.get(self.url(None)).send().await?;
        let value: Value = check_status(response).await?.json().await?;
        Ok(Snapshot::from_value(&value))
    }

    async fn subscribe(&self) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::channel::<SnapshotResult>(16);
        let task = tokio::spawn(listen(self.client.clone(), self.url(None), tx));
        Ok(Subscription::new(rx, task))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
}

async fn sign_in_anonymously(client: &reqwest::Client, api_key: &str) -> Result<String, StoreError> {
    let response = client
        .post(SIGN_UP_URL)
        .query(&[("key", api_key)])
        .json(&serde_json::json!({ "returnSecureToken": true }))
        .send()
        .await?;
    let body: SignUpResponse = check_status(response)
        .await
        .map_err(|e| StoreError::Auth(e.to_string()))?
        .json()
        .await?;

    tracing::info!("Signed in anonymously");
    Ok(body.id_token)
}

/// How one streaming connection ended
enum StreamEnd {
    /// Server closed the body; reconnect
    Disconnected,
    /// Subscriber dropped its handle
    ReceiverGone,
    /// Server ended the listener for good
    Terminal(StoreError),
}

async fn listen(client: reqwest::Client, url: String, tx: mpsc::Sender<SnapshotResult>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match stream_once(&client, &url, &tx, &mut backoff).await {
            Ok(StreamEnd::ReceiverGone) => return,
            Ok(StreamEnd::Terminal(err)) => {
                tracing::error!(error = %err, "Live listener ended by the store");
                let _ = tx.send(Err(err)).await;
                return;
            }
            Ok(StreamEnd::Disconnected) => {
                tracing::warn!(retry_in = ?backoff, "Live listener disconnected");
            }
            Err(err) => {
                tracing::warn!(error = %err, retry_in = ?backoff, "Live listener failed");
                if tx.send(Err(err)).await.is_err() {
                    return;
                }
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    tx: &mpsc::Sender<SnapshotResult>,
    backoff: &mut Duration,
) -> Result<StreamEnd, StoreError> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;
    let response = check_status(response).await?;
    *backoff = INITIAL_BACKOFF;

    let mut tree = Value::Null;
    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.push(&chunk) {
            match StreamEvent::parse(&event)? {
                StreamEvent::Put { path, data } => apply_put(&mut tree, &path, data),
                StreamEvent::Patch { path, data } => apply_patch(&mut tree, &path, data),
                StreamEvent::KeepAlive => continue,
                StreamEvent::Cancel(reason) => {
                    return Ok(StreamEnd::Terminal(StoreError::Cancelled(reason)))
                }
                StreamEvent::AuthRevoked(reason) => {
                    return Ok(StreamEnd::Terminal(StoreError::Auth(reason)))
                }
                StreamEvent::Unknown(name) => {
                    tracing::debug!(event = %name, "Ignoring unknown stream event");
                    continue;
                }
            }

            if tx.send(Ok(Snapshot::from_value(&tree))).await.is_err() {
                return Ok(StreamEnd::ReceiverGone);
            }
        }
    }

    Ok(StreamEnd::Disconnected)
}

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split anywhere
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    Cancel(String),
    AuthRevoked(String),
    Unknown(String),
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    #[serde(default)]
    data: Value,
}

impl StreamEvent {
    fn parse(event: &SseEvent) -> Result<Self, serde_json::Error> {
        let parsed = match event.event.as_str() {
            "put" | "patch" => {
                let body: PathData = serde_json::from_str(&event.data)?;
                if event.event == "put" {
                    Self::Put {
                        path: body.path,
                        data: body.data,
                    }
                } else {
                    Self::Patch {
                        path: body.path,
                        data: body.data,
                    }
                }
            }
            "keep-alive" => Self::KeepAlive,
            "cancel" => Self::Cancel(
                reason(&event.data).unwrap_or_else(|| "read access revoked".to_string()),
            ),
            "auth_revoked" => Self::AuthRevoked(
                reason(&event.data).unwrap_or_else(|| "credential expired".to_string()),
            ),
            other => Self::Unknown(other.to_string()),
        };
        Ok(parsed)
    }
}

fn reason(data: &str) -> Option<String> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(s)) => Some(s),
        Ok(Value::Null) => None,
        Ok(other) => Some(other.to_string()),
        Err(_) if !data.trim().is_empty() => Some(data.trim().to_string()),
        Err(_) => None,
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Replace the value at `path`; `null` deletes it
fn apply_put(root: &mut Value, path: &str, data: Value) {
    set_at(root, &segments(path), data);
}

/// Replace each child of `path` named in `data`, leaving siblings alone.
/// Keys may themselves be paths (`"1/products_price"`).
fn apply_patch(root: &mut Value, path: &str, data: Value) {
    let base = segments(path);
    if let Value::Object(children) = data {
        for (key, value) in children {
            let mut full = base.clone();
            full.extend(segments(&key));
            set_at(root, &full, value);
        }
    }
}

fn set_at(node: &mut Value, segs: &[&str], data: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = data;
        return;
    };

    if !node.is_object() {
        if node.is_null() && data.is_null() {
            return;
        }
        *node = into_object(node.take());
    }

    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        if is_empty(child) {
            map.remove(*head);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

fn into_object(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map),
        Value::Array(items) => Value::Object(
            items
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        ),
        _ => Value::Object(serde_json::Map::new()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
