//! Shared fakes and fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use rotor::adapters::{ConfigSnapshot, EventsLog, GeoResolver, LogEntry, Metrics};
use rotor::domain::{EnrichedConnection, FuncLogEntry, FunctionConfig, Geo, MetricsMeta, RawMessage};
use rotor::functions::{
    FunctionContext, FunctionError, FunctionOutcome, FunctionResult, UserFunction,
};
use rotor::AnalyticsEvent;

/// Events log keeping entries in memory
#[derive(Default)]
pub struct MemoryEventsLog {
    pub entries: Mutex<Vec<LogEntry>>,
}

impl MemoryEventsLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventsLog for MemoryEventsLog {
    async fn append(&self, entry: LogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Geo resolver counting calls and returning a fixed answer
pub struct StubGeo {
    pub calls: AtomicUsize,
    pub answer: Option<Geo>,
    pub fail: bool,
}

impl StubGeo {
    pub fn returning(answer: Option<Geo>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer: None,
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoResolver for StubGeo {
    async fn resolve(&self, _ip: &str) -> Result<Option<Geo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("geo database unavailable");
        }
        Ok(self.answer.clone())
    }
}

/// Metrics sink recording every call
#[derive(Default)]
pub struct RecordingMetrics {
    pub calls: Mutex<Vec<(MetricsMeta, Vec<FuncLogEntry>)>>,
}

impl RecordingMetrics {
    pub fn calls(&self) -> Vec<(MetricsMeta, Vec<FuncLogEntry>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Metrics for RecordingMetrics {
    fn log_metrics(&self, meta: &MetricsMeta, exec_log: &[FuncLogEntry]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((meta.clone(), exec_log.to_vec()));
        Ok(())
    }
}

/// User function appending its name to the `trail` property and recording
/// the order of invocation in the workspace store
pub struct Tagger(pub &'static str);

#[async_trait]
impl UserFunction for Tagger {
    async fn exec(&self, mut event: AnalyticsEvent, ctx: FunctionContext) -> FunctionResult {
        let mut trail = event
            .get("trail")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        trail.push(json!(self.0));
        event.insert("trail", Value::Array(trail));

        ctx.store.set(&format!("seen:{}", self.0), json!(true), None).await?;
        Ok(FunctionOutcome::Event(event))
    }
}

/// User function that only succeeds if an earlier step wrote `key`
pub struct RequiresKey(pub &'static str);

#[async_trait]
impl UserFunction for RequiresKey {
    async fn exec(&self, event: AnalyticsEvent, ctx: FunctionContext) -> FunctionResult {
        match ctx.store.get(self.0).await? {
            Some(_) => Ok(FunctionOutcome::Event(event)),
            None => Err(FunctionError::Fatal(format!("missing {}", self.0))),
        }
    }
}

/// User function sleeping past any reasonable budget
pub struct Sleeper(pub Duration);

#[async_trait]
impl UserFunction for Sleeper {
    async fn exec(&self, event: AnalyticsEvent, _ctx: FunctionContext) -> FunctionResult {
        tokio::time::sleep(self.0).await;
        Ok(FunctionOutcome::Event(event))
    }
}

/// User function failing with the given error
pub struct Failing(pub FunctionError);

#[async_trait]
impl UserFunction for Failing {
    async fn exec(&self, _event: AnalyticsEvent, _ctx: FunctionContext) -> FunctionResult {
        Err(self.0.clone())
    }
}

pub struct Dropper;

#[async_trait]
impl UserFunction for Dropper {
    async fn exec(&self, _event: AnalyticsEvent, _ctx: FunctionContext) -> FunctionResult {
        Ok(FunctionOutcome::Drop)
    }
}

pub struct Panicker;

#[async_trait]
impl UserFunction for Panicker {
    async fn exec(&self, _event: AnalyticsEvent, _ctx: FunctionContext) -> FunctionResult {
        panic!("function bug");
    }
}

/// Connection `id` in workspace `ws` delivering to the log destination
pub fn connection(id: &str, ws: &str, functions: &[&str]) -> EnrichedConnection {
    let functions: Vec<Value> = functions
        .iter()
        .map(|f| json!({ "functionId": f }))
        .collect();

    serde_json::from_value(json!({
        "id": id,
        "workspaceId": ws,
        "streamId": format!("{}-stream", id),
        "destinationId": format!("{}-dest", id),
        "type": "log",
        "updatedAt": "2024-05-01T10:00:00Z",
        "credentials": { "apiKey": "secret" },
        "options": { "functions": functions }
    }))
    .unwrap()
}

/// Function definition for `udf.<id>`
pub fn function(ws: &str, id: &str) -> FunctionConfig {
    serde_json::from_value(json!({ "id": id, "workspaceId": ws, "name": id })).unwrap()
}

/// Snapshot with the given connections and user function definitions for
/// every `udf.` id they reference
pub fn snapshot(connections: Vec<EnrichedConnection>) -> ConfigSnapshot {
    let functions = connections
        .iter()
        .flat_map(|c| {
            c.options.functions.iter().filter_map(move |f| {
                f.function_id
                    .strip_prefix("udf.")
                    .map(|id| function(&c.workspace_id, id))
            })
        })
        .collect();
    ConfigSnapshot::new(connections, functions)
}

/// Ingest message routed to `connection_id` carrying `payload`
pub fn message(connection_id: &str, payload: Value) -> RawMessage {
    RawMessage::Structured(json!({
        "type": "track",
        "messageId": "msg-1",
        "connectionId": connection_id,
        "ingestType": "browser",
        "messageCreated": "2024-05-01T10:00:00Z",
        "writeKey": "wk",
        "origin": { "baseUrl": "https://in.example.com", "slug": "s", "domain": "example.com" },
        "httpPayload": payload,
        "httpHeaders": { "user-agent": "test" }
    }))
}

pub fn track_payload() -> Value {
    json!({
        "type": "track",
        "event": "signup",
        "messageId": "evt-1",
        "anonymousId": "anon-1",
        "context": {
            "ip": "10.1.2.3",
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/124.0.0.0 Safari/537.36"
        }
    })
}

pub fn geo_city(name: &str) -> Geo {
    serde_json::from_value(json!({ "city": { "name": name } })).unwrap()
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
