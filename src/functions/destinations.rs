//! Built-in destination functions.

use async_trait::async_trait;
use serde_json::Value;

use super::{BuiltinContext, BuiltinFunction, FunctionError, FunctionOutcome, FunctionResult};
use crate::adapters::{LogEntry, LogLevel};
use crate::domain::AnalyticsEvent;

/// Delivers events into the durable event log and counts deliveries in the
/// workspace store.
pub struct LogDestination;

#[async_trait]
impl BuiltinFunction for LogDestination {
    async fn exec(&self, event: AnalyticsEvent, ctx: BuiltinContext) -> FunctionResult {
        let meta = &ctx.system.metrics_meta;
        let payload = serde_json::to_value(&event)
            .map_err(|e| FunctionError::Fatal(format!("Event is not serializable: {}", e)))?;

        let entry = LogEntry::new(&meta.connection_id, LogLevel::Info, "event delivered")
            .with_function("builtin.destination.log")
            .with_message_id(&meta.message_id)
            .with_data(payload);
        ctx.system
            .events_store
            .append(entry)
            .await
            .map_err(|e| FunctionError::Retryable(format!("Failed to write event: {:#}", e)))?;

        ctx.function
            .store
            .incr(&format!("delivered:{}", meta.connection_id), 1)
            .await?;

        Ok(FunctionOutcome::Event(event))
    }
}

/// Builder errors (bad header names or values) are fatal, transport errors
/// retryable
fn classify_send_error(e: reqwest::Error) -> FunctionError {
    if e.is_builder() {
        FunctionError::Fatal(format!("Invalid webhook request: {}", e))
    } else {
        FunctionError::Retryable(format!("Webhook request failed: {}", e))
    }
}

/// POSTs each event as JSON to `props.url`
pub struct WebhookDestination {
    client: reqwest::Client,
}

impl Default for WebhookDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDestination {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BuiltinFunction for WebhookDestination {
    async fn exec(&self, event: AnalyticsEvent, ctx: BuiltinContext) -> FunctionResult {
        let url = ctx
            .props
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| FunctionError::Fatal("Webhook destination has no url".to_string()))?;
        let url = reqwest::Url::parse(url)
            .map_err(|e| FunctionError::Fatal(format!("Invalid webhook url {}: {}", url, e)))?;

        let mut request = self
            .client
            .post(url.clone())
            .timeout(ctx.function.fetch_timeout)
            .json(&event);

        if let Some(headers) = ctx.props.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FunctionError::Retryable(format!(
                "Webhook responded with {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FunctionError::Fatal(format!(
                "Webhook responded with {}: {}",
                status,
                body.trim()
            )));
        }

        ctx.function
            .log
            .info(format!("Delivered to {} ({})", url, status))
            .await;

        Ok(FunctionOutcome::Event(event))
    }
}
