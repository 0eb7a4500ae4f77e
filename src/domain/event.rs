//! Analytics event payload.
//!
//! The payload shape is not statically guaranteed. Events wrap the raw JSON
//! object and the well-known fields are read through lenient accessors, so
//! a field of an unexpected shape never rejects the payload. Everything is
//! written back untouched.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// User event as sent by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalyticsEvent(Map<String, Value>);

impl AnalyticsEvent {
    /// Parse a payload into an event. Only a non-object payload is rejected.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn event_type(&self) -> Option<String> {
        self.id_field("type")
    }

    /// Name of a `track` event
    pub fn event_name(&self) -> Option<String> {
        self.id_field("event")
    }

    pub fn message_id(&self) -> Option<String> {
        self.id_field("messageId")
    }

    pub fn user_id(&self) -> Option<String> {
        self.id_field("userId")
    }

    pub fn anonymous_id(&self) -> Option<String> {
        self.id_field("anonymousId")
    }

    pub fn set_user_id(&mut self, user_id: &str) {
        self.0.insert("userId".into(), Value::String(user_id.to_string()));
    }

    /// Identifier-like field: non-empty strings and numbers are accepted
    fn id_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The `context` sub-object, if present and an object
    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.0.get("context").and_then(Value::as_object)
    }

    /// The `context` sub-object, created empty if missing.
    ///
    /// A `context` that is not an object is replaced.
    pub fn context_mut(&mut self) -> &mut Map<String, Value> {
        let context = self
            .0
            .entry("context")
            .or_insert_with(|| Value::Object(Map::new()));
        if !context.is_object() {
            *context = Value::Object(Map::new());
        }
        match context {
            Value::Object(map) => map,
            _ => unreachable!("context was just made an object"),
        }
    }

    pub fn ip(&self) -> Option<&str> {
        self.context_str("ip")
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.context_str("userAgent")
    }

    fn context_str(&self, key: &str) -> Option<&str> {
        self.context()?.get(key)?.as_str().filter(|s| !s.trim().is_empty())
    }

    /// Client-supplied geography, whatever its shape
    pub fn geo(&self) -> Option<Geo> {
        self.context()?.get("geo").cloned().map(Geo::from)
    }

    /// Replace `context.geo`; `None` removes it
    pub fn set_geo(&mut self, geo: Option<Geo>) {
        let context = self.context_mut();
        match geo {
            Some(geo) => {
                context.insert("geo".into(), geo.into_value());
            }
            None => {
                context.remove("geo");
            }
        }
    }

    pub fn traits(&self) -> Option<&Value> {
        self.context()?.get("traits").filter(|t| !t.is_null())
    }

    pub fn set_traits(&mut self, traits: Value) {
        self.context_mut().insert("traits".into(), traits);
    }
}

impl Index<&str> for AnalyticsEvent {
    type Output = Value;

    /// Missing keys read as `null`, like indexing a `Value`
    fn index(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&NULL)
    }
}

impl From<Map<String, Value>> for AnalyticsEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Geographic data, either supplied by the client or resolved from the IP.
///
/// Kept as raw JSON: client geography is trusted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Geo(Value);

impl Geo {
    /// True when the value has no keys: `null`, scalars other than strings,
    /// and empty objects, arrays or strings
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Geo {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive() {
        let payload = json!({
            "type": "track",
            "event": "signup",
            "properties": { "plan": "pro" },
            "context": { "ip": "10.0.0.1", "locale": "en-US" }
        });

        let event = AnalyticsEvent::from_value(payload.clone()).unwrap();
        assert_eq!(event.event_name().as_deref(), Some("signup"));
        assert_eq!(event.ip(), Some("10.0.0.1"));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_loose_field_shapes_are_accepted() {
        let payload = json!({
            "userId": 42,
            "anonymousId": ["not", "an", "id"],
            "context": {
                "ip": 12345,
                "traits": "vip",
                "geo": { "country": "US", "location": { "timezone": "Europe/Berlin" } }
            }
        });

        let event = AnalyticsEvent::from_value(payload.clone()).unwrap();
        assert_eq!(event.user_id().as_deref(), Some("42"));
        assert!(event.anonymous_id().is_none());
        assert!(event.ip().is_none());
        assert_eq!(event.traits(), Some(&json!("vip")));
        assert_eq!(event.geo().unwrap().get("country"), Some(&json!("US")));
        assert_eq!(serde_json::to_value(&event).unwrap(), payload);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(AnalyticsEvent::from_value(json!("track")).is_err());
        assert!(AnalyticsEvent::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_geo_emptiness() {
        assert!(Geo::default().is_empty());
        assert!(Geo::from(json!({})).is_empty());
        assert!(Geo::from(json!(7)).is_empty());

        assert!(!Geo::from(json!({ "country": "US" })).is_empty());
        assert!(!Geo::from(json!({ "provider": { "as": 1 } })).is_empty());
        assert!(!Geo::from(json!("DE")).is_empty());
    }

    #[test]
    fn test_context_mut_creates_context() {
        let mut event = AnalyticsEvent::default();
        assert!(event.context().is_none());
        event.context_mut().insert("ip".into(), json!("1.2.3.4"));
        assert_eq!(event.ip(), Some("1.2.3.4"));

        let mut broken = AnalyticsEvent::from_value(json!({ "context": "oops" })).unwrap();
        broken.set_geo(Some(Geo::from(json!({ "city": "Berlin" }))));
        assert_eq!(broken["context"]["geo"]["city"], json!("Berlin"));
    }

    #[test]
    fn test_missing_key_indexes_as_null() {
        let event = AnalyticsEvent::default();
        assert!(event["nothing"].is_null());
    }
}
