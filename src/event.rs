use crate::config::RecordRules;
use crate::record::Record;
use crate::value::Value;

mod aspect;

pub use aspect::{
    Aspect, AspectRegistry, ContentsAspect, EventAspect, EventTypeAspect, FieldAspect,
    PayloadAspect, TimestampAspect, TraceTypeAspect, same_aspect,
};

/// A typed trace event, the target of filter trees.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Identifier of the trace type that produced the event (e.g. "lttng.kernel")
    pub trace_type: String,
    /// Name of the event type (e.g. "sched_switch")
    pub event_type: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    /// Event payload fields, in declaration order
    pub fields: Vec<(String, Value)>,
}

impl TraceEvent {
    pub fn new(trace_type: impl Into<String>, event_type: impl Into<String>, timestamp: i64) -> Self {
        Self {
            trace_type: trace_type.into(),
            event_type: event_type.into(),
            timestamp,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields.iter().filter(move |(n, _)| n == name).map(|(_, v)| v)
    }

    /// Render the payload as `name=value` pairs.
    pub fn contents(&self) -> String {
        self.fields
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Expose the event as a generic record: one entry per built-in aspect
    /// followed by every payload field.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with(TimestampAspect::NAME, Value::Timestamp(self.timestamp))
            .with(EventTypeAspect::NAME, self.event_type.as_str())
            .with(TraceTypeAspect::NAME, self.trace_type.as_str())
            .with(ContentsAspect::NAME, self.contents());
        for (name, value) in &self.fields {
            record.insert(name.as_str(), value.clone());
        }
        record
    }

    /// Build an event from a JSON object, filling the header from the keys named
    /// by `rules`. Every key also stays a payload field under its own name.
    pub fn from_json(value: &serde_json::Value, rules: &RecordRules) -> TraceEvent {
        let record = Record::from_json(value);
        let mut event = TraceEvent::new("", "", 0);
        for (name, value) in record.iter() {
            if name == rules.trace_type_field {
                event.trace_type = value.to_string();
            } else if name == rules.event_type_field {
                event.event_type = value.to_string();
            } else if name == rules.timestamp_field {
                event.timestamp = value.as_timestamp().unwrap_or_default();
            }
            event.fields.push((name.to_string(), value.clone()));
        }
        event
    }
}

/// Anything that can accept or reject a trace event.
pub trait EventFilter: Send + Sync {
    fn matches(&self, event: &TraceEvent) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&TraceEvent) -> bool + Send + Sync,
{
    fn matches(&self, event: &TraceEvent) -> bool {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_extracts_header_fields() {
        let rules = RecordRules::default();
        let event = TraceEvent::from_json(
            &json!({
                "trace_type": "lttng.kernel",
                "type": "sched_switch",
                "timestamp": "1970-01-01T00:00:01Z",
                "prev_tid": 42
            }),
            &rules,
        );
        assert_eq!(event.trace_type, "lttng.kernel");
        assert_eq!(event.event_type, "sched_switch");
        assert_eq!(event.timestamp, 1_000_000_000);
        assert_eq!(event.field("prev_tid"), Some(&Value::Integer(42)));
        // header keys stay addressable by their own names
        assert_eq!(event.field("type"), Some(&Value::from("sched_switch")));
        assert_eq!(event.to_record().get("type"), Some(&Value::from("sched_switch")));
    }

    #[test]
    fn test_to_record_exposes_aspects_and_fields() {
        let event = TraceEvent::new("ust", "type1", 5).with_field("afield", "v");
        let record = event.to_record();
        assert_eq!(record.get("Event type"), Some(&Value::from("type1")));
        assert_eq!(record.get("Contents"), Some(&Value::from("afield=v")));
        assert_eq!(record.get("afield"), Some(&Value::from("v")));
    }

    #[test]
    fn test_closures_are_event_filters() {
        let filter = |event: &TraceEvent| event.timestamp > 10;
        assert!(filter.matches(&TraceEvent::new("t", "e", 11)));
        assert!(!EventFilter::matches(&filter, &TraceEvent::new("t", "e", 1)));
    }
}
