use super::TraceEvent;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A named, read-only accessor resolving one value from a trace event.
pub trait EventAspect: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `None` when the event has nothing for this aspect.
    fn resolve(&self, event: &TraceEvent) -> Option<Value>;

    /// Every value the aspect has on `event`; leaves match when any of them does.
    fn resolve_all(&self, event: &TraceEvent) -> Vec<Value> {
        self.resolve(event).into_iter().collect()
    }
}

/// Aspects are stateless and shared between every node that binds them.
pub type Aspect = Arc<dyn EventAspect>;

/// Two bindings refer to the same aspect when their names agree.
pub fn same_aspect(a: &Aspect, b: &Aspect) -> bool {
    a.name() == b.name()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampAspect;

impl TimestampAspect {
    pub const NAME: &'static str = "Timestamp";
}

impl EventAspect for TimestampAspect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        Some(Value::Timestamp(event.timestamp))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventTypeAspect;

impl EventTypeAspect {
    pub const NAME: &'static str = "Event type";
}

impl EventAspect for EventTypeAspect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        Some(Value::String(event.event_type.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceTypeAspect;

impl TraceTypeAspect {
    pub const NAME: &'static str = "Trace type";
}

impl EventAspect for TraceTypeAspect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        Some(Value::String(event.trace_type.clone()))
    }
}

/// The whole payload rendered as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentsAspect;

impl ContentsAspect {
    pub const NAME: &'static str = "Contents";
}

impl EventAspect for ContentsAspect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        Some(Value::String(event.contents()))
    }
}

/// A single payload field looked up by name.
#[derive(Debug, Clone)]
pub struct FieldAspect {
    field: String,
}

impl FieldAspect {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl EventAspect for FieldAspect {
    fn name(&self) -> &str {
        &self.field
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        event.field(&self.field).cloned()
    }

    fn resolve_all(&self, event: &TraceEvent) -> Vec<Value> {
        event.fields_named(&self.field).cloned().collect()
    }
}

/// Each payload field value on its own, so wildcard searches see fields the
/// way generic records expose them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadAspect;

impl PayloadAspect {
    pub const NAME: &'static str = "Fields";
}

impl EventAspect for PayloadAspect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, event: &TraceEvent) -> Option<Value> {
        event.fields.first().map(|(_, value)| value.clone())
    }

    fn resolve_all(&self, event: &TraceEvent) -> Vec<Value> {
        event.fields.iter().map(|(_, value)| value.clone()).collect()
    }
}

/// The catalog of aspects available for a kind of trace.
///
/// Wildcard comparisons expand to one leaf per registered aspect; names that
/// are not registered bind to a [`FieldAspect`].
#[derive(Debug, Clone)]
pub struct AspectRegistry {
    aspects: Vec<Aspect>,
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AspectRegistry {
    pub fn empty() -> Self {
        Self {
            aspects: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        Self {
            aspects: vec![
                Arc::new(TimestampAspect),
                Arc::new(EventTypeAspect),
                Arc::new(ContentsAspect),
                Arc::new(TraceTypeAspect),
                Arc::new(PayloadAspect),
            ],
        }
    }

    pub fn with_aspect(mut self, aspect: Aspect) -> Self {
        self.register(aspect);
        self
    }

    pub fn with_field(self, field: impl Into<String>) -> Self {
        self.with_aspect(Arc::new(FieldAspect::new(field)))
    }

    /// Add an aspect, replacing any existing aspect of the same name.
    pub fn register(&mut self, aspect: Aspect) {
        if let Some(slot) = self.aspects.iter_mut().find(|a| same_aspect(a, &aspect)) {
            *slot = aspect;
        } else {
            self.aspects.push(aspect);
        }
    }

    pub fn aspects(&self) -> &[Aspect] {
        &self.aspects
    }

    pub fn find(&self, name: &str) -> Option<Aspect> {
        self.aspects.iter().find(|a| a.name() == name).cloned()
    }

    /// Registered aspect for `name`, or a payload-field accessor.
    pub fn resolve_or_field(&self, name: &str) -> Aspect {
        self.find(name)
            .unwrap_or_else(|| Arc::new(FieldAspect::new(name)))
    }
}
