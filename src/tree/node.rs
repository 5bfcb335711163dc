use crate::event::{Aspect, EventFilter, TraceEvent};
use crate::value::Value;
use crate::filter::coerce::{Coercer, PreparedValue, default_coercer};
use crate::filter::operator::{compare_text, compare_timestamp, compare_values, contains_text, matches_pattern, values_equal};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Kind tag of a [`FilterNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Root,
    And,
    Or,
    Equals,
    Contains,
    Matches,
    Compare,
    TraceTypeGate,
    NamedFilter,
    ObjectWrapper,
}

impl NodeKind {
    /// Most children a node of this kind may hold; `None` when unbounded.
    pub fn max_children(self) -> Option<usize> {
        match self {
            NodeKind::Root | NodeKind::And | NodeKind::Or => None,
            NodeKind::Equals | NodeKind::Contains | NodeKind::Matches | NodeKind::Compare => Some(0),
            NodeKind::TraceTypeGate | NodeKind::NamedFilter | NodeKind::ObjectWrapper => Some(1),
        }
    }

    /// Root and named filters never invert their result.
    pub fn supports_negate(self) -> bool {
        !matches!(self, NodeKind::Root | NodeKind::NamedFilter)
    }
}

/// Some(true) when any value of `aspect` passes `test`; `None` when it has none.
fn any_value(aspect: &Aspect, event: &TraceEvent, test: impl Fn(&Value) -> bool) -> Option<bool> {
    let values = aspect.resolve_all(event);
    if values.is_empty() {
        return None;
    }
    Some(values.iter().any(test))
}

/// How a [`CompareNode`] orders the resolved value against its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareType {
    /// Numeric, falling back to text order
    #[default]
    Num,
    Alpha,
    Timestamp,
}

#[derive(Debug, Clone)]
pub struct EqualsNode {
    aspect: Aspect,
    value: PreparedValue,
    ignore_case: bool,
    coercer: Coercer,
}

impl EqualsNode {
    pub fn new(aspect: Aspect, value: &str) -> Self {
        Self::with_coercer(aspect, value, default_coercer())
    }

    pub fn with_coercer(aspect: Aspect, value: &str, coercer: &Coercer) -> Self {
        Self {
            aspect,
            value: coercer.coerce(value, false),
            ignore_case: false,
            coercer: coercer.clone(),
        }
    }

    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    pub fn set_aspect(&mut self, aspect: Aspect) {
        self.aspect = aspect;
    }

    pub fn value(&self) -> &str {
        self.value.raw()
    }

    pub fn set_value(&mut self, value: &str, coercer: &Coercer) {
        self.value = coercer.coerce(value, false);
        self.coercer = coercer.clone();
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn set_ignore_case(&mut self, ignore_case: bool) {
        self.ignore_case = ignore_case;
    }

    fn evaluate(&self, event: &TraceEvent) -> Option<bool> {
        any_value(&self.aspect, event, |resolved| {
            values_equal(resolved, &self.value, self.ignore_case, &self.coercer)
        })
    }
}

#[derive(Debug, Clone)]
pub struct ContainsNode {
    aspect: Aspect,
    value: String,
    ignore_case: bool,
}

impl ContainsNode {
    pub fn new(aspect: Aspect, value: impl Into<String>) -> Self {
        Self {
            aspect,
            value: value.into(),
            ignore_case: false,
        }
    }

    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    pub fn set_aspect(&mut self, aspect: Aspect) {
        self.aspect = aspect;
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn set_ignore_case(&mut self, ignore_case: bool) {
        self.ignore_case = ignore_case;
    }

    fn evaluate(&self, event: &TraceEvent) -> Option<bool> {
        any_value(&self.aspect, event, |resolved| {
            contains_text(resolved, &self.value, self.ignore_case)
        })
    }
}

#[derive(Debug, Clone)]
pub struct MatchesNode {
    aspect: Aspect,
    pattern: PreparedValue,
    coercer: Coercer,
}

impl MatchesNode {
    /// Pattern that matches any resolved value.
    pub const ANY: &'static str = ".*";

    pub fn new(aspect: Aspect, pattern: &str) -> Self {
        Self::with_coercer(aspect, pattern, default_coercer())
    }

    pub fn with_coercer(aspect: Aspect, pattern: &str, coercer: &Coercer) -> Self {
        Self {
            aspect,
            pattern: coercer.coerce(pattern, true),
            coercer: coercer.clone(),
        }
    }

    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    pub fn set_aspect(&mut self, aspect: Aspect) {
        self.aspect = aspect;
    }

    pub fn pattern(&self) -> &str {
        self.pattern.raw()
    }

    pub fn set_pattern(&mut self, pattern: &str, coercer: &Coercer) {
        self.pattern = coercer.coerce(pattern, true);
        self.coercer = coercer.clone();
    }

    fn evaluate(&self, event: &TraceEvent) -> Option<bool> {
        any_value(&self.aspect, event, |resolved| {
            matches_pattern(resolved, &self.pattern, &self.coercer)
        })
    }
}

/// Orders the resolved value against a stored one and checks the sign.
#[derive(Debug, Clone)]
pub struct CompareNode {
    aspect: Aspect,
    value: PreparedValue,
    timestamp: Option<i64>,
    compare_type: CompareType,
    result: i8,
    coercer: Coercer,
}

impl CompareNode {
    /// `result` is the wanted sign of `resolved - value`: -1, 0 or 1.
    pub fn new(aspect: Aspect, value: &str, result: i8) -> Self {
        Self::with_coercer(aspect, value, result, default_coercer())
    }

    pub fn with_coercer(aspect: Aspect, value: &str, result: i8, coercer: &Coercer) -> Self {
        Self {
            aspect,
            value: coercer.coerce(value, false),
            timestamp: coercer.parse_timestamp(value),
            compare_type: CompareType::default(),
            result: result.signum(),
            coercer: coercer.clone(),
        }
    }

    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    pub fn set_aspect(&mut self, aspect: Aspect) {
        self.aspect = aspect;
    }

    pub fn value(&self) -> &str {
        self.value.raw()
    }

    pub fn set_value(&mut self, value: &str, coercer: &Coercer) {
        self.value = coercer.coerce(value, false);
        self.timestamp = coercer.parse_timestamp(value);
        self.coercer = coercer.clone();
    }

    pub fn compare_type(&self) -> CompareType {
        self.compare_type
    }

    pub fn set_compare_type(&mut self, compare_type: CompareType) {
        self.compare_type = compare_type;
    }

    pub fn result(&self) -> i8 {
        self.result
    }

    pub fn set_result(&mut self, result: i8) {
        self.result = result.signum();
    }

    fn symbol(&self) -> &'static str {
        match self.result {
            1 => ">",
            -1 => "<",
            _ => "==",
        }
    }

    fn ordering(&self, resolved: &Value) -> Option<Ordering> {
        match self.compare_type {
            CompareType::Num => compare_values(resolved, &self.value, &self.coercer),
            CompareType::Alpha => Some(compare_text(resolved, self.value.raw())),
            CompareType::Timestamp => compare_timestamp(resolved, self.timestamp?, &self.coercer),
        }
    }

    fn evaluate(&self, event: &TraceEvent) -> Option<bool> {
        let wanted = match self.result {
            1 => Ordering::Greater,
            -1 => Ordering::Less,
            _ => Ordering::Equal,
        };
        any_value(&self.aspect, event, |resolved| self.ordering(resolved) == Some(wanted))
    }
}

/// Admits only events of one trace type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceTypeNode {
    trace_type: String,
}

impl TraceTypeNode {
    pub fn new(trace_type: impl Into<String>) -> Self {
        Self {
            trace_type: trace_type.into(),
        }
    }

    pub fn trace_type(&self) -> &str {
        &self.trace_type
    }

    pub fn set_trace_type(&mut self, trace_type: impl Into<String>) {
        self.trace_type = trace_type.into();
    }

    fn admits(&self, event: &TraceEvent) -> bool {
        event.trace_type == self.trace_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedFilterNode {
    name: String,
}

impl NamedFilterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Wraps a predicate supplied from outside the tree.
#[derive(Clone, Default)]
pub struct ObjectNode {
    filter: Option<Arc<dyn EventFilter>>,
}

impl ObjectNode {
    pub fn new(filter: Arc<dyn EventFilter>) -> Self {
        Self {
            filter: Some(filter),
        }
    }

    /// A wrapper with no predicate of its own; it defers to its child.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> Option<&Arc<dyn EventFilter>> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<Arc<dyn EventFilter>>) {
        self.filter = filter;
    }
}

impl fmt::Debug for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectNode")
            .field("filter", &self.filter.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

/// Kind-specific payload of a filter-tree node.
///
/// Structure (children, parent) and the `negate` flag live in the
/// [`FilterTree`](super::FilterTree) that owns the node.
#[derive(Debug, Clone)]
pub enum FilterNode {
    Root,
    And,
    Or,
    Equals(EqualsNode),
    Contains(ContainsNode),
    Matches(MatchesNode),
    Compare(CompareNode),
    TraceTypeGate(TraceTypeNode),
    NamedFilter(NamedFilterNode),
    ObjectWrapper(ObjectNode),
}

impl FilterNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            FilterNode::Root => NodeKind::Root,
            FilterNode::And => NodeKind::And,
            FilterNode::Or => NodeKind::Or,
            FilterNode::Equals(_) => NodeKind::Equals,
            FilterNode::Contains(_) => NodeKind::Contains,
            FilterNode::Matches(_) => NodeKind::Matches,
            FilterNode::Compare(_) => NodeKind::Compare,
            FilterNode::TraceTypeGate(_) => NodeKind::TraceTypeGate,
            FilterNode::NamedFilter(_) => NodeKind::NamedFilter,
            FilterNode::ObjectWrapper(_) => NodeKind::ObjectWrapper,
        }
    }

    /// Aspect bound by a comparison leaf.
    pub fn aspect(&self) -> Option<&Aspect> {
        match self {
            FilterNode::Equals(n) => Some(n.aspect()),
            FilterNode::Contains(n) => Some(n.aspect()),
            FilterNode::Matches(n) => Some(n.aspect()),
            FilterNode::Compare(n) => Some(n.aspect()),
            _ => None,
        }
    }

    /// Stored comparison value of a leaf, as originally written.
    pub fn value(&self) -> Option<&str> {
        match self {
            FilterNode::Equals(n) => Some(n.value()),
            FilterNode::Contains(n) => Some(n.value()),
            FilterNode::Matches(n) => Some(n.pattern()),
            FilterNode::Compare(n) => Some(n.value()),
            _ => None,
        }
    }

    /// Replace a leaf's value, re-deriving its prepared form. Returns false for
    /// nodes that carry no value.
    pub fn set_value(&mut self, value: &str, coercer: &Coercer) -> bool {
        match self {
            FilterNode::Equals(n) => n.set_value(value, coercer),
            FilterNode::Contains(n) => n.set_value(value),
            FilterNode::Matches(n) => n.set_pattern(value, coercer),
            FilterNode::Compare(n) => n.set_value(value, coercer),
            _ => return false,
        }
        true
    }

    /// Outcome of a comparison leaf before negation; `None` when unresolved
    /// or when the node is not a leaf.
    pub(crate) fn evaluate_leaf(&self, event: &TraceEvent) -> Option<bool> {
        match self {
            FilterNode::Equals(n) => n.evaluate(event),
            FilterNode::Contains(n) => n.evaluate(event),
            FilterNode::Matches(n) => n.evaluate(event),
            FilterNode::Compare(n) => n.evaluate(event),
            _ => None,
        }
    }

    pub(crate) fn admits_trace_type(&self, event: &TraceEvent) -> bool {
        match self {
            FilterNode::TraceTypeGate(n) => n.admits(event),
            _ => true,
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let case = |ignore: bool| if ignore { " (ignore case)" } else { "" };
        match self {
            FilterNode::Root => f.write_str("Root"),
            FilterNode::And => f.write_str("And"),
            FilterNode::Or => f.write_str("Or"),
            FilterNode::Equals(n) => write!(
                f,
                "Equals [{}] == \"{}\"{}",
                n.aspect.name(),
                n.value(),
                case(n.ignore_case)
            ),
            FilterNode::Contains(n) => write!(
                f,
                "Contains [{}] contains \"{}\"{}",
                n.aspect.name(),
                n.value,
                case(n.ignore_case)
            ),
            FilterNode::Matches(n) => {
                write!(f, "Matches [{}] matches \"{}\"", n.aspect.name(), n.pattern())
            }
            FilterNode::Compare(n) => {
                write!(f, "Compare [{}] {} \"{}\"", n.aspect.name(), n.symbol(), n.value())?;
                if n.compare_type != CompareType::Num {
                    write!(f, " ({:?})", n.compare_type)?;
                }
                Ok(())
            }
            FilterNode::TraceTypeGate(n) => write!(f, "TraceType {}", n.trace_type),
            FilterNode::NamedFilter(n) => write!(f, "Filter \"{}\"", n.name),
            FilterNode::ObjectWrapper(n) => match n.filter {
                Some(_) => f.write_str("Object <predicate>"),
                None => f.write_str("Object"),
            },
        }
    }
}
