use super::coerce::{Coercer, default_coercer};
use super::compiler::{CompiledComparison, CompiledExpression, CompiledFilter, Connective};
use super::operator::Comparator;
use crate::config::MatchRules;
use crate::event::{EventFilter, TraceEvent};
use crate::record::{DERIVED_PREFIX, Record};

/// Knobs applied to every comparison of a generated predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateOptions {
    pub ignore_case: bool,
    pub derived_prefix: String,
}

impl Default for PredicateOptions {
    fn default() -> Self {
        Self {
            ignore_case: false,
            derived_prefix: DERIVED_PREFIX.to_string(),
        }
    }
}

impl From<&MatchRules> for PredicateOptions {
    fn from(rules: &MatchRules) -> Self {
        Self {
            ignore_case: rules.ignore_case,
            derived_prefix: rules.derived_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct ComparisonPredicate {
    field: String,
    comparator: Comparator,
}

impl ComparisonPredicate {
    fn new(comparison: &CompiledComparison, coercer: &Coercer, options: &PredicateOptions) -> Self {
        Self {
            field: comparison.field().to_string(),
            comparator: Comparator::new(
                comparison.operator(),
                comparison.raw_value(),
                coercer,
                options.ignore_case,
                comparison.is_negated(),
            ),
        }
    }

    /// Any resolved value may satisfy the comparison; negation is applied to
    /// that outcome, not per value.
    fn test(&self, record: &Record, derived_prefix: &str) -> bool {
        self.comparator.test_any(record.values_for(&self.field, derived_prefix))
    }
}

#[derive(Debug, Clone)]
struct ExpressionPredicate {
    left: ComparisonPredicate,
    right: Option<(Connective, ComparisonPredicate)>,
    negate: bool,
}

impl ExpressionPredicate {
    fn new(expression: &CompiledExpression, coercer: &Coercer, options: &PredicateOptions) -> Self {
        let right = expression
            .connective()
            .zip(expression.right())
            .map(|(connective, right)| (connective, ComparisonPredicate::new(right, coercer, options)));
        Self {
            left: ComparisonPredicate::new(expression.left(), coercer, options),
            right,
            negate: expression.is_negated(),
        }
    }

    fn test(&self, record: &Record, derived_prefix: &str) -> bool {
        let left = self.left.test(record, derived_prefix);
        let result = match &self.right {
            None => left,
            Some((Connective::And, right)) => left && right.test(record, derived_prefix),
            Some((Connective::Or, right)) => left || right.test(record, derived_prefix),
        };
        result ^ self.negate
    }
}

/// A reusable, thread-safe boolean test over [`Record`]s.
///
/// Built once from a [`CompiledFilter`]; values are coerced at build time so
/// evaluation never parses the filter again.
#[derive(Debug, Clone)]
pub struct RecordPredicate {
    expressions: Vec<ExpressionPredicate>,
    negate: bool,
    derived_prefix: String,
}

impl RecordPredicate {
    /// A predicate that accepts every record.
    pub fn accept_all() -> Self {
        Self {
            expressions: Vec::new(),
            negate: false,
            derived_prefix: DERIVED_PREFIX.to_string(),
        }
    }

    /// Predicate for `filter`, or one accepting everything when there is none.
    pub fn from_optional(filter: Option<&CompiledFilter>) -> Self {
        filter.map(generate).unwrap_or_else(Self::accept_all)
    }

    pub fn test(&self, record: &Record) -> bool {
        let all = self
            .expressions
            .iter()
            .all(|expression| expression.test(record, &self.derived_prefix));
        all ^ self.negate
    }

    /// Number of top-level expressions, all of which must hold.
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

impl EventFilter for RecordPredicate {
    fn matches(&self, event: &TraceEvent) -> bool {
        self.test(&event.to_record())
    }
}

/// Generate a record predicate with the default coercer and options.
pub fn generate(filter: &CompiledFilter) -> RecordPredicate {
    generate_with(filter, default_coercer(), &PredicateOptions::default())
}

pub fn generate_with(filter: &CompiledFilter, coercer: &Coercer, options: &PredicateOptions) -> RecordPredicate {
    RecordPredicate {
        expressions: filter
            .expressions()
            .iter()
            .map(|expression| ExpressionPredicate::new(expression, coercer, options))
            .collect(),
        negate: filter.is_negated(),
        derived_prefix: options.derived_prefix.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compiler::compile_str;
    use crate::filter::operator::OperatorKind;

    fn predicate(text: &str) -> RecordPredicate {
        generate(&compile_str(text).expect("filter compiles"))
    }

    #[test]
    fn test_accept_all() {
        let predicate = RecordPredicate::accept_all();
        assert!(predicate.is_empty());
        assert!(predicate.test(&Record::new()));
        assert!(RecordPredicate::from_optional(None).test(&Record::new().with("a", 1)));
    }

    #[test]
    fn test_equals_and_not_equals() {
        let record = Record::new().with("type", "foo");
        assert!(predicate("type == foo").test(&record));
        assert!(!predicate("type != foo").test(&record));
        assert!(predicate("type != bar").test(&record));
    }

    #[test]
    fn test_any_value_of_multi_valued_field() {
        let record = Record::new().with("tag", "a").with("tag", "b");
        assert!(predicate("tag == b").test(&record));
        assert!(!predicate("tag == c").test(&record));
    }

    #[test]
    fn test_negation_covers_every_value() {
        let record = Record::new().with("tag", "a").with("tag", "b");
        assert!(predicate("tag == a").test(&record));
        assert!(!predicate("tag != a").test(&record));
        assert!(!predicate("! tag == a").test(&record));
        assert!(!predicate("!(tag == a)").test(&record));
        assert!(predicate("tag != c").test(&record));
    }

    #[test]
    fn test_unresolved_field() {
        let record = Record::new().with("pid", 1);
        assert!(!predicate("tid == 1").test(&record));
        // negated comparison on a missing field holds
        let negated = CompiledFilter::new(vec![CompiledExpression::single(
            CompiledComparison::new("tid", OperatorKind::Equals, Some("1".into())).negated(),
        )]);
        assert!(generate(&negated).test(&record));
        assert!(!predicate("tid present").test(&record));
        assert!(predicate("pid present").test(&record));
    }

    #[test]
    fn test_derived_alias_is_searched() {
        let record = Record::new().with("> cpu", 3);
        assert!(predicate("cpu == 3").test(&record));

        let options = PredicateOptions {
            ignore_case: false,
            derived_prefix: String::new(),
        };
        let filter = compile_str("cpu == 3").expect("filter compiles");
        assert!(!generate_with(&filter, default_coercer(), &options).test(&record));
    }

    #[test]
    fn test_connectives() {
        let record = Record::new().with("pid", 1234).with("name", "glxgears");
        assert!(predicate(r#"pid > 1000 && name matches "gl.*""#).test(&record));
        assert!(!predicate("pid > 2000 && name matches gl").test(&record));
        assert!(predicate("pid > 2000 || name matches gl").test(&record));
        assert!(!predicate("!(pid > 2000 || name matches gl)").test(&record));
    }

    #[test]
    fn test_expressions_all_must_hold() {
        let record = Record::new().with("afield", "value").with("pid", 5);
        assert!(predicate("afield present pid == 5").test(&record));
        assert!(!predicate("afield present pid == 6").test(&record));
    }

    #[test]
    fn test_filter_negation_applies_last() {
        let filter = compile_str("pid == 5").expect("filter compiles").negated();
        let record = Record::new().with("pid", 5);
        assert!(!generate(&filter).test(&record));
        assert!(generate(&filter.negated()).test(&record));
    }

    #[test]
    fn test_ignore_case_option() {
        let filter = compile_str("msg contains TIMEOUT").expect("filter compiles");
        let record = Record::new().with("msg", "connection timeout");
        assert!(!generate(&filter).test(&record));

        let options = PredicateOptions {
            ignore_case: true,
            ..PredicateOptions::default()
        };
        assert!(generate_with(&filter, default_coercer(), &options).test(&record));
    }

    #[test]
    fn test_event_filter_impl() {
        let event = TraceEvent::new("ust", "sched_switch", 0).with_field("prev_tid", 7);
        let predicate = predicate(r#""Event type" == sched_switch"#);
        assert!(predicate.matches(&event));
    }
}
