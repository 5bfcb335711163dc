use super::coerce::{Coercer, PreparedValue};
use super::error::FilterParseError;
use crate::value::Value;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The closed set of comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Equals,
    NotEquals,
    Matches,
    Contains,
    Present,
    GreaterThan,
    LessThan,
}

impl FromStr for OperatorKind {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(OperatorKind::Equals),
            "!=" => Ok(OperatorKind::NotEquals),
            "matches" => Ok(OperatorKind::Matches),
            "contains" => Ok(OperatorKind::Contains),
            "present" => Ok(OperatorKind::Present),
            ">" => Ok(OperatorKind::GreaterThan),
            "<" => Ok(OperatorKind::LessThan),
            _ => Err(FilterParseError::UnknownOperator(s.to_string())),
        }
    }
}

impl OperatorKind {
    /// Token used for this operator in filter text
    pub fn symbol(&self) -> &'static str {
        match self {
            OperatorKind::Equals => "==",
            OperatorKind::NotEquals => "!=",
            OperatorKind::Matches => "matches",
            OperatorKind::Contains => "contains",
            OperatorKind::Present => "present",
            OperatorKind::GreaterThan => ">",
            OperatorKind::LessThan => "<",
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, OperatorKind::Present)
    }

    /// Ordering a `>`/`<` comparison has to produce
    pub fn target_ordering(&self) -> Option<Ordering> {
        match self {
            OperatorKind::GreaterThan => Some(Ordering::Greater),
            OperatorKind::LessThan => Some(Ordering::Less),
            _ => None,
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Apply `op` to a resolved value, without negation.
///
/// String values are read as numbers or instants with the same `coercer`
/// that prepared the filter value.
pub fn evaluate(
    op: OperatorKind,
    resolved: &Value,
    prepared: &PreparedValue,
    ignore_case: bool,
    coercer: &Coercer,
) -> bool {
    match op {
        OperatorKind::Equals => values_equal(resolved, prepared, ignore_case, coercer),
        OperatorKind::NotEquals => !values_equal(resolved, prepared, ignore_case, coercer),
        OperatorKind::Matches => matches_pattern(resolved, prepared, coercer),
        OperatorKind::Contains => contains_text(resolved, prepared.raw(), ignore_case),
        OperatorKind::Present => true,
        OperatorKind::GreaterThan | OperatorKind::LessThan => {
            let target = op
                .target_ordering()
                .unwrap_or_else(|| unreachable!("ordering operator without a target"));
            compare_values(resolved, prepared, coercer) == Some(target)
        }
    }
}

/// Lenient equality: structural, then string form, then numeric.
pub fn values_equal(resolved: &Value, prepared: &PreparedValue, ignore_case: bool, coercer: &Coercer) -> bool {
    let structural = match (resolved, prepared) {
        (Value::String(s), PreparedValue::Raw(raw)) => s == raw,
        (Value::Integer(i), PreparedValue::Number { number, .. }) => {
            number.as_i64() == Some(*i)
        }
        (Value::Float(f), PreparedValue::Number { number, .. }) => number.as_f64() == *f,
        _ => false,
    };
    if structural {
        return true;
    }

    let text = resolved.to_string();
    let same_text = if ignore_case {
        text.to_lowercase() == prepared.raw().to_lowercase()
    } else {
        text == prepared.raw()
    };
    if same_text {
        return true;
    }

    match (coercer.number_of(resolved), prepared.as_number()) {
        (Some(a), Some(b)) => a.numeric_eq(b),
        _ => false,
    }
}

/// Numeric equality first when the value is a number, then an unanchored pattern search.
///
/// Without a usable pattern the comparison reduces to equality.
pub fn matches_pattern(resolved: &Value, prepared: &PreparedValue, coercer: &Coercer) -> bool {
    if let (Some(expected), Some(actual)) = (prepared.as_number(), coercer.number_of(resolved)) {
        if actual.numeric_eq(expected) {
            return true;
        }
    }
    match prepared.pattern() {
        Some(pattern) => pattern.is_match(&resolved.to_string()),
        None => values_equal(resolved, prepared, false, coercer),
    }
}

pub fn contains_text(resolved: &Value, needle: &str, ignore_case: bool) -> bool {
    let haystack = resolved.to_string();
    if ignore_case {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

/// Numeric ordering when both sides are numbers, otherwise lexicographic.
pub fn compare_values(resolved: &Value, prepared: &PreparedValue, coercer: &Coercer) -> Option<Ordering> {
    match (coercer.number_of(resolved), prepared.as_number()) {
        (Some(a), Some(b)) => a.compare(b),
        _ => Some(compare_text(resolved, prepared.raw())),
    }
}

pub fn compare_text(resolved: &Value, raw: &str) -> Ordering {
    resolved.to_string().as_str().cmp(raw)
}

/// Ordering of a resolved value against an instant in nanoseconds; `None` when
/// the value is not a timestamp.
pub fn compare_timestamp(resolved: &Value, expected_ns: i64, coercer: &Coercer) -> Option<Ordering> {
    coercer.timestamp_of(resolved).map(|actual| actual.cmp(&expected_ns))
}

/// An operator bound to its prepared value and flags.
///
/// This is where a comparison's `negate` is applied.
#[derive(Debug, Clone)]
pub struct Comparator {
    pub operator: OperatorKind,
    pub prepared: PreparedValue,
    pub ignore_case: bool,
    pub negate: bool,
    coercer: Coercer,
}

impl Comparator {
    pub fn new(
        operator: OperatorKind,
        raw_value: Option<&str>,
        coercer: &Coercer,
        ignore_case: bool,
        negate: bool,
    ) -> Self {
        let raw = raw_value.unwrap_or_default();
        let prepared = coercer.coerce(raw, operator == OperatorKind::Matches);
        // `!=` is a negated `==`, also when the field does not resolve
        let (operator, negate) = match operator {
            OperatorKind::NotEquals => (OperatorKind::Equals, !negate),
            other => (other, negate),
        };
        Self {
            operator,
            prepared,
            ignore_case,
            negate,
            coercer: coercer.clone(),
        }
    }

    /// `resolved` is `None` when the field could not be resolved, which never matches.
    pub fn test(&self, resolved: Option<&Value>) -> bool {
        self.test_any(resolved)
    }

    /// The operator holds when any of `values` satisfies it; negation applies
    /// once to that outcome, so `!=` on a multi-valued field means no value equals.
    pub fn test_any<'a>(&self, values: impl IntoIterator<Item = &'a Value>) -> bool {
        let result = values
            .into_iter()
            .any(|value| evaluate(self.operator, value, &self.prepared, self.ignore_case, &self.coercer));
        result ^ self.negate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoercionRules;
    use crate::filter::coerce::{coerce, default_coercer};

    fn eval(op: OperatorKind, resolved: impl Into<Value>, raw: &str) -> bool {
        let prepared = coerce(raw, op == OperatorKind::Matches);
        evaluate(op, &resolved.into(), &prepared, false, default_coercer())
    }

    #[test]
    fn test_operator_tokens_round_trip() {
        for op in [
            OperatorKind::Equals,
            OperatorKind::NotEquals,
            OperatorKind::Matches,
            OperatorKind::Contains,
            OperatorKind::Present,
            OperatorKind::GreaterThan,
            OperatorKind::LessThan,
        ] {
            assert_eq!(op.symbol().parse::<OperatorKind>(), Ok(op));
        }
        assert!(">=".parse::<OperatorKind>().is_err());
    }

    #[test]
    fn test_equality_fallback_chain() {
        assert!(eval(OperatorKind::Equals, "foo", "foo"));
        assert!(eval(OperatorKind::Equals, 42, "42"));
        assert!(eval(OperatorKind::Equals, 42, "0x2A"));
        assert!(eval(OperatorKind::Equals, 1.5, "1.5"));
        // numeric step reconciles differently formatted strings
        assert!(eval(OperatorKind::Equals, "1.0", "1"));
        assert!(eval(OperatorKind::Equals, 1, "1.0"));
        assert!(!eval(OperatorKind::Equals, "foo", "bar"));
        assert!(!eval(OperatorKind::NotEquals, "foo", "foo"));
        assert!(eval(OperatorKind::NotEquals, "foo", "bar"));
    }

    #[test]
    fn test_equality_ignore_case() {
        let prepared = coerce("FOO", false);
        assert!(values_equal(&Value::from("foo"), &prepared, true, default_coercer()));
        assert!(!values_equal(&Value::from("foo"), &prepared, false, default_coercer()));
    }

    #[test]
    fn test_matches_searches_unanchored() {
        assert!(eval(OperatorKind::Matches, "glxgears", "gl.*"));
        assert!(eval(OperatorKind::Matches, "another afield value", "other"));
        assert!(!eval(OperatorKind::Matches, "afield value 1", ".*other.*"));
    }

    #[test]
    fn test_matches_numeric_fast_path() {
        assert!(eval(OperatorKind::Matches, 42, "42"));
        assert!(eval(OperatorKind::Matches, 42, "0x2A"));
        assert!(eval(OperatorKind::Matches, 1.0, "1"));
    }

    #[test]
    fn test_matches_without_pattern_uses_equality() {
        assert!(eval(OperatorKind::Matches, "(", "("));
        assert!(!eval(OperatorKind::Matches, "(x", "("));
    }

    #[test]
    fn test_contains_case_flag() {
        let value = Value::from("Connection Timeout");
        assert!(contains_text(&value, "Timeout", false));
        assert!(!contains_text(&value, "timeout", false));
        assert!(contains_text(&value, "TIMEOUT", true));
    }

    #[test]
    fn test_ordering_numeric_then_lexicographic() {
        assert!(eval(OperatorKind::GreaterThan, 1234, "1000"));
        assert!(!eval(OperatorKind::GreaterThan, 500, "1000"));
        assert!(eval(OperatorKind::LessThan, 2.5, "3"));
        // "9" < "10" numerically even as strings
        assert!(eval(OperatorKind::LessThan, "9", "10"));
        assert!(eval(OperatorKind::LessThan, "apple", "banana"));
        assert!(!eval(OperatorKind::GreaterThan, "apple", "apple"));
        assert!(eval(OperatorKind::GreaterThan, 300_000_000, "200ms"));
    }

    #[test]
    fn test_present_ignores_value() {
        assert!(eval(OperatorKind::Present, "", ""));
    }

    #[test]
    fn test_comparator_negation_and_unresolved() {
        let coercer = Coercer::default();
        let equals = Comparator::new(OperatorKind::Equals, Some("x"), &coercer, false, false);
        let negated = Comparator::new(OperatorKind::Equals, Some("x"), &coercer, false, true);
        let value = Value::from("x");

        assert!(equals.test(Some(&value)));
        assert!(!negated.test(Some(&value)));
        assert!(!equals.test(None));
        assert!(negated.test(None));

        let not_equals = Comparator::new(OperatorKind::NotEquals, Some("x"), &coercer, false, false);
        assert_eq!(not_equals.operator, OperatorKind::Equals);
        assert!(not_equals.negate);
        assert!(!not_equals.test(Some(&value)));
        assert!(not_equals.test(None));
    }

    #[test]
    fn test_compare_timestamp() {
        let expected = Coercer::default()
            .parse_timestamp("1970-01-01T00:00:01Z")
            .expect("timestamp parses");
        let coercer = default_coercer();
        assert_eq!(
            compare_timestamp(&Value::Timestamp(2_000_000_000), expected, coercer),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_timestamp(&Value::from("1970-01-01T00:00:01Z"), expected, coercer),
            Some(Ordering::Equal)
        );
        assert_eq!(compare_timestamp(&Value::from("soon"), expected, coercer), None);
    }

    #[test]
    fn test_negation_applies_after_any_value_matches() {
        let coercer = Coercer::default();
        let values = [Value::from("a"), Value::from("b")];
        let equals = Comparator::new(OperatorKind::Equals, Some("a"), &coercer, false, false);
        let not_equals = Comparator::new(OperatorKind::NotEquals, Some("a"), &coercer, false, false);
        let negated = Comparator::new(OperatorKind::Equals, Some("a"), &coercer, false, true);

        assert!(equals.test_any(&values));
        assert!(!not_equals.test_any(&values));
        assert!(!negated.test_any(&values));
        assert!(not_equals.test_any(&[Value::from("b")]));
        assert!(not_equals.test_any(std::iter::empty()));
    }

    #[test]
    fn test_resolved_strings_use_the_comparator_separators() {
        let coercer = Coercer::new(&CoercionRules {
            grouping_separator: '.',
            decimal_separator: ',',
            ..CoercionRules::default()
        });
        let greater = Comparator::new(OperatorKind::GreaterThan, Some("10,0"), &coercer, false, false);
        assert!(!greater.test(Some(&Value::from("9,5"))));
        assert!(greater.test(Some(&Value::from("10,5"))));
        let equals = Comparator::new(OperatorKind::Equals, Some("1.234"), &coercer, false, false);
        assert!(equals.test(Some(&Value::from("1234"))));
    }
}
