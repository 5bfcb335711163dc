//! Value coercion
//!
//! Raw filter values are strings. Before a comparison is evaluated the value is
//! coerced once into the most specific representation it admits. Parsers are
//! tried in order and each must consume the whole string:
//!
//! 1. integer literal (`42`, `0x2A`, `052`)
//! 2. grouped decimal number (`1,234.5`)
//! 3. unit-scaled decimal (`2k`, `3.5M`, `20m`)
//! 4. sub-second duration (`200ms`, `1.2s`), in nanoseconds
//! 5. timestamp (RFC 3339 or a configured format), in nanoseconds since epoch
//!
//! For `matches`, the string is additionally compiled as a regular expression.

use crate::config::CoercionRules;
use crate::value::{Number, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static UNIT_SCALED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)) ?([kMGTPmuµnp])$")
        .expect("valid unit-scaled regex")
});
static SUB_SECOND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)) ?(s|ms|us|µs|ns)$")
        .expect("valid sub-second regex")
});
static DEFAULT_COERCER: LazyLock<Coercer> = LazyLock::new(Coercer::default);

/// A raw filter value after coercion.
///
/// Built once when a predicate or tree node is generated and reused for every
/// evaluation.
#[derive(Debug, Clone)]
pub enum PreparedValue {
    Number {
        raw: String,
        number: Number,
    },
    /// Only produced for `matches`; keeps the numeric coercion for the equality fast path
    Pattern {
        raw: String,
        pattern: Regex,
        number: Option<Number>,
    },
    Raw(String),
}

impl PreparedValue {
    pub fn raw(&self) -> &str {
        match self {
            PreparedValue::Number { raw, .. } | PreparedValue::Pattern { raw, .. } => raw,
            PreparedValue::Raw(raw) => raw,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            PreparedValue::Number { number, .. } => Some(*number),
            PreparedValue::Pattern { number, .. } => *number,
            PreparedValue::Raw(_) => None,
        }
    }

    pub fn pattern(&self) -> Option<&Regex> {
        match self {
            PreparedValue::Pattern { pattern, .. } => Some(pattern),
            _ => None,
        }
    }
}

/// Turns raw strings into numbers, timestamps and patterns.
#[derive(Debug, Clone)]
pub struct Coercer {
    grouping_separator: char,
    decimal_separator: char,
    timestamp_formats: Vec<String>,
}

impl Default for Coercer {
    fn default() -> Self {
        Self::new(&CoercionRules::default())
    }
}

impl Coercer {
    pub fn new(rules: &CoercionRules) -> Self {
        Self {
            grouping_separator: rules.grouping_separator,
            decimal_separator: rules.decimal_separator,
            timestamp_formats: rules.timestamp_formats.clone(),
        }
    }

    pub fn coerce(&self, raw: &str, for_match: bool) -> PreparedValue {
        let number = self.parse_number(raw);
        if for_match {
            match Regex::new(raw) {
                Ok(pattern) => {
                    return PreparedValue::Pattern {
                        raw: raw.to_string(),
                        pattern,
                        number,
                    };
                }
                Err(err) => debug!(value = raw, error = %err, "match value is not a valid pattern"),
            }
        }
        match number {
            Some(number) => PreparedValue::Number {
                raw: raw.to_string(),
                number,
            },
            None => PreparedValue::Raw(raw.to_string()),
        }
    }

    /// First numeric parser that consumes all of `raw`.
    pub fn parse_number(&self, raw: &str) -> Option<Number> {
        parse_integer_literal(raw)
            .or_else(|| self.parse_grouped_decimal(raw))
            .or_else(|| parse_unit_scaled(raw))
            .or_else(|| parse_sub_second(raw))
            .or_else(|| self.parse_timestamp(raw).map(Number::Integer))
    }

    /// Numeric view of a resolved value; strings go through these rules.
    pub fn number_of(&self, value: &Value) -> Option<Number> {
        match value {
            Value::String(s) => self.parse_number(s),
            other => other.as_number(),
        }
    }

    pub fn timestamp_of(&self, value: &Value) -> Option<i64> {
        match value {
            Value::String(s) => self.parse_timestamp(s),
            other => other.as_timestamp(),
        }
    }

    /// Nanoseconds since the epoch for RFC 3339 text or any configured format (UTC).
    pub fn parse_timestamp(&self, raw: &str) -> Option<i64> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return ts.timestamp_nanos_opt();
        }
        for format in &self.timestamp_formats {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return naive.and_utc().timestamp_nanos_opt();
            }
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_nanos_opt();
            }
        }
        None
    }

    fn parse_grouped_decimal(&self, raw: &str) -> Option<Number> {
        let (negative, body) = split_sign(raw);
        let (int_part, frac_part) = match body.split_once(self.decimal_separator) {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let int_digits = if int_part.contains(self.grouping_separator) {
            let groups: Vec<&str> = int_part.split(self.grouping_separator).collect();
            let well_formed = groups.iter().enumerate().all(|(i, group)| {
                let len_ok = if i == 0 {
                    (1..=3).contains(&group.len())
                } else {
                    group.len() == 3
                };
                len_ok && group.bytes().all(|b| b.is_ascii_digit())
            });
            if !well_formed {
                return None;
            }
            groups.concat()
        } else if int_part.bytes().all(|b| b.is_ascii_digit()) {
            int_part.to_string()
        } else {
            return None;
        };

        let mantissa = format!(
            "{}{}.{}",
            if negative { "-" } else { "" },
            if int_digits.is_empty() { "0" } else { &int_digits },
            frac_part
        );
        scale_decimal(mantissa.trim_end_matches('.'), 0)
    }
}

pub fn default_coercer() -> &'static Coercer {
    &DEFAULT_COERCER
}

/// Coerce with the default rules.
pub fn coerce(raw: &str, for_match: bool) -> PreparedValue {
    default_coercer().coerce(raw, for_match)
}

pub fn parse_number(raw: &str) -> Option<Number> {
    default_coercer().parse_number(raw)
}

pub fn parse_timestamp(raw: &str) -> Option<i64> {
    default_coercer().parse_timestamp(raw)
}

fn split_sign(raw: &str) -> (bool, &str) {
    if let Some(rest) = raw.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = raw.strip_prefix('+') {
        (false, rest)
    } else {
        (false, raw)
    }
}

/// Decimal, hexadecimal (`0x`, `#`) or octal (leading `0`) integer.
fn parse_integer_literal(raw: &str) -> Option<Number> {
    let (negative, body) = split_sign(raw);
    let (digits, radix) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
        .or_else(|| body.strip_prefix('#'))
    {
        (hex, 16)
    } else if body.len() > 1 && body.starts_with('0') {
        (&body[1..], 8)
    } else {
        (body, 10)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(Number::Integer(if negative { -magnitude } else { magnitude }))
}

/// `mantissa * 10^exponent`, exact while the result stays integral.
fn scale_decimal(mantissa: &str, exponent: i32) -> Option<Number> {
    let (negative, body) = split_sign(mantissa);
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let digits = format!("{int_part}{frac_part}");
    if digits.is_empty() {
        return None;
    }
    let sign = if negative { -1 } else { 1 };
    let shift = exponent - frac_part.len() as i32;

    if shift >= 0 {
        let base: i64 = digits.parse().ok()?;
        let scaled = base.checked_mul(10i64.checked_pow(shift as u32)?)?;
        return Some(Number::Integer(sign * scaled));
    }

    let trailing_zeros = frac_part.len() - frac_part.trim_end_matches('0').len();
    if exponent == 0 && trailing_zeros == frac_part.len() {
        let base: i64 = int_part.parse().ok()?;
        return Some(Number::Integer(sign * base));
    }
    let value: f64 = format!("{digits}e{shift}").parse().ok()?;
    Some(Number::normalized(sign as f64 * value))
}

fn parse_unit_scaled(raw: &str) -> Option<Number> {
    let captures = UNIT_SCALED_RE.captures(raw)?;
    let exponent = match &captures[2] {
        "k" => 3,
        "M" => 6,
        "G" => 9,
        "T" => 12,
        "P" => 15,
        "m" => -3,
        "u" | "µ" => -6,
        "n" => -9,
        "p" => -12,
        _ => return None,
    };
    scale_decimal(&captures[1], exponent)
}

fn parse_sub_second(raw: &str) -> Option<Number> {
    let captures = SUB_SECOND_RE.captures(raw)?;
    let exponent = match &captures[2] {
        "s" => 9,
        "ms" => 6,
        "us" | "µs" => 3,
        "ns" => 0,
        _ => return None,
    };
    match scale_decimal(&captures[1], exponent)? {
        Number::Float(ticks) => Some(Number::Integer(ticks.round() as i64)),
        integer => Some(integer),
    }
}
