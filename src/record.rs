use crate::value::Value;
use serde_json::Map;

/// Field name that stands for "any field".
pub const WILDCARD_FIELD: &str = "*";

/// Prefix given to computed columns that mirror a real field.
pub const DERIVED_PREFIX: &str = "> ";

/// A multi-valued mapping from field name to value.
///
/// Entries keep their insertion order and a name may appear more than once,
/// e.g. several columns sharing one logical name or the elements of a JSON array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((field.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First value stored under exactly `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v)
    }

    /// Every value a comparison on `field` has to consider.
    ///
    /// The wildcard yields all entries. A named field yields entries stored
    /// under the name itself or under its derived alias (`prefix` + name).
    pub fn values_for<'a>(
        &'a self,
        field: &'a str,
        derived_prefix: &'a str,
    ) -> impl Iterator<Item = &'a Value> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| {
                field == WILDCARD_FIELD
                    || key == field
                    || (!derived_prefix.is_empty()
                        && key
                            .strip_prefix(derived_prefix)
                            .is_some_and(|rest| rest == field))
            })
            .map(|(_, v)| v)
    }

    /// Flatten a JSON object into a record.
    ///
    /// Nested objects become dotted keys, arrays contribute one entry per
    /// element and nulls are dropped. Non-object input yields an empty record.
    pub fn from_json(value: &serde_json::Value) -> Record {
        let mut record = Record::new();
        if let serde_json::Value::Object(map) = value {
            flatten_into(&mut record, "", map);
        }
        record
    }
}

fn flatten_into(record: &mut Record, prefix: &str, map: &Map<String, serde_json::Value>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        flatten_value(record, &name, value);
    }
}

fn flatten_value(record: &mut Record, name: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(nested) => flatten_into(record, name, nested),
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_value(record, name, item);
            }
        }
        other => {
            if let Some(scalar) = Value::from_json(other) {
                record.insert(name, scalar);
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
