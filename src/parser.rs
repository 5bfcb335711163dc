use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Line {line} is not valid JSON: {message}")]
    InvalidJson { line: usize, message: String },

    #[error("Line {line} is not a JSON object")]
    NotAnObject { line: usize },
}

/// One JSON object read from a record file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based line number in the source
    pub line: usize,
    /// The line as it was read
    pub text: String,
    pub value: Value,
}

/// Parse one line as a JSON object, accepting JSON5 (comments, single quotes,
/// trailing commas) when strict JSON fails.
pub fn parse_record_line(text: &str, line: usize) -> Result<Value, ParseError> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(strict) => {
            debug!(line, error = %strict, "line is not strict JSON, retrying as JSON5");
            json5::from_str::<Value>(text).map_err(|lenient| ParseError::InvalidJson {
                line,
                message: lenient.to_string(),
            })?
        }
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(ParseError::NotAnObject { line })
    }
}

/// Read JSON-lines records from `reader`.
///
/// Blank lines and lines starting with `#` or `//` are ignored. Lines that do
/// not hold a JSON object are reported and skipped; only I/O failures abort.
pub fn parse_records<R: BufRead>(reader: R, source: &str) -> Result<Vec<RawRecord>, ParseError> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let text = line.map_err(|source_err| ParseError::Io {
            path: source.to_string(),
            source: source_err,
        })?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }

        let line = index + 1;
        match parse_record_line(trimmed, line) {
            Ok(value) => records.push(RawRecord { line, text, value }),
            Err(err) => warn!(source, error = %err, "Skipping unreadable record"),
        }
    }

    Ok(records)
}

pub fn parse_record_file(path: impl AsRef<Path>) -> Result<Vec<RawRecord>, ParseError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: display.clone(),
        source,
    })?;
    parse_records(BufReader::new(file), &display)
}
