//! Log Record Module
//!
//! One mutation per line:
//!
//! ```text
//! SET "key" "value" 1718000000000
//! SET "key" "value"
//! DEL "key"
//! ```
//!
//! Keys and values are JSON string literals, so spaces, quotes and newlines
//! inside them never break the line framing. The trailing number on `SET` is
//! the absolute expiry in Unix milliseconds; when absent the entry never
//! expires.

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Log Record ==
/// A single replayable mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Set {
        key: String,
        value: String,
        expires_at: Option<u64>,
    },
    Del {
        key: String,
    },
}

impl LogRecord {
    /// Key the record mutates.
    pub fn key(&self) -> &str {
        match self {
            LogRecord::Set { key, .. } | LogRecord::Del { key } => key,
        }
    }

    // == Encode ==
    /// Serializes the record as one newline-terminated line.
    pub fn encode(&self) -> Result<String> {
        let line = match self {
            LogRecord::Set {
                key,
                value,
                expires_at,
            } => {
                let mut line = format!("SET {} {}", quote(key)?, quote(value)?);
                if let Some(at) = expires_at {
                    line.push(' ');
                    line.push_str(&at.to_string());
                }
                line
            }
            LogRecord::Del { key } => format!("DEL {}", quote(key)?),
        };
        Ok(line + "\n")
    }

    // == Decode ==
    /// Parses one line (with or without its terminator).
    ///
    /// The error is a human-readable reason; the caller attaches the line number.
    pub fn decode(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (op, operands) = line
            .split_once(' ')
            .ok_or_else(|| format!("missing operands in {:?}", line))?;

        let mut fields = serde_json::Deserializer::from_str(operands).into_iter::<Value>();
        let mut next_field = || {
            fields
                .next()
                .transpose()
                .map_err(|e| format!("malformed field: {}", e))
        };

        let record = match op {
            "SET" => {
                let key = string_field(next_field()?, "key")?;
                let value = string_field(next_field()?, "value")?;
                let expires_at = match next_field()? {
                    None => None,
                    Some(Value::Number(n)) => Some(
                        n.as_u64()
                            .ok_or_else(|| format!("expiry {} is not a timestamp", n))?,
                    ),
                    Some(other) => return Err(format!("unexpected expiry field {}", other)),
                };
                LogRecord::Set {
                    key,
                    value,
                    expires_at,
                }
            }
            "DEL" => LogRecord::Del {
                key: string_field(next_field()?, "key")?,
            },
            other => return Err(format!("unknown operation {:?}", other)),
        };

        if next_field()?.is_some() {
            return Err("trailing fields after record".to_string());
        }
        if record.key().is_empty() {
            return Err("empty key".to_string());
        }
        Ok(record)
    }
}

fn quote(s: &str) -> Result<String> {
    serde_json::to_string(s).map_err(|e| CacheError::Internal(e.to_string()))
}

fn string_field(field: Option<Value>, name: &str) -> std::result::Result<String, String> {
    match field {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!("{} must be a string, found {}", name, other)),
        None => Err(format!("missing {}", name)),
    }
}
