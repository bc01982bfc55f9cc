#![forbid(unsafe_code)]

//! Pattern-driven formatting and parsing of table values.
//!
//! The engine treats formatting as a fallible, pluggable service: a pattern
//! string either compiles into a [`Formatter`] for a given column type or
//! fails with a [`PatternError`] (which the engine surfaces as a warning).
//! A compiled formatter renders values to display text and parses display
//! text back into typed values.

use std::fmt;

use gridquery_model::{Locale, Value, ValueType};
use thiserror::Error;

mod datetime;
mod number;

use datetime::DateTimePattern;
use number::NumberPattern;

/// A formatting pattern failed to compile, or a string failed to parse
/// under a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PatternError {
    pub message: String,
}

impl PatternError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A compiled formatter for one column type under one locale.
#[derive(Debug, Clone)]
pub struct Formatter {
    locale: Locale,
    kind: FormatterKind,
}

#[derive(Debug, Clone)]
enum FormatterKind {
    /// Plain locale rendering of a number (no explicit pattern).
    GeneralNumber,
    Number(NumberPattern),
    Boolean { true_text: String, false_text: String },
    Text,
    DateTime(DateTimePattern),
}

impl Formatter {
    /// Compiles `pattern` for a column of `value_type`.
    ///
    /// `None` selects the type's default rendering. TEXT columns ignore
    /// patterns and always render the string itself.
    pub fn compile(
        pattern: Option<&str>,
        value_type: ValueType,
        locale: Locale,
    ) -> Result<Self, PatternError> {
        let kind = match value_type {
            ValueType::Text => FormatterKind::Text,
            ValueType::Number => match pattern {
                None => FormatterKind::GeneralNumber,
                Some(p) => FormatterKind::Number(NumberPattern::compile(p)?),
            },
            ValueType::Boolean => {
                let raw = pattern.unwrap_or("true:false");
                let (true_text, false_text) = raw.split_once(':').ok_or_else(|| {
                    PatternError::new(format!(
                        "boolean pattern must be two texts separated by a colon: {raw:?}"
                    ))
                })?;
                if false_text.contains(':') {
                    return Err(PatternError::new(format!(
                        "boolean pattern must contain exactly one colon: {raw:?}"
                    )));
                }
                FormatterKind::Boolean {
                    true_text: true_text.to_string(),
                    false_text: false_text.to_string(),
                }
            }
            ValueType::Date | ValueType::DateTime | ValueType::TimeOfDay => {
                let raw = pattern.unwrap_or(default_temporal_pattern(value_type));
                FormatterKind::DateTime(DateTimePattern::compile(raw, value_type)?)
            }
        };
        Ok(Self { locale, kind })
    }

    /// Renders a value. Null values render as the empty string.
    ///
    /// The value's type is expected to match the type this formatter was
    /// compiled for; a mismatched value falls back to its plain rendering.
    pub fn format(&self, value: &Value) -> String {
        if value.is_null() {
            return String::new();
        }
        match (&self.kind, value) {
            (FormatterKind::GeneralNumber, Value::Number(Some(n))) => {
                number::format_plain(n.0, self.locale)
            }
            (FormatterKind::Number(pattern), Value::Number(Some(n))) => {
                pattern.format(n.0, self.locale)
            }
            (
                FormatterKind::Boolean {
                    true_text,
                    false_text,
                },
                Value::Boolean(Some(b)),
            ) => {
                if *b {
                    true_text.clone()
                } else {
                    false_text.clone()
                }
            }
            (FormatterKind::Text, Value::Text(Some(s))) => s.clone(),
            (FormatterKind::DateTime(pattern), value) => pattern
                .format(value)
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        }
    }

    /// Parses display text back into a value of this formatter's type.
    pub fn parse(&self, text: &str) -> Result<Value, PatternError> {
        match &self.kind {
            FormatterKind::Text => Ok(Value::text(text)),
            FormatterKind::GeneralNumber => {
                number::parse_plain(text, self.locale).map(Value::number)
            }
            FormatterKind::Number(pattern) => {
                pattern.parse(text, self.locale).map(Value::number)
            }
            FormatterKind::Boolean {
                true_text,
                false_text,
            } => {
                if text == true_text {
                    Ok(Value::boolean(true))
                } else if text == false_text {
                    Ok(Value::boolean(false))
                } else {
                    Err(PatternError::new(format!(
                        "expected {true_text:?} or {false_text:?}, got {text:?}"
                    )))
                }
            }
            FormatterKind::DateTime(pattern) => pattern.parse(text),
        }
    }
}

impl fmt::Display for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FormatterKind::GeneralNumber => write!(f, "number formatter ({})", self.locale.id),
            FormatterKind::Number(_) => write!(f, "number pattern formatter ({})", self.locale.id),
            FormatterKind::Boolean { .. } => f.write_str("boolean formatter"),
            FormatterKind::Text => f.write_str("text formatter"),
            FormatterKind::DateTime(_) => f.write_str("date/time pattern formatter"),
        }
    }
}

fn default_temporal_pattern(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Date => "yyyy-MM-dd",
        ValueType::DateTime => "yyyy-MM-dd HH:mm:ss",
        ValueType::TimeOfDay => "HH:mm:ss",
        _ => unreachable!("not a temporal type"),
    }
}
