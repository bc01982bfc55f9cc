use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use gridquery_model::{Value, ValueType};

use crate::PatternError;

/// A compiled date/time pattern for DATE, DATETIME, or TIMEOFDAY columns.
///
/// Token language (a subset shared with the query literal forms):
/// `yyyy` / `yy` year, `MM` / `M` month, `dd` / `d` day, `HH` / `H` hour,
/// `mm` / `m` minute, `ss` / `s` second, `SSS` milliseconds. Text wrapped
/// in single quotes is literal; every other non-letter character is
/// rendered as-is. Unknown letter runs fail compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DateTimePattern {
    chrono_format: String,
    target: ValueType,
}

impl DateTimePattern {
    pub(crate) fn compile(pattern: &str, target: ValueType) -> Result<Self, PatternError> {
        let mut chrono_format = String::with_capacity(pattern.len() + 4);
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\'' {
                // Quoted literal; '' inside quotes is an escaped quote.
                loop {
                    match chars.next() {
                        Some('\'') => {
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                chrono_format.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(lit) => push_literal(&mut chrono_format, lit),
                        None => {
                            return Err(PatternError::new(format!(
                                "unterminated quote in pattern: {pattern:?}"
                            )))
                        }
                    }
                }
                continue;
            }

            if !c.is_ascii_alphabetic() {
                push_literal(&mut chrono_format, c);
                continue;
            }

            let mut run = 1;
            while chars.peek() == Some(&c) {
                chars.next();
                run += 1;
            }
            let spec = match (c, run) {
                ('y', 4) => "%Y",
                ('y', 2) => "%y",
                ('M', 2) => "%m",
                ('M', 1) => "%-m",
                ('d', 2) => "%d",
                ('d', 1) => "%-d",
                ('H', 2) => "%H",
                ('H', 1) => "%-H",
                ('m', 2) => "%M",
                ('m', 1) => "%-M",
                ('s', 2) => "%S",
                ('s', 1) => "%-S",
                ('S', 3) => "%3f",
                _ => {
                    return Err(PatternError::new(format!(
                        "unsupported token {:?} in pattern {pattern:?}",
                        c.to_string().repeat(run)
                    )))
                }
            };
            chrono_format.push_str(spec);
        }

        Ok(Self {
            chrono_format,
            target,
        })
    }

    /// Renders a temporal value; returns `None` when the value's type does
    /// not carry the needed components.
    pub(crate) fn format(&self, value: &Value) -> Option<String> {
        let datetime = match value {
            Value::Date(Some(d)) => d.and_hms_opt(0, 0, 0)?,
            Value::DateTime(Some(dt)) => *dt,
            // The synthetic calendar for times of day: the conventional
            // zero date 1899-12-30.
            Value::TimeOfDay(Some(t)) => NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(*t),
            _ => return None,
        };
        Some(datetime.format(&self.chrono_format).to_string())
    }

    pub(crate) fn parse(&self, text: &str) -> Result<Value, PatternError> {
        let err = |_| PatternError::new(format!("text does not match pattern: {text:?}"));
        match self.target {
            ValueType::Date => NaiveDate::parse_from_str(text, &self.chrono_format)
                .map(Value::from)
                .map_err(err),
            ValueType::DateTime => NaiveDateTime::parse_from_str(text, &self.chrono_format)
                .map(Value::from)
                .map_err(err),
            ValueType::TimeOfDay => NaiveTime::parse_from_str(text, &self.chrono_format)
                .map(Value::from)
                .map_err(err),
            _ => Err(PatternError::new("not a temporal formatter")),
        }
    }
}

fn push_literal(out: &mut String, c: char) {
    // '%' is chrono's escape character.
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn date_tokens_render_padded_and_unpadded() {
        let padded = DateTimePattern::compile("yyyy-MM-dd", ValueType::Date).unwrap();
        let value = Value::date(2021, 1, 5).unwrap();
        assert_eq!(padded.format(&value).unwrap(), "2021-01-05");

        let unpadded = DateTimePattern::compile("M/d/yy", ValueType::Date).unwrap();
        assert_eq!(unpadded.format(&value).unwrap(), "1/5/21");
    }

    #[test]
    fn time_tokens_include_milliseconds() {
        let p = DateTimePattern::compile("HH:mm:ss.SSS", ValueType::TimeOfDay).unwrap();
        let value = Value::time_of_day(9, 5, 7, 250).unwrap();
        assert_eq!(p.format(&value).unwrap(), "09:05:07.250");
    }

    #[test]
    fn quoted_literals_pass_through() {
        let p = DateTimePattern::compile("'on' yyyy", ValueType::Date).unwrap();
        assert_eq!(
            p.format(&Value::date(2020, 6, 1).unwrap()).unwrap(),
            "on 2020"
        );
    }

    #[test]
    fn unknown_tokens_fail_to_compile() {
        assert!(DateTimePattern::compile("QQ yyyy", ValueType::Date).is_err());
        assert!(DateTimePattern::compile("'open", ValueType::Date).is_err());
    }

    #[test]
    fn parse_inverts_format() {
        let p = DateTimePattern::compile("yyyy-MM-dd HH:mm:ss", ValueType::DateTime).unwrap();
        let value = Value::datetime(2021, 12, 3, 1, 2, 3, 0).unwrap();
        let text = p.format(&value).unwrap();
        assert_eq!(p.parse(&text).unwrap(), value);
    }
}
