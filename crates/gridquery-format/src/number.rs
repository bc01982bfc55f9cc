use gridquery_model::Locale;

use crate::PatternError;

/// A compiled decimal number pattern, e.g. `#,##0.00`, `$#,##0`, `0.##%`,
/// `0.00E+00`.
///
/// The body between the first and last digit placeholder consists of `#`,
/// `0`, a grouping comma in the integer part, at most one decimal point,
/// and an optional exponent section (`E` plus placeholders). Everything
/// before and after the body is rendered literally; a `%` anywhere in the
/// literal parts scales the value by 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NumberPattern {
    prefix: String,
    suffix: String,
    min_int: usize,
    min_frac: usize,
    max_frac: usize,
    grouping: bool,
    percent: bool,
    exponent: Option<ExponentSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExponentSpec {
    width: usize,
    sign_always: bool,
    e_char: char,
}

impl NumberPattern {
    pub(crate) fn compile(pattern: &str) -> Result<Self, PatternError> {
        let first = pattern.find(['#', '0']);
        let last = pattern.rfind(['#', '0']);
        let (Some(first), Some(last)) = (first, last) else {
            return Err(PatternError::new(format!(
                "number pattern needs at least one digit placeholder: {pattern:?}"
            )));
        };

        let body = &pattern[first..=last];
        let prefix = &pattern[..first];
        let suffix = &pattern[last + 1..];

        let (mantissa_raw, exponent) =
            match body.char_indices().find(|(_, c)| matches!(c, 'E' | 'e')) {
                Some((idx, e_char)) => {
                    let exponent_raw = &body[idx + e_char.len_utf8()..];
                    let (sign_always, digits) = match exponent_raw.strip_prefix('+') {
                        Some(rest) => (true, rest),
                        None => (false, exponent_raw.strip_prefix('-').unwrap_or(exponent_raw)),
                    };
                    if digits.is_empty() || !digits.chars().all(|c| matches!(c, '0' | '#')) {
                        return Err(PatternError::new(format!(
                            "malformed exponent section in {pattern:?}"
                        )));
                    }
                    (
                        &body[..idx],
                        Some(ExponentSpec {
                            width: digits.len(),
                            sign_always,
                            e_char,
                        }),
                    )
                }
                None => (body, None),
            };

        if let Some(bad) = mantissa_raw
            .chars()
            .find(|c| !matches!(c, '#' | '0' | ',' | '.'))
        {
            return Err(PatternError::new(format!(
                "unexpected {bad:?} inside the digit section of {pattern:?}"
            )));
        }

        let mut parts = mantissa_raw.splitn(3, '.');
        let int_pat = parts.next().unwrap_or("");
        let frac_pat = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return Err(PatternError::new(format!(
                "number pattern has more than one decimal point: {pattern:?}"
            )));
        }
        if frac_pat.contains(',') {
            return Err(PatternError::new(format!(
                "grouping separator after the decimal point: {pattern:?}"
            )));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            min_int: int_pat.chars().filter(|c| *c == '0').count(),
            min_frac: frac_pat.chars().filter(|c| *c == '0').count(),
            max_frac: frac_pat.chars().filter(|c| matches!(c, '0' | '#')).count(),
            grouping: int_pat.contains(','),
            percent: prefix.contains('%') || suffix.contains('%'),
            exponent,
        })
    }

    pub(crate) fn format(&self, value: f64, locale: Locale) -> String {
        if !value.is_finite() {
            return value.to_string();
        }

        let mut v = value.abs();
        if self.percent {
            v *= 100.0;
        }

        let digits = match &self.exponent {
            Some(exponent) => self.render_scientific(v, exponent, locale),
            None => self.render_fixed(v, locale, self.grouping),
        };

        let mut out = String::new();
        if value.is_sign_negative() && v != 0.0 {
            out.push('-');
        }
        out.push_str(&self.prefix);
        out.push_str(&digits);
        out.push_str(&self.suffix);
        out
    }

    fn render_fixed(&self, value: f64, locale: Locale, grouping: bool) -> String {
        let rounded = round_to(value, self.max_frac);

        let (mut int_part, mut frac_part) = if self.max_frac == 0 {
            (format!("{rounded:.0}"), String::new())
        } else {
            let s = format!("{:.*}", self.max_frac, rounded);
            let mut split = s.splitn(2, '.');
            (
                split.next().unwrap_or("").to_string(),
                split.next().unwrap_or("").to_string(),
            )
        };

        while int_part.len() < self.min_int {
            int_part.insert(0, '0');
        }
        if grouping {
            if let Some(sep) = locale.thousands_sep {
                int_part = group_thousands(&int_part, sep);
            }
        }
        while frac_part.len() > self.min_frac && frac_part.ends_with('0') {
            frac_part.pop();
        }

        let mut out = int_part;
        if !frac_part.is_empty() {
            out.push(locale.decimal_sep);
            out.push_str(&frac_part);
        }
        out
    }

    fn render_scientific(&self, value: f64, spec: &ExponentSpec, locale: Locale) -> String {
        let (mantissa, exponent) = if value == 0.0 {
            (0.0, 0)
        } else {
            let exponent = value.log10().floor() as i32;
            let mut mantissa = value / 10_f64.powi(exponent);
            let mut exponent = exponent;
            mantissa = round_to(mantissa, self.max_frac);
            // Rounding can bump the mantissa to 10.0; renormalize.
            if mantissa >= 10.0 {
                mantissa /= 10.0;
                exponent += 1;
            }
            (mantissa, exponent)
        };

        let mantissa_str = self.render_fixed(mantissa, locale, false);
        let sign = if exponent < 0 {
            "-"
        } else if spec.sign_always {
            "+"
        } else {
            ""
        };
        format!(
            "{mantissa_str}{}{sign}{:0width$}",
            spec.e_char,
            exponent.abs(),
            width = spec.width
        )
    }

    pub(crate) fn parse(&self, text: &str, locale: Locale) -> Result<f64, PatternError> {
        let mut s = text.trim();
        let negative = s.starts_with('-');
        if negative {
            s = &s[1..];
        }
        let s = s.strip_prefix(self.prefix.as_str()).unwrap_or(s);
        let s = s.strip_suffix(self.suffix.as_str()).unwrap_or(s);

        let mut digits = String::with_capacity(s.len());
        for c in s.chars() {
            if Some(c) == locale.thousands_sep {
                continue;
            }
            if c == locale.decimal_sep {
                digits.push('.');
            } else {
                digits.push(c);
            }
        }

        let mut parsed: f64 = digits
            .parse()
            .map_err(|_| PatternError::new(format!("not a number: {text:?}")))?;
        if self.percent {
            parsed /= 100.0;
        }
        if negative {
            parsed = -parsed;
        }
        Ok(parsed)
    }
}

/// Plain rendering with locale separators, used when a column declares no
/// pattern.
pub(crate) fn format_plain(value: f64, locale: Locale) -> String {
    let s = value.to_string();

    // Preserve scientific notation as-is except for the decimal separator.
    if let Some(idx) = s.find(['e', 'E']) {
        let (mantissa, exp) = s.split_at(idx);
        return format!("{}{exp}", plain_mantissa(mantissa, locale));
    }
    plain_mantissa(&s, locale)
}

pub(crate) fn parse_plain(text: &str, locale: Locale) -> Result<f64, PatternError> {
    let mut digits = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if Some(c) == locale.thousands_sep {
            continue;
        }
        if c == locale.decimal_sep {
            digits.push('.');
        } else {
            digits.push(c);
        }
    }
    digits
        .parse()
        .map_err(|_| PatternError::new(format!("not a number: {text:?}")))
}

fn plain_mantissa(mantissa: &str, locale: Locale) -> String {
    let (sign, unsigned) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        // NaN / inf: leave unchanged.
        return mantissa.to_string();
    }

    let grouped_int = match locale.thousands_sep {
        Some(sep) => group_thousands(int_part, sep),
        None => int_part.to_string(),
    };

    if frac_part.is_empty() {
        format!("{sign}{grouped_int}")
    } else {
        format!("{sign}{grouped_int}{}{frac_part}", locale.decimal_sep)
    }
}

fn round_to(value: f64, decimals: usize) -> f64 {
    if decimals == 0 {
        return value.round();
    }
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn group_thousands(int_part: &str, sep: char) -> String {
    let len = int_part.len();
    if len <= 3 {
        return int_part.to_string();
    }

    let mut out = String::with_capacity(len + len / 3);
    let mut first_group = len % 3;
    if first_group == 0 {
        first_group = 3;
    }

    out.push_str(&int_part[..first_group]);
    let mut idx = first_group;
    while idx < len {
        out.push(sep);
        out.push_str(&int_part[idx..idx + 3]);
        idx += 3;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_patterns_round_group_and_pad() {
        let locale = Locale::en_us();
        let p = NumberPattern::compile("#,##0.00").unwrap();
        assert_eq!(p.format(1234.567, locale), "1,234.57");
        assert_eq!(p.format(0.5, locale), "0.50");
        assert_eq!(p.format(-3.0, locale), "-3.00");

        let optional = NumberPattern::compile("0.##").unwrap();
        assert_eq!(optional.format(1.5, locale), "1.5");
        assert_eq!(optional.format(2.0, locale), "2");
    }

    #[test]
    fn prefix_suffix_and_percent() {
        let locale = Locale::en_us();
        let money = NumberPattern::compile("$#,##0").unwrap();
        assert_eq!(money.format(1999.2, locale), "$1,999");

        let pct = NumberPattern::compile("0.0%").unwrap();
        assert_eq!(pct.format(0.125, locale), "12.5%");
        assert_eq!(pct.parse("12.5%", locale).unwrap(), 0.125);
    }

    #[test]
    fn locale_separators_apply() {
        let p = NumberPattern::compile("#,##0.0").unwrap();
        assert_eq!(p.format(1234.5, Locale::de_de()), "1.234,5");
        assert_eq!(format_plain(1234567.5, Locale::de_de()), "1.234.567,5");
        assert_eq!(parse_plain("1.234,5", Locale::de_de()).unwrap(), 1234.5);
    }

    #[test]
    fn scientific_patterns() {
        let locale = Locale::en_us();
        let p = NumberPattern::compile("0.00E+00").unwrap();
        assert_eq!(p.format(12345.0, locale), "1.23E+04");
        assert_eq!(p.format(0.00123, locale), "1.23E-03");
        assert_eq!(p.format(0.0, locale), "0.00E+00");
        assert_eq!(p.format(-250.0, locale), "-2.50E+02");

        let unsigned = NumberPattern::compile("0.#E0").unwrap();
        assert_eq!(unsigned.format(9999.0, locale), "1E4");

        assert_eq!(p.parse("1.23E+04", locale).unwrap(), 12300.0);
    }

    #[test]
    fn malformed_patterns_fail_to_compile() {
        assert!(NumberPattern::compile("no digits").is_err());
        assert!(NumberPattern::compile("0.0.0").is_err());
        assert!(NumberPattern::compile("0.0,0").is_err());
    }
}
