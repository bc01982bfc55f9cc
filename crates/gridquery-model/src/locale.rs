use std::cmp::Ordering;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Value;

/// A user-facing locale: an identifier plus the separators needed by plain
/// number rendering and the collation rule for TEXT values.
///
/// This is intentionally lightweight; richer pattern-driven formatting lives
/// in the formatting crate and takes a `Locale` as input. Serde represents a
/// locale by its id so payloads stay compact and registry-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locale {
    pub id: &'static str,
    /// Decimal separator (e.g. `.` in `en-US`, `,` in many EU locales).
    pub decimal_sep: char,
    /// Thousands separator, if the locale groups digits.
    pub thousands_sep: Option<char>,
    /// Whether TEXT collation folds case (the closest portable approximation
    /// of a full Unicode collator).
    pub case_insensitive_collation: bool,
}

impl Locale {
    pub const fn en_us() -> Self {
        Self {
            id: "en-US",
            decimal_sep: '.',
            thousands_sep: Some(','),
            case_insensitive_collation: true,
        }
    }

    /// British English uses the same separators as `en-US`.
    pub const fn en_gb() -> Self {
        Self {
            id: "en-GB",
            decimal_sep: '.',
            thousands_sep: Some(','),
            case_insensitive_collation: true,
        }
    }

    pub const fn de_de() -> Self {
        Self {
            id: "de-DE",
            decimal_sep: ',',
            thousands_sep: Some('.'),
            case_insensitive_collation: true,
        }
    }

    pub const fn fr_fr() -> Self {
        Self {
            id: "fr-FR",
            decimal_sep: ',',
            thousands_sep: Some('\u{00A0}'),
            case_insensitive_collation: true,
        }
    }

    pub const fn es_es() -> Self {
        Self {
            id: "es-ES",
            decimal_sep: ',',
            thousands_sep: Some('.'),
            case_insensitive_collation: true,
        }
    }

    pub const fn it_it() -> Self {
        Self {
            id: "it-IT",
            decimal_sep: ',',
            thousands_sep: Some('.'),
            case_insensitive_collation: true,
        }
    }

    /// Swiss locales group digits with an apostrophe.
    pub const fn de_ch() -> Self {
        Self {
            id: "de-CH",
            decimal_sep: '.',
            thousands_sep: Some('\''),
            case_insensitive_collation: true,
        }
    }

    pub const fn fr_ch() -> Self {
        Self {
            id: "fr-CH",
            decimal_sep: '.',
            thousands_sep: Some('\''),
            case_insensitive_collation: true,
        }
    }

    pub fn get(id: &str) -> Option<Self> {
        match id {
            "en-US" => Some(Self::en_us()),
            "en-GB" => Some(Self::en_gb()),
            "de-DE" => Some(Self::de_de()),
            "fr-FR" => Some(Self::fr_fr()),
            "es-ES" => Some(Self::es_es()),
            "it-IT" => Some(Self::it_it()),
            "de-CH" => Some(Self::de_ch()),
            "fr-CH" => Some(Self::fr_ch()),
            _ => None,
        }
    }

    /// Locale-bound TEXT collation.
    ///
    /// Uses Unicode-aware case folding as the primary key with a
    /// case-sensitive tiebreak so the ordering stays total.
    pub fn compare_text(&self, a: &str, b: &str) -> Ordering {
        if !self.case_insensitive_collation {
            return a.cmp(b);
        }
        let ord = cmp_text_case_insensitive(a, b);
        if ord != Ordering::Equal {
            ord
        } else {
            a.cmp(b)
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_us()
    }
}

impl Serialize for Locale {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id)
    }
}

impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        Locale::get(&id).ok_or_else(|| D::Error::custom(format!("unknown locale: {id}")))
    }
}

fn cmp_text_case_insensitive(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        return cmp_ascii_case_insensitive(a, b);
    }

    // Compare using Unicode-aware uppercasing so semantics hold for
    // non-ASCII text (e.g. ß -> SS).
    let mut a_iter = a.chars().flat_map(|c| c.to_uppercase());
    let mut b_iter = b.chars().flat_map(|c| c.to_uppercase());
    loop {
        match (a_iter.next(), b_iter.next()) {
            (Some(ac), Some(bc)) => match ac.cmp(&bc) {
                Ordering::Equal => continue,
                ord => return ord,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

fn cmp_ascii_case_insensitive(a: &str, b: &str) -> Ordering {
    let mut a_iter = a.as_bytes().iter();
    let mut b_iter = b.as_bytes().iter();
    loop {
        match (a_iter.next(), b_iter.next()) {
            (Some(&ac), Some(&bc)) => {
                let ac = ac.to_ascii_uppercase();
                let bc = bc.to_ascii_uppercase();
                match ac.cmp(&bc) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Compares values of one type, delegating TEXT to the locale collator and
/// every other type to the default ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueComparator {
    locale: Locale,
}

impl ValueComparator {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Text(Some(left)), Value::Text(Some(right))) => {
                self.locale.compare_text(left, right)
            }
            _ => a.cmp(b),
        }
    }

    /// Lexicographic comparison of two equal-length value vectors.
    pub fn compare_seq(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (left, right) in a.iter().zip(b.iter()) {
            match self.compare(left, right) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        a.len().cmp(&b.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collation_folds_case_with_deterministic_tiebreak() {
        let locale = Locale::en_us();
        assert_eq!(locale.compare_text("alpha", "BETA"), Ordering::Less);
        assert_eq!(locale.compare_text("Beta", "beta"), Ordering::Less);
        assert_eq!(locale.compare_text("x", "x"), Ordering::Equal);
    }

    #[test]
    fn comparator_uses_collation_only_for_text() {
        let cmp = ValueComparator::new(Locale::en_us());
        assert_eq!(
            cmp.compare(&Value::text("a"), &Value::text("B")),
            Ordering::Less
        );
        // Byte order would say 'B' < 'a'.
        assert_eq!(Value::text("a").cmp(&Value::text("B")), Ordering::Greater);
        assert_eq!(
            cmp.compare(&Value::number(2.0), &Value::number(10.0)),
            Ordering::Less
        );
    }

    #[test]
    fn registry_resolves_known_ids() {
        assert_eq!(Locale::get("de-DE").unwrap().decimal_sep, ',');
        assert_eq!(Locale::get("de-CH").unwrap().thousands_sep, Some('\''));
        assert!(Locale::get("xx-XX").is_none());
    }

    #[test]
    fn sequences_compare_lexicographically() {
        let cmp = ValueComparator::new(Locale::en_us());
        let a = [Value::text("m"), Value::number(1.0)];
        let b = [Value::text("m"), Value::number(2.0)];
        assert_eq!(cmp.compare_seq(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare_seq(&b, &a), Ordering::Greater);
        assert_eq!(cmp.compare_seq(&a, &a), Ordering::Equal);
        // A strict prefix sorts first.
        assert_eq!(cmp.compare_seq(&a[..1], &a), Ordering::Less);
    }
}
