// Serde helpers for store records.
//
// Records written by the analytics jobs are not strictly typed: identifiers
// and counters arrive either as JSON numbers or as numeric strings.

use serde::de::{self, Deserializer, Unexpected, Visitor};
use std::fmt;

/// Deserialize an identifier that may be a string or an integer into a `String`.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or integer identifier")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Deserialize an integer that may be encoded as a number or a numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct CountVisitor;

    impl<'de> Visitor<'de> for CountVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer or numeric string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            let trimmed = v.trim();
            trimmed
                .parse::<i64>()
                .or_else(|_| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                        .ok_or(())
                })
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(CountVisitor)
}

/// Optional variant of [`lenient_i64`]; `null` maps to `None`.
pub fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_i64")] i64);

    let value: Option<Wrapper> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.map(|Wrapper(v)| v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Record {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
        #[serde(deserialize_with = "lenient_i64")]
        count: i64,
        #[serde(default, deserialize_with = "lenient_opt_i64")]
        feed_id: Option<i64>,
    }

    #[test]
    fn test_numbers_and_strings() {
        let r: Record = serde_json::from_str(r#"{"id": 666666, "count": "-14"}"#).unwrap();
        assert_eq!(r.id, "666666");
        assert_eq!(r.count, -14);
        assert_eq!(r.feed_id, None);

        let r: Record =
            serde_json::from_str(r#"{"id": "abc", "count": 3, "feed_id": "1"}"#).unwrap();
        assert_eq!(r.id, "abc");
        assert_eq!(r.count, 3);
        assert_eq!(r.feed_id, Some(1));
    }

    #[test]
    fn test_rejects_garbage_counts() {
        assert!(serde_json::from_str::<Record>(r#"{"id": 1, "count": "many"}"#).is_err());
        assert!(serde_json::from_str::<Record>(r#"{"id": 1, "count": 1.5}"#).is_err());
    }
}
