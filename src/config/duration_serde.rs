//! Common serde utilities for human-readable durations across configuration.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

fn parse_human(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| format!("Invalid duration '{value}': {e}"))
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration as seconds (number) or human-readable string (e.g., '5s', '15m', '1h30m')")
    }

    fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_secs(seconds))
    }

    fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(seconds)
            .map(Duration::from_secs)
            .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        parse_human(value).map_err(de::Error::custom)
    }
}

/// Custom serde functions for Duration that support human-readable strings
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Custom serde functions for Option<Duration> that support human-readable strings
pub mod option_duration {
    use super::*;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                let duration_str = humantime::format_duration(*d).to_string();
                serializer.serialize_some(&duration_str)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OptionDurationVisitor;

        impl<'de> Visitor<'de> for OptionDurationVisitor {
            type Value = Option<Duration>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an optional duration")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(DurationVisitor).map(Some)
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DurationVisitor.visit_u64(seconds).map(Some)
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DurationVisitor.visit_i64(seconds).map(Some)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                DurationVisitor.visit_str(value).map(Some)
            }
        }

        deserializer.deserialize_option(OptionDurationVisitor)
    }
}

/// Serde functions for a list of human-readable durations (backoff schedules)
pub mod duration_vec {
    use super::*;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(durations.len()))?;
        for d in durations {
            seq.serialize_element(&humantime::format_duration(*d).to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationSeqVisitor;

        impl<'de> Visitor<'de> for DurationSeqVisitor {
            type Value = Vec<Duration>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a list of durations")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut out = Vec::new();
                while let Some(item) = seq.next_element::<serde_json::Value>()? {
                    let parsed = match item {
                        serde_json::Value::String(s) => parse_human(&s),
                        serde_json::Value::Number(n) => n
                            .as_u64()
                            .map(Duration::from_secs)
                            .ok_or_else(|| format!("Invalid duration seconds: {n}")),
                        other => Err(format!("Invalid duration entry: {other}")),
                    };
                    out.push(parsed.map_err(de::Error::custom)?);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_seq(DurationSeqVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "duration")]
        timeout: Duration,
        #[serde(with = "duration_vec")]
        schedule: Vec<Duration>,
        #[serde(default, with = "option_duration")]
        deadline: Option<Duration>,
    }

    #[test]
    fn test_human_readable_durations() {
        let parsed: Sample = toml::from_str(
            r#"
            timeout = "5s"
            schedule = ["1m", "5m", 900]
            deadline = "2m"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.timeout, Duration::from_secs(5));
        assert_eq!(
            parsed.schedule,
            vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900)
            ]
        );
        assert_eq!(parsed.deadline, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_missing_optional_duration() {
        let parsed: Sample = toml::from_str(
            r#"
            timeout = 3
            schedule = []
            "#,
        )
        .unwrap();
        assert_eq!(parsed.timeout, Duration::from_secs(3));
        assert!(parsed.schedule.is_empty());
        assert_eq!(parsed.deadline, None);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let parsed: Result<Sample, _> = toml::from_str(
            r#"
            timeout = "soon"
            schedule = []
            "#,
        );
        assert!(parsed.is_err());
    }
}
