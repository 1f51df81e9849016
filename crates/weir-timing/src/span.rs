use std::str::FromStr;

use serde::{Deserializer, Serialize};

/// Millisecond duration for configuration and scheduling.
///
/// Deserializes from a bare integer (milliseconds) or a humantime
/// string such as `"250ms"`, `"10s"` or `"2m"`.
#[derive(Copy, Clone, Debug, Default, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Span(pub u64);

impl Span {
    pub const ZERO: Span = Span(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Span(ms)
    }

    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Span(s * 1_000)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<Span> for std::time::Duration {
    #[inline]
    fn from(value: Span) -> Self {
        std::time::Duration::from_millis(value.0)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_duration(std::time::Duration::from_millis(self.0)))
    }
}

impl FromStr for Span {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = s.trim().parse::<humantime::Duration>()?;
        Ok(Span(std::time::Duration::from(d).as_millis() as u64))
    }
}

impl<'de> serde::Deserialize<'de> for Span {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use std::fmt;

        use serde::de::{self, Visitor};

        struct SpanVisitor;

        impl Visitor<'_> for SpanVisitor {
            type Value = Span;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an integer (milliseconds) or a duration string")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Span(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                if value < 0 {
                    return Err(E::custom(format!("duration cannot be negative, got {value}")));
                }
                Ok(Span(value as u64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Span::from_str(value)
                    .map_err(|e| E::custom(format!("bad duration '{value}': {e}")))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_any(SpanVisitor)
        } else {
            u64::deserialize(deserializer).map(Span)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_from_number() {
        let s: Span = serde_json::from_str("250").unwrap();
        assert_eq!(s, Span::from_millis(250));
    }

    #[test]
    fn span_from_string_seconds() {
        let s: Span = serde_json::from_str(r#""10s""#).unwrap();
        assert_eq!(s, Span::from_secs(10));
    }

    #[test]
    fn span_from_string_millis() {
        let s: Span = serde_json::from_str(r#""15ms""#).unwrap();
        assert_eq!(s, Span::from_millis(15));
    }
}
