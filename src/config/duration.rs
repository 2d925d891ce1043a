//! Parses Go-style duration strings (`"60s"`, `"5m"`, `"1h30m"`) as they appear
//! in the collector's YAML config. The original source embeds `time.Duration`
//! fields directly in the YAML schema; this is the Rust-side equivalent of
//! that parsing, since `serde_yaml` has no built-in notion of a duration.

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A duration that (de)serializes from/to a Go-style duration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoDuration(pub Duration);

impl From<GoDuration> for Duration {
    fn from(value: GoDuration) -> Self {
        value.0
    }
}

impl From<Duration> for GoDuration {
    fn from(value: Duration) -> Self {
        GoDuration(value)
    }
}

impl<'de> Deserialize<'de> for GoDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw)
            .map(GoDuration)
            .map_err(de::Error::custom)
    }
}

impl Serialize for GoDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(self.0))
    }
}

/// Parses a Go-style duration string: one or more `<number><unit>` segments
/// concatenated, e.g. `"10s"`, `"1h30m"`, `"250ms"`. Units: `ns`, `us`/`µs`,
/// `ms`, `s`, `m`, `h`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration string".to_string());
    }

    let mut total = Duration::ZERO;
    let mut chars = raw.char_indices().peekable();
    let mut consumed_any = false;

    while let Some(&(start, c)) = chars.peek() {
        if !c.is_ascii_digit() && c != '.' {
            return Err(format!("invalid duration {raw:?}: expected a number"));
        }
        let mut end = start;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = idx + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let number: f64 = raw[start..end]
            .parse()
            .map_err(|_| format!("invalid duration {raw:?}: bad number"))?;

        let unit_start = end;
        let mut unit_end = end;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_alphabetic() || c == 'µ' {
                unit_end = idx + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if unit_start == unit_end {
            return Err(format!("invalid duration {raw:?}: missing unit"));
        }
        let unit = &raw[unit_start..unit_end];
        let nanos_per_unit: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60_000_000_000.0,
            "h" => 3_600_000_000_000.0,
            other => return Err(format!("invalid duration {raw:?}: unknown unit {other:?}")),
        };
        total += Duration::from_nanos((number * nanos_per_unit).round() as u64);
        consumed_any = true;
    }

    if !consumed_any {
        return Err(format!("invalid duration {raw:?}"));
    }
    Ok(total)
}

/// Renders a [`Duration`] back into a Go-style string, used only for
/// round-tripping config back out (e.g. the API's debug dump).
pub fn format_duration(d: Duration) -> String {
    if d.as_nanos() == 0 {
        return "0s".to_string();
    }
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs}s")
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(3600 + 1800)
        );
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse_duration("10").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_duration("").is_err());
    }
}
