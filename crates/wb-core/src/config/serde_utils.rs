//! Shared serialization helpers for configuration

/// Serialize `std::time::Duration` as whole seconds
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "wb_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serialize `std::time::Duration` as milliseconds, for sub-second knobs
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        connect: Duration,
        #[serde(with = "duration_millis")]
        poll: Duration,
    }

    #[test]
    fn test_duration_serialize() {
        let t = Timeouts {
            connect: Duration::from_secs(30),
            poll: Duration::from_millis(250),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"connect":30,"poll":250}"#);
    }

    #[test]
    fn test_duration_deserialize() {
        let t: Timeouts = serde_json::from_str(r#"{"connect":5,"poll":1500}"#).unwrap();
        assert_eq!(t.connect, Duration::from_secs(5));
        assert_eq!(t.poll, Duration::from_millis(1500));
    }
}
