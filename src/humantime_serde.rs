//! Serde support for [`humantime`], used by the config types' `Duration` fields.
//!
//! ```ignore
//! use serde::{Serialize, Deserialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Foo {
//!     #[serde(with = "crate::humantime_serde")]
//!     timeout: Duration,
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{de, Deserializer, Serializer};

/// Deserializes a `Duration` via the humantime crate.
///
/// # Errors
/// Returns a deserializer error if the string is not a valid duration.
pub fn deserialize<'a, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'a>,
{
    struct V;

    impl de::Visitor<'_> for V {
        type Value = Duration;

        fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt.write_str("a duration, e.g. \"30s\"")
        }

        fn visit_str<E>(self, v: &str) -> Result<Duration, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    d.deserialize_str(V)
}

/// Serializes a `Duration` via the humantime crate.
///
/// # Errors
/// Returns a serializer error if the underlying serializer rejects the string.
pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&humantime::format_duration(*d).to_string())
}

/// Convenience module for `Option<Duration>` fields.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    /// Returns a serializer error if the underlying serializer rejects the string.
    pub fn serialize<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => super::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    /// # Errors
    /// Returns a deserializer error if the string is not a valid duration.
    pub fn deserialize<'a, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'a>,
    {
        Option::deserialize(d).and_then(|opt: Option<String>| {
            opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[test]
    fn duration_round_trips() {
        #[derive(Serialize, Deserialize)]
        struct Foo {
            #[serde(with = "super")]
            time: Duration,
        }

        let foo: Foo = serde_json::from_str(r#"{"time": "15 seconds"}"#).unwrap();
        assert_eq!(foo.time, Duration::from_secs(15));
        assert_eq!(serde_json::to_string(&foo).unwrap(), r#"{"time":"15s"}"#);
    }

    #[test]
    fn option_duration_round_trips() {
        #[derive(Serialize, Deserialize)]
        struct Foo {
            #[serde(with = "super::option", default)]
            time: Option<Duration>,
        }

        let foo: Foo = serde_json::from_str(r#"{"time": "2s"}"#).unwrap();
        assert_eq!(foo.time, Some(Duration::from_secs(2)));

        let none: Foo = serde_json::from_str(r#"{"time": null}"#).unwrap();
        assert_eq!(none.time, None);
    }
}
