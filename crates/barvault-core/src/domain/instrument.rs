use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ValidationError;

/// Exchange-qualified instrument code, e.g. `600000.SH` or `399300.SZ`.
///
/// Shape is `CODE.VENUE`: a non-empty alphanumeric body, one dot, and a
/// 2-4 letter uppercase venue suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrumentCode(String);

impl InstrumentCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let bad = || ValidationError::BadInstrumentCode {
            value: input.to_owned(),
        };

        let (body, venue) = input.split_once('.').ok_or_else(bad)?;
        if body.is_empty() || venue.is_empty() {
            return Err(bad());
        }
        if !body.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(bad());
        }
        if venue.len() < 2
            || venue.len() > 4
            || !venue.chars().all(|ch| ch.is_ascii_uppercase())
        {
            return Err(bad());
        }

        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Venue suffix after the dot, e.g. `SH`.
    pub fn venue(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(_, venue)| venue)
            .expect("validated code always contains a dot")
    }
}

impl Display for InstrumentCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for InstrumentCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InstrumentCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
