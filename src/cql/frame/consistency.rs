// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the consistency enum.

use anyhow::anyhow;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    convert::TryFrom,
    fmt::Display,
    str::FromStr,
};

/// The consistency level of a request. Passed through to the store as is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum Consistency {
    /// The any consistency level.
    Any = 0x0,
    /// The one consistency level.
    One = 0x1,
    /// The two consistency level.
    Two = 0x2,
    /// The three consistency level.
    Three = 0x3,
    /// The quorum consistency level.
    Quorum = 0x4,
    /// The all consistency level.
    All = 0x5,
    /// The local quorum consistency level.
    LocalQuorum = 0x6,
    /// The each quorum consistency level.
    EachQuorum = 0x7,
    /// The serial consistency level.
    Serial = 0x8,
    /// The local serial consistency level.
    LocalSerial = 0x9,
    /// The local one consistency level.
    LocalOne = 0xA,
}

impl Consistency {
    /// The configuration name of the level, e.g. `LOCAL_ONE`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Three => "THREE",
            Self::Quorum => "QUORUM",
            Self::All => "ALL",
            Self::LocalQuorum => "LOCAL_QUORUM",
            Self::EachQuorum => "EACH_QUORUM",
            Self::Serial => "SERIAL",
            Self::LocalSerial => "LOCAL_SERIAL",
            Self::LocalOne => "LOCAL_ONE",
        }
    }

    /// Whether the level may be used as a serial consistency.
    pub fn is_serial(&self) -> bool {
        matches!(self, Self::Serial | Self::LocalSerial)
    }
}

impl Default for Consistency {
    fn default() -> Self {
        Self::LocalOne
    }
}

impl Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Consistency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        (0..=0xA_u16)
            .filter_map(Consistency::from_u16)
            .find(|c| c.name() == upper)
            .ok_or_else(|| anyhow!("Unknown consistency level: {}", s))
    }
}

impl TryFrom<u16> for Consistency {
    type Error = anyhow::Error;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Consistency::from_u16(code).ok_or_else(|| anyhow!("No consistency representation for {:#06x}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configuration_names() {
        assert_eq!("LOCAL_QUORUM".parse::<Consistency>().unwrap(), Consistency::LocalQuorum);
        assert_eq!("local_one".parse::<Consistency>().unwrap(), Consistency::LocalOne);
        assert_eq!(" each_quorum ".parse::<Consistency>().unwrap(), Consistency::EachQuorum);
        assert!("MOSTLY".parse::<Consistency>().is_err());
    }

    #[test]
    fn wire_codes_match_the_protocol() {
        assert_eq!(Consistency::LocalOne as u16, 0x0A);
        assert_eq!(Consistency::try_from(0x04).unwrap(), Consistency::Quorum);
        assert!(Consistency::try_from(0x0B).is_err());
    }

    #[test]
    fn serde_uses_configuration_names() {
        let c: Consistency = serde_json::from_str("\"LOCAL_SERIAL\"").unwrap();
        assert_eq!(c, Consistency::LocalSerial);
        assert!(c.is_serial());
        assert_eq!(serde_json::to_string(&Consistency::All).unwrap(), "\"ALL\"");
    }
}
