//! Colour map names.
//!
//! The stop tables themselves live in the renderer crate; this enum is the
//! part of the style vocabulary that dataset descriptors, cache keys and the
//! shareable state refer to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColourMapName {
    YlOrRd,
    #[serde(rename = "RdYlBu_r")]
    RdYlBuR,
    YlGnBu,
    Viridis,
    Cividis,
    Plasma,
    Inferno,
}

impl ColourMapName {
    pub const ALL: [ColourMapName; 7] = [
        ColourMapName::YlOrRd,
        ColourMapName::RdYlBuR,
        ColourMapName::YlGnBu,
        ColourMapName::Viridis,
        ColourMapName::Cividis,
        ColourMapName::Plasma,
        ColourMapName::Inferno,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColourMapName::YlOrRd => "YlOrRd",
            ColourMapName::RdYlBuR => "RdYlBu_r",
            ColourMapName::YlGnBu => "YlGnBu",
            ColourMapName::Viridis => "Viridis",
            ColourMapName::Cividis => "Cividis",
            ColourMapName::Plasma => "Plasma",
            ColourMapName::Inferno => "Inferno",
        }
    }
}

impl fmt::Display for ColourMapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColourMapName {
    type Err = EngineError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColourMapName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::config(format!("unknown colour map: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for name in ColourMapName::ALL {
            assert_eq!(name.as_str().parse::<ColourMapName>().unwrap(), name);
        }
        assert_eq!("viridis".parse::<ColourMapName>().unwrap(), ColourMapName::Viridis);
        assert!("jet".parse::<ColourMapName>().is_err());
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&ColourMapName::RdYlBuR).unwrap();
        assert_eq!(json, "\"RdYlBu_r\"");
    }
}
