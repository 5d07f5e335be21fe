//! Read policies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which members may answer a read
///
/// Immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReadPolicy {
    /// Only the primary
    #[default]
    Primary,
    /// Secondaries, falling back to the primary when none is healthy
    SecondaryPreferred,
    /// Any healthy member, lowest latency first
    Nearest,
    /// Only members whose `region` tag equals the name
    TaggedRegion(String),
}

impl ReadPolicy {
    pub fn tagged_region(region: impl Into<String>) -> Self {
        Self::TaggedRegion(region.into())
    }

    /// Region this policy pins reads to, if any.
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::TaggedRegion(region) => Some(region),
            _ => None,
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::SecondaryPreferred => f.write_str("secondaryPreferred"),
            Self::Nearest => f.write_str("nearest"),
            Self::TaggedRegion(region) => write!(f, "region:{}", region),
        }
    }
}

impl FromStr for ReadPolicy {
    type Err = String;

    /// Accepts `primary`, `secondaryPreferred` (or `secondary-preferred`),
    /// `nearest` and `region:<name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(region) = s.strip_prefix("region:") {
            let region = region.trim();
            if region.is_empty() {
                return Err("region policy needs a region name".to_string());
            }
            return Ok(Self::TaggedRegion(region.to_string()));
        }

        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "primary" => Ok(Self::Primary),
            "secondarypreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            _ => Err(format!("unknown read policy '{}'", s)),
        }
    }
}

impl TryFrom<String> for ReadPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReadPolicy> for String {
    fn from(policy: ReadPolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_primary() {
        assert_eq!(ReadPolicy::default(), ReadPolicy::Primary);
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("primary".parse::<ReadPolicy>().unwrap(), ReadPolicy::Primary);
        assert_eq!("secondaryPreferred".parse::<ReadPolicy>().unwrap(), ReadPolicy::SecondaryPreferred);
        assert_eq!("secondary-preferred".parse::<ReadPolicy>().unwrap(), ReadPolicy::SecondaryPreferred);
        assert_eq!("Nearest".parse::<ReadPolicy>().unwrap(), ReadPolicy::Nearest);
    }

    #[test]
    fn test_parse_region_keeps_case() {
        let policy: ReadPolicy = "region:West US".parse().unwrap();
        assert_eq!(policy, ReadPolicy::tagged_region("West US"));
        assert_eq!(policy.region(), Some("West US"));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("secondary".parse::<ReadPolicy>().is_err());
        assert!("region:".parse::<ReadPolicy>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for policy in [
            ReadPolicy::Primary,
            ReadPolicy::SecondaryPreferred,
            ReadPolicy::Nearest,
            ReadPolicy::tagged_region("East US"),
        ] {
            assert_eq!(policy.to_string().parse::<ReadPolicy>().unwrap(), policy);
        }
    }
}
