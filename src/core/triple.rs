//! Target platform triples.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Target triple components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetTriple {
    /// CPU architecture (x86_64, aarch64, etc.)
    pub arch: String,
    /// Vendor (unknown, apple, pc, etc.)
    pub vendor: String,
    /// Operating system (linux, darwin, windows, etc.)
    pub os: String,
    /// Environment/ABI (gnu, musl, msvc, etc.)
    pub env: Option<String>,
}

impl TargetTriple {
    /// Create a new target triple.
    pub fn new(arch: &str, vendor: &str, os: &str, env: Option<&str>) -> Self {
        TargetTriple {
            arch: arch.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            env: env.map(|s| s.to_string()),
        }
    }

    /// Detect the host target triple.
    pub fn host() -> Self {
        let arch = std::env::consts::ARCH;
        let os = std::env::consts::OS;

        let (vendor, env) = match os {
            "linux" => ("unknown", Some("gnu")),
            "macos" => ("apple", None),
            "windows" => ("pc", Some("msvc")),
            _ => ("unknown", None),
        };

        TargetTriple::new(arch, vendor, os, env)
    }

    /// Parse a target triple string.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        Some(TargetTriple {
            arch: parts[0].to_string(),
            vendor: parts[1].to_string(),
            os: parts[2].to_string(),
            env: parts.get(3).map(|s| s.to_string()),
        })
    }

    /// Operating system with the `darwin`/`macos` spellings folded together.
    pub fn normalized_os(&self) -> &str {
        match self.os.as_str() {
            "darwin" | "macos" => "macos",
            other => other,
        }
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env {
            Some(env) => write!(f, "{}-{}-{}-{}", self.arch, self.vendor, self.os, env),
            None => write!(f, "{}-{}-{}", self.arch, self.vendor, self.os),
        }
    }
}

/// Error for malformed triples.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid target triple `{0}` (expected <arch>-<vendor>-<os>[-<env>])")]
pub struct TripleParseError(pub String);

impl FromStr for TargetTriple {
    type Err = TripleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetTriple::parse(s).ok_or_else(|| TripleParseError(s.to_string()))
    }
}

impl Serialize for TargetTriple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetTriple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let triple: TargetTriple = "x86_64-unknown-linux-gnu".parse().unwrap();
        assert_eq!(triple.arch, "x86_64");
        assert_eq!(triple.os, "linux");
        assert_eq!(triple.env.as_deref(), Some("gnu"));
        assert_eq!(triple.to_string(), "x86_64-unknown-linux-gnu");

        let mac: TargetTriple = "aarch64-apple-darwin".parse().unwrap();
        assert_eq!(mac.env, None);
        assert_eq!(mac.normalized_os(), "macos");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("x86_64".parse::<TargetTriple>().is_err());
        assert!("x86_64--linux".parse::<TargetTriple>().is_err());
        assert!("a-b-c-d-e".parse::<TargetTriple>().is_err());
    }

    #[test]
    fn test_host_is_well_formed() {
        let host = TargetTriple::host();
        let reparsed: TargetTriple = host.to_string().parse().unwrap();
        assert_eq!(host, reparsed);
    }
}
