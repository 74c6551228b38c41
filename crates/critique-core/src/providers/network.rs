//! Outbound network policy for the LLM gateway.
//!
//! `loopback_only` keeps a process hermetic: the gateway may still reach a
//! local stand-in server, but any other host is refused before a socket opens.

use crate::errors::CritiqueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    #[default]
    Open,
    LoopbackOnly,
}

impl NetworkPolicy {
    /// Refuses `target` unless the policy allows its host.
    pub fn check(&self, target: &str) -> Result<(), CritiqueError> {
        match self {
            Self::Open => Ok(()),
            Self::LoopbackOnly if is_loopback(target) => Ok(()),
            Self::LoopbackOnly => Err(CritiqueError::config(format!(
                "outbound network blocked by policy loopback_only (target={})",
                target
            ))),
        }
    }
}

fn is_loopback(target: &str) -> bool {
    let Ok(url) = Url::parse(target) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

impl fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::LoopbackOnly => "loopback_only",
        })
    }
}

impl FromStr for NetworkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" | "allow" => Ok(Self::Open),
            "loopback_only" | "loopback" | "deny" => Ok(Self::LoopbackOnly),
            other => Err(format!(
                "unknown network policy '{}' (expected open or loopback_only)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_only_refuses_remote_hosts() {
        let policy = NetworkPolicy::LoopbackOnly;
        let err = policy
            .check("https://api.deepseek.com/v1/chat/completions")
            .unwrap_err();
        assert!(matches!(err, CritiqueError::Config { .. }));
        assert!(err.to_string().contains("api.deepseek.com"));

        policy.check("http://127.0.0.1:4010/v1/chat/completions").unwrap();
        policy.check("http://[::1]:4010/v1").unwrap();
        policy.check("http://LOCALHOST:8080").unwrap();
        assert!(policy.check("not a url").is_err());
    }

    #[test]
    fn open_allows_everything() {
        NetworkPolicy::Open
            .check("https://api.deepseek.com/v1/chat/completions")
            .unwrap();
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("deny".parse::<NetworkPolicy>().unwrap(), NetworkPolicy::LoopbackOnly);
        assert_eq!("Loopback-Only".parse::<NetworkPolicy>().unwrap(), NetworkPolicy::LoopbackOnly);
        assert_eq!("allow".parse::<NetworkPolicy>().unwrap(), NetworkPolicy::Open);
        assert!("offline".parse::<NetworkPolicy>().is_err());
        assert_eq!(NetworkPolicy::LoopbackOnly.to_string(), "loopback_only");
    }
}
