//! Endpoint addresses: `aip://agent_id[/channel_id][?session=session_id]`.
//!
//! Addresses serialize on the wire as the URI string. Comparison is
//! exact-field: an absent channel/session means "unspecified", not a
//! wildcard.

use crate::error::GatewayError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// URI scheme for agent addresses.
pub const ADDRESS_SCHEME: &str = "aip";

/// Identifies an agent endpoint, optionally narrowed to a channel and session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub agent_id: String,
    pub channel_id: Option<String>,
    pub session_id: Option<String>,
}

impl Address {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel_id: None,
            session_id: None,
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Parse from URI form. Fails unless the URI starts with `aip://` and
    /// names a non-empty agent id.
    pub fn parse(uri: &str) -> Result<Self, GatewayError> {
        let prefix = format!("{}://", ADDRESS_SCHEME);
        let rest = uri
            .strip_prefix(&prefix)
            .ok_or_else(|| GatewayError::MalformedAddress(uri.to_string()))?;
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };
        let (agent_id, channel_id) = match path.split_once('/') {
            Some((a, c)) if !c.is_empty() => (a, Some(c.to_string())),
            Some((a, _)) => (a, None),
            None => (path, None),
        };
        if agent_id.is_empty() {
            return Err(GatewayError::MalformedAddress(uri.to_string()));
        }
        let session_id = query.and_then(|q| {
            q.split('&').find_map(|pair| {
                pair.strip_prefix("session=")
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_string())
            })
        });
        Ok(Self {
            agent_id: agent_id.to_string(),
            channel_id,
            session_id,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", ADDRESS_SCHEME, self.agent_id)?;
        if let Some(ref c) = self.channel_id {
            write!(f, "/{}", c)?;
        }
        if let Some(ref s) = self.session_id {
            write!(f, "?session={}", s)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_uri() {
        let a = Address::parse("aip://alpha/telegram?session=s-1").unwrap();
        assert_eq!(a.agent_id, "alpha");
        assert_eq!(a.channel_id.as_deref(), Some("telegram"));
        assert_eq!(a.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn parse_agent_only() {
        let a = Address::parse("aip://alpha").unwrap();
        assert_eq!(a.agent_id, "alpha");
        assert!(a.channel_id.is_none());
        assert!(a.session_id.is_none());
    }

    #[test]
    fn display_round_trips() {
        for uri in ["aip://a", "aip://a/chan", "aip://a/chan?session=s"] {
            let a = Address::parse(uri).unwrap();
            assert_eq!(a.to_string(), uri);
            assert_eq!(Address::parse(&a.to_string()).unwrap(), a);
        }
    }

    #[test]
    fn wrong_scheme_is_malformed() {
        assert!(matches!(
            Address::parse("http://alpha"),
            Err(GatewayError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::parse("aip://"),
            Err(GatewayError::MalformedAddress(_))
        ));
    }

    #[test]
    fn equality_is_exact_field() {
        let bare = Address::new("a");
        let chan = Address::new("a").with_channel("c");
        assert_ne!(bare, chan);
        assert_eq!(chan, Address::new("a").with_channel("c"));
    }
}
