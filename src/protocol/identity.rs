use anyhow::{bail, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Protocol name advertised when nothing else is configured
pub const DEFAULT_NAME: &str = "hpipe";
/// Protocol version advertised when nothing else is configured
pub const DEFAULT_VERSION: &str = "1";

/// The `(name, version)` pair carried in the `Upgrade` header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolIdentity {
    pub name: String,
    pub version: String,
}

impl ProtocolIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Check whether an `Upgrade` header value asks for this protocol.
    ///
    /// The header is a comma-separated token list. A token matches when its
    /// name equals ours and it either carries no version or exactly ours.
    pub fn accepts(&self, upgrade: &str) -> bool {
        upgrade.split(',').any(|token| {
            let mut parts = token.trim().splitn(2, '/');
            let name = parts.next().unwrap_or_default();
            if name != self.name {
                return false;
            }
            match parts.next() {
                Some(version) => version == self.version,
                None => true,
            }
        })
    }

    /// Reject identities that cannot be written as a single upgrade token
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("protocol name must not be empty");
        }
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if value
                .chars()
                .any(|c| c == '/' || c == ',' || c.is_whitespace() || c.is_control())
            {
                bail!("protocol {} {:?} is not a valid upgrade token", field, value);
            }
        }
        Ok(())
    }
}

impl Default for ProtocolIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_VERSION)
    }
}

impl fmt::Display for ProtocolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl FromStr for ProtocolIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((name, version)) = s.split_once('/') else {
            bail!("expected <name>/<version>, got {:?}", s);
        };
        let identity = Self::new(name, version);
        identity.validate()?;
        Ok(identity)
    }
}
