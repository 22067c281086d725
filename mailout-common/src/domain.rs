//! Domain newtype
//!
//! Domain names compare case-insensitively on the wire, so a [`Domain`] is
//! lower-cased when it is built. Two domains that differ only in case are the
//! same value, hash the same, and collapse to one entry in a set.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Deserializer, Serialize};

/// A lower-cased domain name
///
/// # Examples
///
/// ```
/// use mailout_common::Domain;
///
/// let domain = Domain::new("Example.COM");
/// assert_eq!(domain.as_str(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Arc::from(s.as_ref().trim().to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_domain_is_lowercased() {
        let domain = Domain::new("Mail.Example.COM");
        assert_eq!(domain.as_str(), "mail.example.com");
    }

    #[test]
    fn test_domain_equality_ignores_case() {
        assert_eq!(Domain::new("example.com"), Domain::new("EXAMPLE.com"));
        assert_ne!(Domain::new("example.com"), Domain::new("example.org"));
    }

    #[test]
    fn test_domain_set_deduplicates() {
        let set: HashSet<Domain> = ["example.com", "Example.com", "EXAMPLE.COM", "other.org"]
            .into_iter()
            .map(Domain::from)
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_domain_deserialize_normalises() {
        let domain: Domain = ron::from_str("\"Example.NET\"").unwrap();
        assert_eq!(domain.as_str(), "example.net");
    }
}
