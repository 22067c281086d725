use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::Domain;

/// An address paired with an optional display name, as stored on queued
/// messages and header rows.
///
/// No syntax validation happens here; the queue stores whatever upstream
/// producers wrote, and the transport is the component that has to be able to
/// express the address on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Mailbox {
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name: name.filter(|name| !name.trim().is_empty()),
        }
    }

    /// The domain part of the address: everything after the last `@`.
    ///
    /// Returns `None` if there is no `@`, or nothing follows it.
    #[must_use]
    pub fn domain(&self) -> Option<Domain> {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim())
            .filter(|domain| !domain.is_empty())
            .map(Domain::new)
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "\"{name}\" <{}>", self.address),
            None => write!(f, "<{}>", self.address),
        }
    }
}

impl From<&str> for Mailbox {
    fn from(address: &str) -> Self {
        Self::new(address, None)
    }
}
