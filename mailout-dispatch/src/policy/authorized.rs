//! Domain authorization table

use std::collections::HashSet;

use mailout_common::{Domain, Mailbox, internal};
use mailout_queue::QueueStore;

use crate::error::FatalError;

/// The set of domains this deployment may legitimately send from
///
/// Membership is case-insensitive because every [`Domain`] is lower-cased on
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizedDomains {
    domains: HashSet<Domain>,
}

impl AuthorizedDomains {
    /// Load the table from the queue store.
    ///
    /// # Errors
    ///
    /// Any data-access failure is returned as [`FatalError::AuthorizedDomains`]:
    /// no message can be evaluated without the table.
    pub async fn load(store: &dyn QueueStore) -> Result<Self, FatalError> {
        let domains = store
            .authorized_domains()
            .await
            .map_err(FatalError::AuthorizedDomains)?;

        let table: Self = domains.into_iter().collect();
        internal!(
            level = DEBUG,
            count = table.len(),
            "Loaded authorized sender domains"
        );

        Ok(table)
    }

    #[must_use]
    pub fn contains(&self, domain: &Domain) -> bool {
        self.domains.contains(domain)
    }

    /// Whether `mailbox` is at an authorized domain. Mailboxes without a
    /// domain part are never authorized.
    #[must_use]
    pub fn is_authorized(&self, mailbox: &Mailbox) -> bool {
        mailbox.domain().is_some_and(|domain| self.contains(&domain))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl FromIterator<Domain> for AuthorizedDomains {
    fn from_iter<T: IntoIterator<Item = Domain>>(iter: T) -> Self {
        Self {
            domains: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for AuthorizedDomains {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        iter.into_iter().map(Domain::new).collect()
    }
}
