//! Sender policies.
//!
//! - [`AuthorizedDomains`]: the domains this deployment may claim in From,
//!   loaded once per run
//! - [`SenderResolver`]: decides the effective From for a message, deferring
//!   to an [`UnauthorizedSenderPolicy`] when the declared domain is not
//!   authorized

pub mod authorized;
pub mod sender;

pub use authorized::AuthorizedDomains;
pub use sender::{
    SenderIdentity, SenderResolver, SubstituteSender, UnauthorizedSenderPolicy,
    ensure_single_sender,
};
