//! Batch dispatcher for the outbound mail queue
//!
//! This crate provides functionality to:
//! - Drain eligible messages from the queue in bounded, oldest-first batches
//! - Decide the effective sender for each message against the authorized domains
//! - Assemble headers, body and attachments into a transmittable message
//! - Hand the message to a transport and record the outcome

mod error;
mod policy;
mod processor;
mod render;
mod tenant;
mod transport;
mod types;

pub use error::{DispatchError, FatalError, MessageError};
pub use policy::{
    AuthorizedDomains, SenderIdentity, SenderResolver, SubstituteSender,
    UnauthorizedSenderPolicy, ensure_single_sender,
};
pub use processor::{Capabilities, Dispatcher};
pub use render::{
    Attachment, Body, BodyFormat, HeaderAssembler, MessageRenderer, MimeType, OutboundBuilder,
    OutboundMessage,
};
pub use tenant::{SingleTenant, TenantError, TenantResolver};
pub use transport::{Mailer, SendOutcome, SmtpConfig, SmtpMailer, SmtpSecurity, TransportError};
pub use types::{MessageOutcome, RunSummary};
