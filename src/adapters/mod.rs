//! External-service adapter seam.
//!
//! The core never talks to a mail server, accounting API or social
//! platform directly. It hands a [`ServiceAction`] to a [`ServiceAdapter`]
//! and gets back an [`ActionReceipt`]. [`AdapterSet`] routes each service to
//! a configured [`CommandAdapter`], or to the [`RecordOnlyAdapter`] when
//! nothing is configured.

pub mod command;
pub mod record_only;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::Serialize;

use crate::config::AdapterCommandConfig;
use crate::router::kind::Platform;
use crate::Result;

pub use command::CommandAdapter;
pub use record_only::RecordOnlyAdapter;

/// Boxed future returned by adapter calls.
pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = Result<ActionReceipt>> + Send + 'a>>;

/// External service a side effect is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Outbound mail transport.
    Mail,
    /// A social platform.
    Social(Platform),
    /// Accounting / invoicing system.
    Accounting,
}

impl Service {
    /// Key used for `[adapters.<key>]` config and per-service guards.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Social(platform) => platform.as_str(),
            Self::Accounting => "accounting",
        }
    }
}

/// A side effect to perform on an external service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServiceAction {
    /// Send an email.
    SendEmail {
        /// Recipient address.
        to: String,
        /// Subject line.
        subject: String,
        /// Plain-text body.
        body: String,
        /// Message or thread being replied to.
        #[serde(skip_serializing_if = "Option::is_none")]
        in_reply_to: Option<String>,
    },
    /// Publish a post.
    PublishPost {
        /// Target platform.
        platform: Platform,
        /// Post text.
        content: String,
    },
    /// Reply to a person on a social platform.
    SendReply {
        /// Target platform.
        platform: Platform,
        /// Person being replied to.
        recipient: String,
        /// Reply text.
        content: String,
        /// Conversation identifier, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        thread: Option<String>,
    },
    /// Create a customer (if needed) and an invoice or quotation.
    CreateInvoice {
        /// Customer name.
        partner_name: String,
        /// Amount in the ledger currency.
        amount: f64,
        /// Line description.
        description: String,
        /// Create a quotation instead of an invoice.
        quotation: bool,
    },
}

impl ServiceAction {
    /// Service the action is addressed to.
    #[must_use]
    pub fn service(&self) -> Service {
        match self {
            Self::SendEmail { .. } => Service::Mail,
            Self::PublishPost { platform, .. } | Self::SendReply { platform, .. } => {
                Service::Social(*platform)
            }
            Self::CreateInvoice { .. } => Service::Accounting,
        }
    }

    /// One-line description for logs and the journal.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::SendEmail { to, subject, .. } => format!("email to {to}: {subject}"),
            Self::PublishPost { platform, content } => {
                format!("{} post ({} chars)", platform.as_str(), content.chars().count())
            }
            Self::SendReply {
                platform,
                recipient,
                ..
            } => format!("{} reply to {recipient}", platform.as_str()),
            Self::CreateInvoice {
                partner_name,
                amount,
                quotation,
                ..
            } => format!(
                "{} for {partner_name}: {amount:.2}",
                if *quotation { "quotation" } else { "invoice" }
            ),
        }
    }
}

/// What an adapter reports after a side effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionReceipt {
    /// Service-side reference (message id, invoice number), if any.
    pub reference: Option<String>,
    /// The action was recorded but not performed.
    pub simulated: bool,
}

/// Performs side effects on external services.
pub trait ServiceAdapter: Send + Sync {
    /// Perform `action`.
    ///
    /// Implementations report retryable failures as
    /// [`crate::AppError::Transient`], rejected credentials as
    /// [`crate::AppError::Auth`] and rejected payloads as
    /// [`crate::AppError::Data`].
    fn execute<'a>(&'a self, action: &'a ServiceAction) -> AdapterFuture<'a>;
}

/// Per-service routing to configured command adapters.
pub struct AdapterSet {
    commands: HashMap<String, CommandAdapter>,
    fallback: RecordOnlyAdapter,
}

impl AdapterSet {
    /// Build from `[adapters.<service>]` config; commands run in `workdir`.
    #[must_use]
    pub fn from_config(adapters: &HashMap<String, AdapterCommandConfig>, workdir: &Path) -> Self {
        let commands = adapters
            .iter()
            .map(|(service, cfg)| {
                (
                    service.clone(),
                    CommandAdapter::from_config(service, cfg, workdir),
                )
            })
            .collect();
        Self {
            commands,
            fallback: RecordOnlyAdapter,
        }
    }

    /// Services with a configured command.
    #[must_use]
    pub fn configured_services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ServiceAdapter for AdapterSet {
    fn execute<'a>(&'a self, action: &'a ServiceAction) -> AdapterFuture<'a> {
        match self.commands.get(action.service().key()) {
            Some(command) => command.execute(action),
            None => self.fallback.execute(action),
        }
    }
}
