//! Closed classification of task files.
//!
//! [`classify`] is the only place a task's kind is inferred. The filename
//! prefix wins; a generic filename falls back to the declared `action`
//! field, then to `type`. Anything unrecognized is [`TaskKind::Unknown`].

use std::fmt;

use serde::Serialize;

use crate::store::TaskFile;

/// Prefix of notices written for humans. Never claimed by agents.
pub const MANUAL_NOTICE_PREFIX: &str = "NEEDS_MANUAL_ACTION_";

/// Social platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// `LinkedIn`.
    LinkedIn,
    /// Twitter / X.
    Twitter,
    /// Facebook.
    Facebook,
    /// Instagram.
    Instagram,
}

impl Platform {
    /// Every supported platform.
    pub const ALL: [Self; 4] = [Self::LinkedIn, Self::Twitter, Self::Facebook, Self::Instagram];

    /// Lowercase identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkedIn => "linkedin",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }

    /// Platform named anywhere in a lowercase label, e.g. `post_to_linkedin`.
    fn mentioned_in(label: &str) -> Option<Self> {
        if label.contains("tweet") {
            return Some(Self::Twitter);
        }
        Self::ALL
            .into_iter()
            .find(|platform| label.contains(platform.as_str()))
    }
}

/// What a social task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialIntent {
    /// Publish new content.
    Post,
    /// Answer a person.
    Reply,
    /// Read-only notification; nothing to send.
    Acknowledge,
}

/// Every kind of task the router knows how to handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Inbound or outbound email.
    Email,
    /// Social platform interaction.
    Social {
        /// Platform.
        platform: Platform,
        /// Requested interaction.
        intent: SocialIntent,
    },
    /// `WhatsApp` message.
    WhatsApp,
    /// Invoice or quotation in the accounting system.
    Invoice {
        /// Quotation rather than invoice.
        quotation: bool,
    },
    /// Payment or bank transfer.
    Payment,
    /// File dropped into the inbox.
    FileDrop,
    /// Notice written for a human.
    ManualNotice,
    /// Unrecognized; carries the declared action or type.
    Unknown {
        /// Declared action/type, or `unspecified`.
        label: String,
    },
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Social { platform, intent } => {
                let intent = match intent {
                    SocialIntent::Post => "post",
                    SocialIntent::Reply => "reply",
                    SocialIntent::Acknowledge => "acknowledge",
                };
                write!(f, "{}_{intent}", platform.as_str())
            }
            Self::WhatsApp => f.write_str("whatsapp"),
            Self::Invoice { quotation: false } => f.write_str("invoice"),
            Self::Invoice { quotation: true } => f.write_str("quotation"),
            Self::Payment => f.write_str("payment"),
            Self::FileDrop => f.write_str("file_drop"),
            Self::ManualNotice => f.write_str("manual_notice"),
            Self::Unknown { label } => write!(f, "unknown:{label}"),
        }
    }
}

/// Whether `name` is a manual-action notice.
#[must_use]
pub fn is_manual_notice(name: &str) -> bool {
    name.to_ascii_uppercase().starts_with(MANUAL_NOTICE_PREFIX)
}

/// Classify a task by filename, then declared `action`, then `type`.
#[must_use]
pub fn classify(name: &str, task: &TaskFile) -> TaskKind {
    if is_manual_notice(name) {
        return TaskKind::ManualNotice;
    }
    let upper = name.to_ascii_uppercase();
    let subject = if let Some(idx) = upper.find("_DRAFT_") {
        &upper[idx + "_DRAFT_".len()..]
    } else if let Some(rest) = upper.strip_prefix("APPROVAL_") {
        rest
    } else {
        upper.as_str()
    };

    if let Some(kind) = from_prefix(subject) {
        return kind;
    }

    let declared = [task.action(), task.kind_label()];
    for label in declared.into_iter().flatten() {
        if let Some(kind) = from_label(&label.trim().to_ascii_lowercase()) {
            return kind;
        }
    }

    let label = declared
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|label| !label.is_empty())
        .unwrap_or("unspecified");
    TaskKind::Unknown {
        label: label.to_owned(),
    }
}

fn from_prefix(subject: &str) -> Option<TaskKind> {
    let subject = subject.strip_prefix("SOCIAL_").unwrap_or(subject);
    if subject.starts_with("EMAIL") || subject.starts_with("GMAIL") {
        return Some(TaskKind::Email);
    }
    if subject.starts_with("WHATSAPP") {
        return Some(TaskKind::WhatsApp);
    }
    if subject.starts_with("PAYMENT") || subject.starts_with("BANKING") {
        return Some(TaskKind::Payment);
    }
    if subject.starts_with("QUOTATION") {
        return Some(TaskKind::Invoice { quotation: true });
    }
    if subject.starts_with("ODOO") || subject.starts_with("INVOICE") {
        return Some(TaskKind::Invoice {
            quotation: subject.contains("QUOTATION"),
        });
    }
    if subject.starts_with("FILE_") {
        return Some(TaskKind::FileDrop);
    }
    let platform = Platform::ALL
        .into_iter()
        .find(|p| subject.starts_with(&p.as_str().to_ascii_uppercase()))
        .or_else(|| subject.starts_with("TWEET").then_some(Platform::Twitter))?;
    Some(TaskKind::Social {
        platform,
        intent: intent_from_name(subject),
    })
}

fn intent_from_name(subject: &str) -> SocialIntent {
    const REPLY: &[&str] = &["REPLY", "MESSAGE", "_DM", "COMMENT"];
    const ACK: &[&str] = &["NOTIFICATION", "MENTION", "LIKE", "REACTION"];
    if REPLY.iter().any(|marker| subject.contains(marker)) {
        SocialIntent::Reply
    } else if ACK.iter().any(|marker| subject.contains(marker)) {
        SocialIntent::Acknowledge
    } else {
        SocialIntent::Post
    }
}

fn from_label(label: &str) -> Option<TaskKind> {
    let fixed = match label {
        "send_email" | "reply_email" | "email_reply" | "draft_email" | "email" | "inbound_email"
        | "email_action" | "gmail_message" => Some(TaskKind::Email),
        "send_whatsapp" | "whatsapp_message" | "whatsapp_reply" | "whatsapp" => {
            Some(TaskKind::WhatsApp)
        }
        "process_payment" | "bank_transfer" | "payment" => Some(TaskKind::Payment),
        "create_client_and_invoice" | "create_invoice" | "odoo_invoice" | "invoice" => {
            Some(TaskKind::Invoice { quotation: false })
        }
        "create_client_and_quotation" | "create_quotation" | "odoo_quotation" | "quotation" => {
            Some(TaskKind::Invoice { quotation: true })
        }
        "file_drop" => Some(TaskKind::FileDrop),
        "manual_action_required" => Some(TaskKind::ManualNotice),
        _ => None,
    };
    if fixed.is_some() {
        return fixed;
    }

    let platform = Platform::mentioned_in(label)?;
    let intent = if ["reply", "_dm", "dm_", "message", "comment"]
        .iter()
        .any(|marker| label.contains(marker))
    {
        SocialIntent::Reply
    } else if ["post", "tweet", "publish", "share"]
        .iter()
        .any(|marker| label.contains(marker))
    {
        SocialIntent::Post
    } else if ["notification", "mention"]
        .iter()
        .any(|marker| label.contains(marker))
    {
        SocialIntent::Acknowledge
    } else {
        return None;
    };
    Some(TaskKind::Social { platform, intent })
}
