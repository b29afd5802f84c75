//! Draft files written to `Pending_Approval` for human sign-off.

use std::fmt::Write as _;

use chrono::Utc;

use super::actions::parse_amount;
use super::kind::{SocialIntent, TaskKind};
use crate::store::{naming, Header, TaskFile};
use crate::{AppError, Result};

const EXCERPT_CHARS: usize = 1200;

/// A draft ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Filename in `Pending_Approval`.
    pub name: String,
    /// Contents.
    pub task: TaskFile,
}

/// Build the approval draft for a claimed task.
///
/// # Errors
///
/// Returns `AppError::Data` when the source lacks a field the draft needs,
/// or when `kind` is not draftable.
pub fn draft_for(
    kind: &TaskKind,
    source_name: &str,
    source: &TaskFile,
    agent: &str,
) -> Result<Draft> {
    let (label, header, body) = match kind {
        TaskKind::Email => email(source)?,
        TaskKind::Social {
            platform,
            intent: SocialIntent::Post,
        } => {
            let content = source
                .section(&["Content", "Post", "Drafted Content"])
                .or_else(|| field(source, &["content", "text", "topic"]))
                .ok_or_else(|| missing("content or topic"))?;
            let header = Header::new()
                .with("action", format!("post_to_{}", platform.as_str()))
                .with("platform", platform.as_str());
            let body = format!(
                "\n# Draft {} Post\n\n## Drafted Content\n\n{content}\n",
                title_case(platform.as_str())
            );
            (format!("SOCIAL_{}", platform.as_str().to_ascii_uppercase()), header, body)
        }
        TaskKind::Social {
            platform,
            intent: SocialIntent::Reply,
        } => {
            let sender =
                field(source, &["sender", "from", "author"]).ok_or_else(|| missing("sender"))?;
            let mut header = Header::new()
                .with("action", format!("send_{}_reply", platform.as_str()))
                .with("platform", platform.as_str())
                .with("sender", sender.as_str());
            if let Some(thread) = field(source, &["thread_id", "conversation_id"]) {
                header.set("thread_id", thread);
            }
            let body = format!(
                "\n# Draft {} Reply to {sender}\n\n## Original Message\n\n{}\n\n## Reply\n\nThank you for reaching out. I will get back to you shortly.\n",
                title_case(platform.as_str()),
                excerpt(source)
            );
            (
                format!("SOCIAL_{}_REPLY", platform.as_str().to_ascii_uppercase()),
                header,
                body,
            )
        }
        TaskKind::WhatsApp => {
            let sender = field(source, &["sender", "from", "phone", "chat"])
                .ok_or_else(|| missing("sender"))?;
            let header = Header::new()
                .with("action", "send_whatsapp")
                .with("sender", sender.as_str());
            let body = format!(
                "\n# Draft WhatsApp Reply to {sender}\n\n## Original Message\n\n{}\n\n## Reply\n\nThanks for your message. I will follow up shortly.\n",
                excerpt(source)
            );
            ("WHATSAPP".to_owned(), header, body)
        }
        TaskKind::Invoice { quotation } => invoice(source, *quotation)?,
        other => return Err(AppError::Data(format!("{other} cannot be drafted"))),
    };

    let mut header = header
        .with("type", format!("{}_draft_{}", agent, label.to_ascii_lowercase()))
        .with("source_file", source_name)
        .with("drafted_by", agent)
        .with("created", Utc::now().to_rfc3339());
    if let Some(priority) = source.header.get("priority") {
        header.set("priority", priority);
    }
    header.set("status", "pending_approval");

    let mut body = body;
    body.push_str(
        "\n## To Approve\n\nMove this file to `Approved/`. To reject, move it to `Rejected/`.\n",
    );

    Ok(Draft {
        name: naming::task_name(
            &format!("{}_DRAFT_{label}", agent.to_ascii_uppercase()),
            source_name,
        ),
        task: TaskFile::new(header, body),
    })
}

fn email(source: &TaskFile) -> Result<(String, Header, String)> {
    let recipient = field(source, &["email", "reply_to", "from", "sender"])
        .map(|raw| extract_address(&raw))
        .ok_or_else(|| missing("sender address (from/email)"))?;
    let subject = field(source, &["subject"]).unwrap_or_else(|| "(no subject)".to_owned());
    let reply_subject = if subject.to_ascii_lowercase().starts_with("re:") {
        subject.clone()
    } else {
        format!("Re: {subject}")
    };
    let mut header = Header::new()
        .with("action", "send_email")
        .with("to", recipient.as_str())
        .with("subject", reply_subject.as_str());
    if let Some(id) = field(source, &["message_id", "thread_id"]) {
        header.set("message_id", id);
    }
    let body = format!(
        "\n# Draft Email Reply\n\n**To:** {recipient}\n**Subject:** {reply_subject}\n\n## Original Message\n\n{}\n\n## Drafted Reply\n\nThank you for your email regarding \"{subject}\". I have received it and will follow up shortly.\n\nBest regards\n",
        excerpt(source)
    );
    Ok(("EMAIL".to_owned(), header, body))
}

fn invoice(source: &TaskFile, quotation: bool) -> Result<(String, Header, String)> {
    let partner = field(source, &["partner_name", "customer", "client"])
        .ok_or_else(|| missing("partner_name"))?;
    let raw_amount = field(source, &["amount"]).ok_or_else(|| missing("amount"))?;
    let amount = parse_amount(&raw_amount)?;
    let description = field(source, &["description"]).unwrap_or_else(|| "Service".to_owned());
    let document = if quotation { "quotation" } else { "invoice" };
    let header = Header::new()
        .with("action", format!("create_client_and_{document}"))
        .with("odoo_action", document)
        .with("partner_name", partner.as_str())
        .with("amount", format!("{amount:.2}"))
        .with("description", description.as_str());
    let mut body = format!("\n# Draft {} for {partner}\n\n", title_case(document));
    let _ = writeln!(body, "| Field | Value |\n|---|---|");
    let _ = writeln!(body, "| Customer | {partner} |");
    let _ = writeln!(body, "| Amount | {amount:.2} |");
    let _ = writeln!(body, "| Description | {description} |");
    Ok((document.to_ascii_uppercase(), header, body))
}

fn field(source: &TaskFile, keys: &[&str]) -> Option<String> {
    source
        .header
        .get_any(keys)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn missing(what: &str) -> AppError {
    AppError::Data(format!("missing required field: {what}"))
}

/// `Jane Doe <jane@example.com>` becomes `jane@example.com`.
fn extract_address(raw: &str) -> String {
    match (raw.find('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => raw[start + 1..end].trim().to_owned(),
        _ => raw.trim().to_owned(),
    }
}

fn excerpt(source: &TaskFile) -> String {
    let text = source.body.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("\n\n[truncated]");
    cut
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
