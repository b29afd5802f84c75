//! Turning an approved task file into a [`ServiceAction`].
//!
//! Every required field is checked here; a missing one is an
//! [`AppError::Data`] and the task is archived with an annotation.

use super::kind::{SocialIntent, TaskKind};
use crate::adapters::ServiceAction;
use crate::store::TaskFile;
use crate::{AppError, Result};

const EMAIL_BODY_SECTIONS: &[&str] = &["Drafted Reply", "Reply", "Body", "Message"];
const POST_SECTIONS: &[&str] = &["Drafted Content", "Content", "Post"];
const REPLY_SECTIONS: &[&str] = &["Reply", "Drafted Reply"];

/// Build the side effect an approved task of `kind` asks for.
///
/// # Errors
///
/// Returns `AppError::Data` if a required field is missing or malformed,
/// or if `kind` has no executable side effect.
pub fn build_action(kind: &TaskKind, task: &TaskFile) -> Result<ServiceAction> {
    match kind {
        TaskKind::Email => email(task),
        TaskKind::Social {
            platform,
            intent: SocialIntent::Post,
        } => {
            let content = task
                .section(POST_SECTIONS)
                .or_else(|| non_empty(task.header.get_any(&["content", "text", "post"])))
                .ok_or_else(|| missing("post content"))?;
            Ok(ServiceAction::PublishPost {
                platform: *platform,
                content,
            })
        }
        TaskKind::Social {
            platform,
            intent: SocialIntent::Reply,
        } => {
            let recipient = required(task, &["sender", "recipient", "to", "from"], "sender")?;
            let content = task
                .section(REPLY_SECTIONS)
                .ok_or_else(|| missing("## Reply section"))?;
            Ok(ServiceAction::SendReply {
                platform: *platform,
                recipient,
                content,
                thread: non_empty(task.header.get_any(&["thread_id", "conversation_id"])),
            })
        }
        TaskKind::Invoice { quotation } => invoice(task, *quotation),
        other => Err(AppError::Data(format!("{other} has no executable side effect"))),
    }
}

fn email(task: &TaskFile) -> Result<ServiceAction> {
    let to = required(task, &["to", "email", "recipient"], "recipient (to/email)")?;
    let subject = required(task, &["subject", "reply_subject"], "subject")?;
    let body = task
        .section(EMAIL_BODY_SECTIONS)
        .or_else(|| non_empty(Some(task.body.trim())))
        .ok_or_else(|| missing("email body"))?;
    Ok(ServiceAction::SendEmail {
        to,
        subject,
        body,
        in_reply_to: non_empty(task.header.get_any(&["message_id", "thread_id"])),
    })
}

fn invoice(task: &TaskFile, quotation_kind: bool) -> Result<ServiceAction> {
    let partner_name = required(task, &["partner_name", "customer", "client"], "partner_name")?;
    let raw_amount = required(task, &["amount"], "amount")?;
    let amount = parse_amount(&raw_amount)?;
    let description = task
        .header
        .get_any(&["description"])
        .unwrap_or("Service")
        .to_owned();
    let quotation = quotation_kind
        || task
            .header
            .get_any(&["odoo_action", "document"])
            .is_some_and(|v| v.eq_ignore_ascii_case("quotation"));
    Ok(ServiceAction::CreateInvoice {
        partner_name,
        amount,
        description,
        quotation,
    })
}

/// Parse a monetary amount such as `1,250.00` or `$99`.
///
/// # Errors
///
/// Returns `AppError::Data` for anything that is not a finite,
/// non-negative number.
pub fn parse_amount(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(AppError::Data(format!("invalid amount '{raw}'"))),
    }
}

fn required(task: &TaskFile, keys: &[&str], label: &str) -> Result<String> {
    non_empty(task.header.get_any(keys)).ok_or_else(|| missing(label))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn missing(field: &str) -> AppError {
    AppError::Data(format!("missing required field: {field}"))
}
