//! Render reply drafts as RFC 5322 messages for raw-send APIs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use lettre::Message;
use lettre::Address;
use lettre::message::Mailbox as MailAddress;
use lettre::message::header::ContentType;

use crate::error::MailboxError;
use crate::pipeline::reply::ReplyDraft;

/// Build the full MIME message for a reply. The body is sent as HTML with
/// line breaks preserved.
pub fn render_reply(from: &str, draft: &ReplyDraft) -> Result<Vec<u8>, MailboxError> {
    let from: MailAddress = from
        .parse()
        .map_err(|e| MailboxError::Compose(format!("Invalid from address: {e}")))?;
    let to_address: Address = draft
        .to_address
        .parse()
        .map_err(|e| MailboxError::Compose(format!("Invalid to address: {e}")))?;
    let to = MailAddress::new(draft.to_name.clone(), to_address);

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(draft.subject.as_str());

    if let Some(ref in_reply_to) = draft.threading.in_reply_to {
        builder = builder.in_reply_to(in_reply_to.clone());
    }
    if let Some(ref references) = draft.threading.references {
        builder = builder.references(references.clone());
    }

    let message = builder
        .header(ContentType::TEXT_HTML)
        .body(text_to_html(&draft.body))
        .map_err(|e| MailboxError::Compose(format!("Failed to build email: {e}")))?;

    Ok(message.formatted())
}

/// Base64url encoding expected by Gmail's `messages.send`.
pub fn encode_raw(message: &[u8]) -> String {
    URL_SAFE.encode(message)
}

/// Escape text for HTML and turn newlines into `<br>`.
pub fn text_to_html(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            '\r' => {}
            '\n' => html.push_str("<br>"),
            _ => html.push(ch),
        }
    }
    html
}
