//! Reply-generation prompt.

use crate::mailbox::InboundMessage;

/// Reply used when the model answers with nothing.
pub const EMPTY_REPLY_FALLBACK: &str =
    "Apologies, I received your email but the AI failed to generate a response at this time.";

/// Reply used when the model call fails.
pub const UNAVAILABLE_REPLY_FALLBACK: &str = "System Notice: The AI assistant is currently unavailable to process this request. We will get back to you manually.";

/// Build the prompt asking the model for a reply body.
///
/// `received` is the already-formatted display timestamp.
pub fn build_reply_prompt(message: &InboundMessage, received: &str) -> String {
    format!(
        "You are an intelligent and highly professional email assistant. \
Your task is to draft a polite, concise, and contextually appropriate reply to the following incoming email.\n\n\
--- EMAIL DETAILS ---\n\
Date Received: {received}\n\
From: {sender}\n\
Subject: {subject}\n\
Message (may include previous conversation history):\n{body}\n\n\
--- INSTRUCTIONS ---\n\
1. Analyze the 'Message' section. Reply only to the newest message at the top; use any quoted text below it purely as context.\n\
2. Acknowledge the sender's latest message gracefully.\n\
3. Provide a clear, relevant, and helpful response based on the context of their message.\n\
4. Maintain a warm yet professional tone.\n\
5. Output ONLY the email body text. Do not include a subject line or commentary such as 'Here is your draft'.",
        sender = message.sender,
        subject = message.subject,
        body = message.body,
    )
}
