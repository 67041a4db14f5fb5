//! Conversation normalization — turns an email chain into prompt input.

use crate::llm::ChatMessage;
use crate::model::{EmailMessage, RoleType};

/// Convert an ordered email chain into role-tagged prompt turns.
///
/// Every turn has role `user`; the REALTOR/BUYER distinction lives in a
/// body prefix, derived by exact (case-sensitive) comparison of the sender
/// against the account's registered email. Order is preserved; nothing is
/// filtered or truncated — context-length concerns belong to the caller.
pub fn normalize(account_email: &str, messages: &[EmailMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| {
            let role = RoleType::derive(account_email, &message.sender);
            ChatMessage::user(format!("{}{}", role.prefix(), message.body))
        })
        .collect()
}

/// Render a chain as a readable transcript for the flag prompt.
///
/// Each message becomes a `From:`/`Subject:`/`Body:` block, separated by
/// `---` markers.
pub fn format_for_review(messages: &[EmailMessage]) -> String {
    let blocks: Vec<String> = messages
        .iter()
        .map(|message| {
            format!(
                "From: {}\nSubject: {}\nBody: {}\n---\n",
                message.sender, message.subject, message.body
            )
        })
        .collect();
    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(sender: &str, body: &str, ts: i64) -> EmailMessage {
        EmailMessage {
            message_id: format!("m{ts}"),
            sender: sender.to_string(),
            subject: "Re: 12 Oak St".to_string(),
            body: body.to_string(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[test]
    fn tags_realtor_and_buyer_by_sender() {
        let chain = vec![
            message("a@x.com", "Happy to show it Saturday.", 1),
            message("buyer@mail.com", "Can we tour this weekend?", 2),
        ];
        let turns = normalize("a@x.com", &chain);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[0].content, "REALTOR: Happy to show it Saturday.");
        assert_eq!(turns[1].content, "BUYER: Can we tour this weekend?");
    }

    #[test]
    fn sender_match_is_case_sensitive() {
        let chain = vec![message("A@x.com", "hello", 1)];
        let turns = normalize("a@x.com", &chain);
        assert_eq!(turns[0].content, "BUYER: hello");
    }

    #[test]
    fn order_is_preserved() {
        let chain = vec![
            message("b@y.com", "first", 1),
            message("b@y.com", "second", 2),
            message("b@y.com", "third", 3),
        ];
        let turns = normalize("a@x.com", &chain);
        let bodies: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(bodies, ["BUYER: first", "BUYER: second", "BUYER: third"]);
    }

    #[test]
    fn review_format_has_header_blocks() {
        let chain = vec![
            message("buyer@mail.com", "Is it still available?", 1),
            message("a@x.com", "It is.", 2),
        ];
        let formatted = format_for_review(&chain);
        assert!(formatted.starts_with("From: buyer@mail.com\nSubject: Re: 12 Oak St\n"));
        assert!(formatted.contains("Body: Is it still available?\n---\n"));
        assert!(formatted.contains("From: a@x.com"));
    }
}
