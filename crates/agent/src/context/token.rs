//! Token estimation utilities.
//!
//! Character heuristic: ~4 characters per token. Good enough for logging
//! prompt sizes; never used to cut context.

use memoria_core::message::Message;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for one message, including ~4 tokens of role/framing overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    4 + estimate_tokens(&message.content)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn messages_include_overhead() {
        let messages = vec![Message::user("abcd"), Message::assistant("")];
        assert_eq!(estimate_messages_tokens(&messages), 5 + 4);
    }
}
