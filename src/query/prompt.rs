//! Deterministic prompt assembly.

use crate::message::ChatMessage;

/// Template interpolating retrieved context and the user query into the
/// augmented user message.
pub const USER_PROMPT_TEMPLATE: &str =
    "Please answer the given query using the context below.\n\nCONTEXT:\n{context}\n\nQUERY:\n{query}";

/// Builds the conversation sent to generation: the system message first,
/// then a single user message from [`USER_PROMPT_TEMPLATE`].
///
/// An empty context still produces a well-formed prompt with an empty
/// CONTEXT section.
pub fn assemble_prompt(system_prompt: &str, query: &str, context: &str) -> Vec<ChatMessage> {
    let user = USER_PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{query}", query);
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(&user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_comes_first() {
        let messages = assemble_prompt("You are helpful.", "What is RAG?", "Some context.");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].has_role(ChatMessage::SYSTEM));
        assert_eq!(messages[0].content, "You are helpful.");
        assert!(messages[1].has_role(ChatMessage::USER));
    }

    #[test]
    fn sections_appear_once_in_order_with_exact_payloads() {
        let context = "Chunk one.\n\nChunk two.";
        let query = "How do chunks merge?";
        let messages = assemble_prompt("system", query, context);
        let user = &messages[1].content;

        assert_eq!(user.matches("CONTEXT:").count(), 1);
        assert_eq!(user.matches("QUERY:").count(), 1);

        let context_at = user.find("CONTEXT:").unwrap();
        let query_at = user.find("QUERY:").unwrap();
        assert!(context_at < query_at);

        let between = &user[context_at + "CONTEXT:\n".len()..query_at];
        assert_eq!(between.trim_end_matches('\n'), context);
        assert_eq!(&user[query_at + "QUERY:\n".len()..], query);
    }

    #[test]
    fn empty_context_still_builds_a_well_formed_prompt() {
        let messages = assemble_prompt("system", "the query", "");
        let user = &messages[1].content;
        assert!(user.contains("CONTEXT:\n\n"));
        assert!(user.ends_with("QUERY:\nthe query"));
    }
}
