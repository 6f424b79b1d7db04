//! Query pipeline: embed → retrieve → assemble prompt → generate.

pub mod generate;
pub mod prompt;
pub mod retrieve;

pub use generate::{
    ChatClient, ChatRequest, DeltaStream, HttpChatClient, ResponseDelta, ToolCallDelta,
};
pub use prompt::{USER_PROMPT_TEMPLATE, assemble_prompt};
pub use retrieve::{RetrievalResult, RetrievedChunk, Retriever};
