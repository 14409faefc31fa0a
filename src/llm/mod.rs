//! LLM access for the analysis and review stages.
//!
//! ```ignore
//! use estate_forge::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = ChatClient::from_config(&config)?;
//! let request = GenerationRequest::new("gpt-4o", vec![Message::user("Hello")])
//!     .with_temperature(0.3);
//! let response = client.generate(request).await?;
//! ```

pub mod client;
pub mod json;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
};
pub use json::{extract_json_object, find_matching_brace};
