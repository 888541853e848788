//! HTTP collaborators for `pulse-core`: the streaming generate transport and
//! the conversation history API.

pub mod conversations;
pub mod http;

pub use conversations::{ConversationSummary, ConversationsClient};
pub use http::{HttpTransport, Utf8Carry};
