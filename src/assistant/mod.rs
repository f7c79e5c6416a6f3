pub mod context;
pub mod prompt;
pub mod session;

pub use context::{ContextBuilder, UserContext};
pub use prompt::{healthcare_prompt, serialize_context};
pub use session::{ChatSessions, ConversationHistory, PendingExchange};
