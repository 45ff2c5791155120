//! Platform adapter layer
//!
//! Adapters encapsulate all platform-specific document knowledge behind the
//! `SiteAdapter` contract. The registry picks one per page by URL.

pub mod platforms;
mod registry;
mod traits;

pub use platforms::{ChatGptAdapter, ClaudeAdapter, DeepSeekAdapter, GeminiAdapter, GrokAdapter};
pub use registry::AdapterRegistry;
pub use traits::{Capabilities, SiteAdapter, TurnRef};
