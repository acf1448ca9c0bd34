//! AI tutoring: policies, prompts, the LLM client, and the firewall that
//! orchestrates them.

pub mod activity;
pub mod firewall;
pub mod llm;
pub mod policy;
pub mod prompts;

pub use firewall::{ChatContext, ChatReply, PedagogicalFirewall};
pub use llm::{ChatMessage, LlmClient, Role};
pub use prompts::BehavioralContext;
