//! LLM provider implementations for Promptline.
//!
//! Providers implement the `promptline_core::Provider` trait. The retry
//! policy here is shared by every caller that talks to a backend.

pub mod anthropic;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use retry::RetryPolicy;
