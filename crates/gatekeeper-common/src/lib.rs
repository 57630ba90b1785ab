//! # Gatekeeper Common
//!
//! Shared types and codecs used across Gatekeeper components.
//!
//! ## Modules
//! - `types` - Session record, session key and state, generator settings
//! - `tokens` - Keypad callback tokens and deep-link payloads
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod tokens;
pub mod types;

pub use error::GatekeeperError;
pub use tokens::{CallbackToken, DeepLinkPayload, KeypadAction};
pub use types::*;
