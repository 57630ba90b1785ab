//! Messaging platform seam.
//!
//! The verifier talks to the chat platform only through [`Platform`], so the
//! whole flow can run against a recording fake in tests.

mod telegram;

pub use telegram::TelegramPlatform;

use async_trait::async_trait;
use gatekeeper_common::GatekeeperError;

use crate::keypad::Keypad;

pub type PlatformResult<T> = Result<T, GatekeeperError>;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Deep link that opens a private chat with the bot carrying `payload`
    fn start_link(&self, payload: &str) -> String;

    /// Post `text` with a single URL button; returns the message id
    async fn send_prompt(
        &self,
        chat_id: i64,
        text: &str,
        button_label: &str,
        url: &str,
    ) -> PlatformResult<i32>;

    /// Post the puzzle image with its caption and keypad; returns the message id
    async fn send_challenge(
        &self,
        chat_id: i64,
        image: &[u8],
        caption: &str,
        keypad: &Keypad,
    ) -> PlatformResult<i32>;

    /// Replace the caption and keypad of a puzzle message, and the image when given
    async fn edit_challenge(
        &self,
        chat_id: i64,
        message_id: i32,
        image: Option<&[u8]>,
        caption: &str,
        keypad: &Keypad,
    ) -> PlatformResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> PlatformResult<()>;

    async fn send_text(&self, chat_id: i64, text: &str) -> PlatformResult<i32>;

    /// Acknowledge a keypad press, optionally with a notice
    async fn answer_action(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> PlatformResult<()>;

    /// Revoke every send permission of a member
    async fn restrict(&self, chat_id: i64, user_id: u64) -> PlatformResult<()>;

    /// Restore default member permissions
    async fn unrestrict(&self, chat_id: i64, user_id: u64) -> PlatformResult<()>;

    async fn ban(&self, chat_id: i64, user_id: u64) -> PlatformResult<()>;

    async fn unban(&self, chat_id: i64, user_id: u64) -> PlatformResult<()>;
}
