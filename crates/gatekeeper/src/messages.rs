//! User-facing texts and their rendering.
//!
//! Templates are HTML (the platform adapter sends with HTML parse mode).
//! `#USER` and `#CHAT` placeholders are replaced with escaped values.

use serde::Deserialize;
use teloxide::utils::html;

use gatekeeper_common::Session;

use crate::machine::Notice;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Group prompt shown on join
    pub welcome: String,
    /// Label of the deep-link button under the prompt
    pub verify_button: String,
    /// Caption of the puzzle message
    pub challenge: String,
    pub try_again: String,
    pub your_code: String,
    pub not_your_challenge: String,
    pub code_too_short: String,
    pub code_too_long: String,
    pub no_reloads_left: String,
    /// Posted in the group when a challenge times out
    pub expired: String,
    /// Shown when an internal failure aborted the press
    pub try_later: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            welcome: "Welcome, #USER!\nPlease pass the check to prove you are not a bot.".into(),
            verify_button: "Pass verification".into(),
            challenge: "Welcome, #USER!\nTo get access to the chat #CHAT\nplease enter the code to prove you are not a bot.".into(),
            try_again: "\n⚠️ Please try again!".into(),
            your_code: "\nYour code: ".into(),
            not_your_challenge: "❌ This is not your challenge!".into(),
            code_too_short: "❌ Your code is too short.".into(),
            code_too_long: "❌ Maximum code length exceeded!".into(),
            no_reloads_left: "❌ No reloads left.".into(),
            expired: "#USER did not solve the CAPTCHA in time.".into(),
            try_later: "⚠️ Something went wrong, please try again.".into(),
        }
    }
}

impl Messages {
    pub fn welcome(&self, mention: &str) -> String {
        self.welcome.replace("#USER", mention)
    }

    /// Puzzle caption, annotated with the retry notice and the current input
    pub fn challenge_caption(&self, session: &Session, retry: bool) -> String {
        let mut text = self
            .challenge
            .replace("#USER", &html::escape(&session.user_name))
            .replace("#CHAT", &html::escape(&session.chat_name));

        if retry {
            text.push_str(&self.try_again);
        }
        if !session.entered_digits.is_empty() {
            text.push_str(&self.your_code);
            text.push_str(&session.entered_digits);
        }
        text
    }

    pub fn expired(&self, user_name: &str) -> String {
        self.expired.replace("#USER", &html::escape(user_name))
    }

    pub fn notice(&self, notice: Notice) -> &str {
        match notice {
            Notice::NotYourChallenge => &self.not_your_challenge,
            Notice::CodeTooShort => &self.code_too_short,
            Notice::CodeTooLong => &self.code_too_long,
            Notice::NoReloadsLeft => &self.no_reloads_left,
        }
    }
}

/// Display handle stored with the session: `@username`, else the first name
pub fn display_name(username: Option<&str>, first_name: &str) -> String {
    match username {
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => first_name.to_string(),
    }
}

/// Chat label stored with the session: `Title (@handle)` for public chats
pub fn chat_label(title: Option<&str>, username: Option<&str>) -> String {
    match (title, username) {
        (Some(title), Some(handle)) => format!("{title} (@{handle})"),
        (Some(title), None) => title.to_string(),
        (None, Some(handle)) => format!("@{handle}"),
        (None, None) => "this chat".to_string(),
    }
}

/// Clickable HTML mention of a member
pub fn mention(user_id: u64, display: &str) -> String {
    format!(r#"<a href="tg://user?id={user_id}">{}</a>"#, html::escape(display))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::awaiting_link("Rust <Club>".into(), "@ferris".into(), 2)
    }

    #[test]
    fn test_challenge_caption_escapes_names() {
        let caption = Messages::default().challenge_caption(&session(), false);
        assert!(caption.contains("@ferris"));
        assert!(caption.contains("Rust &lt;Club&gt;"));
        assert!(!caption.contains("Your code"));
    }

    #[test]
    fn test_challenge_caption_annotations() {
        let messages = Messages::default();
        let mut session = session();
        session.begin_challenge("123", 2, 0);
        session.push_digit('1');
        session.push_digit('2');

        let caption = messages.challenge_caption(&session, true);
        assert!(caption.contains("Please try again"));
        assert!(caption.ends_with("Your code: 12"));
    }

    #[test]
    fn test_names() {
        assert_eq!(display_name(Some("ferris"), "Ferris"), "@ferris");
        assert_eq!(display_name(None, "Ferris"), "Ferris");
        assert_eq!(chat_label(Some("Rust"), Some("rustlang")), "Rust (@rustlang)");
        assert_eq!(chat_label(Some("Rust"), None), "Rust");
        assert_eq!(
            mention(7, "A&B"),
            r#"<a href="tg://user?id=7">A&amp;B</a>"#
        );
    }
}
