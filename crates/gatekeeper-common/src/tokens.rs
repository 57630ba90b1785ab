//! Wire tokens exchanged with the messaging platform.
//!
//! Two formats cross the platform boundary:
//! - Keypad callback tokens: `?cap={bound_user_id}={action}={chat_id}`
//! - Deep-link payloads: URL-safe base64 (no padding) of `{chat_id}_{user_id}`
//!
//! Both are decoded exactly once, here, into typed values.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::fmt;
use std::str::FromStr;

use crate::constants::callback::{BACK, NAMESPACE, RELOAD, SEPARATOR, SUBMIT};
use crate::error::GatekeeperError;
use crate::types::SessionKey;

/// A keypad button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypadAction {
    Digit(char),
    Reload,
    Back,
    Submit,
}

impl fmt::Display for KeypadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digit(d) => write!(f, "{d}"),
            Self::Reload => f.write_str(RELOAD),
            Self::Back => f.write_str(BACK),
            Self::Submit => f.write_str(SUBMIT),
        }
    }
}

impl FromStr for KeypadAction {
    type Err = GatekeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            RELOAD => Ok(Self::Reload),
            BACK => Ok(Self::Back),
            SUBMIT => Ok(Self::Submit),
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(d), None) if d.is_ascii_digit() => Ok(Self::Digit(d)),
                    _ => Err(GatekeeperError::InvalidToken(format!("unknown action {s:?}"))),
                }
            }
        }
    }
}

/// Callback data attached to every keypad button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackToken {
    /// Member the challenge belongs to
    pub user_id: u64,
    pub action: KeypadAction,
    /// Group chat the member is verifying for
    pub chat_id: i64,
}

impl CallbackToken {
    pub fn new(key: SessionKey, action: KeypadAction) -> Self {
        Self {
            user_id: key.user_id,
            action,
            chat_id: key.chat_id,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.chat_id, self.user_id)
    }

    pub fn encode(&self) -> String {
        format!(
            "{NAMESPACE}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.user_id, self.action, self.chat_id
        )
    }

    pub fn parse(data: &str) -> Result<Self, GatekeeperError> {
        let invalid = || GatekeeperError::InvalidToken(format!("malformed callback {data:?}"));

        let mut parts = data.split(SEPARATOR);
        let (Some(namespace), Some(user), Some(action), Some(chat), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        if namespace != NAMESPACE {
            return Err(invalid());
        }

        Ok(Self {
            user_id: user.parse().map_err(|_| invalid())?,
            action: action.parse()?,
            chat_id: chat.parse().map_err(|_| invalid())?,
        })
    }
}

/// Payload carried by the `/start` deep link, binding a follower to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepLinkPayload {
    pub chat_id: i64,
    pub user_id: u64,
}

impl DeepLinkPayload {
    pub fn new(key: SessionKey) -> Self {
        Self {
            chat_id: key.chat_id,
            user_id: key.user_id,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.chat_id, self.user_id)
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}_{}", self.chat_id, self.user_id))
    }

    pub fn decode(payload: &str) -> Result<Self, GatekeeperError> {
        let invalid = || GatekeeperError::InvalidToken(format!("malformed deep link {payload:?}"));

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim().trim_end_matches('='))
            .map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (chat, user) = text.split_once('_').ok_or_else(invalid)?;

        Ok(Self {
            chat_id: chat.parse().map_err(|_| invalid())?,
            user_id: user.parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_token_wire_format() {
        let key = SessionKey::new(-1001234567890, 777);
        let token = CallbackToken::new(key, KeypadAction::Digit('5'));
        assert_eq!(token.encode(), "?cap=777=5=-1001234567890");
        assert_eq!(CallbackToken::new(key, KeypadAction::Submit).encode(), "?cap=777=OK=-1001234567890");
    }

    #[test]
    fn test_callback_token_parse() {
        let token = CallbackToken::parse("?cap=42=RELOAD=-100").unwrap();
        assert_eq!(token.user_id, 42);
        assert_eq!(token.action, KeypadAction::Reload);
        assert_eq!(token.key(), SessionKey::new(-100, 42));
        assert_eq!(CallbackToken::parse("?cap=42=BACK=-100").unwrap().action, KeypadAction::Back);
    }

    #[test]
    fn test_callback_token_rejects_garbage() {
        for data in [
            "",
            "?cap=42=OK",
            "?cap=42=OK=-100=extra",
            "?other=42=OK=-100",
            "?cap=abc=OK=-100",
            "?cap=42=12=-100",
            "?cap=42=X=-100",
            "?cap=42=OK=chat",
        ] {
            assert!(CallbackToken::parse(data).is_err(), "accepted {data:?}");
        }
    }

    #[test]
    fn test_deep_link_payload() {
        let payload = DeepLinkPayload::new(SessionKey::new(-100555, 31337));
        let encoded = payload.encode();
        assert!(!encoded.contains('='));
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(DeepLinkPayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_deep_link_rejects_garbage() {
        assert!(DeepLinkPayload::decode("").is_err());
        assert!(DeepLinkPayload::decode("not base64 !").is_err());
        // "hello" encoded: decodes but has no separator
        assert!(DeepLinkPayload::decode("aGVsbG8").is_err());
    }
}
