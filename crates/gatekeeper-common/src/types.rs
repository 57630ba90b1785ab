//! Core types shared across Gatekeeper components.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MAX_ENTERED_DIGITS;

/// Identifies one verification session: a member inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub chat_id: i64,
    pub user_id: u64,
}

impl SessionKey {
    pub fn new(chat_id: i64, user_id: u64) -> Self {
        Self { chat_id, user_id }
    }

    /// File name used by the file-backed store: `{chat_id}={user_id}.session`
    pub fn file_name(&self) -> String {
        format!("{}={}.session", self.chat_id, self.user_id)
    }

    /// Inverse of [`SessionKey::file_name`]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".session")?;
        let (chat, user) = stem.split_once('=')?;
        Some(Self::new(chat.parse().ok()?, user.parse().ok()?))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

/// Lifecycle state of a verification session.
///
/// Terminal states are never persisted: reaching one deletes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Member muted, deep link issued, no puzzle yet
    AwaitingLink,
    /// Puzzle shown, keypad input accepted
    ChallengeActive,
    /// Correct code submitted
    Verified,
    /// Attempts exhausted
    Rejected,
    /// Timeout elapsed while the challenge was active
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Expired)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingLink => "awaiting_link",
            Self::ChallengeActive => "challenge_active",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Mutable state of one member's verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Display name of the originating chat
    pub chat_name: String,

    /// Display handle of the joining member
    pub user_name: String,

    /// "Please verify" prompt posted in the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message_id: Option<i32>,

    /// Private chat holding the puzzle message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_chat_id: Option<i64>,

    /// Active puzzle message (image + keypad)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_message_id: Option<i32>,

    /// Current correct answer (digits only)
    #[serde(default)]
    pub expected_code: String,

    #[serde(default)]
    pub expected_code_length: usize,

    /// In-progress keypad input, never longer than [`MAX_ENTERED_DIGITS`]
    #[serde(default)]
    pub entered_digits: String,

    #[serde(default)]
    pub failed_attempts: u32,

    pub reloads_remaining: u32,

    pub state: SessionState,

    /// Join timestamp (Unix epoch milliseconds)
    pub joined_at: i64,

    /// When the current challenge was issued (Unix epoch milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_issued_at: Option<i64>,
}

impl Session {
    /// Fresh session for a member who just joined
    pub fn awaiting_link(chat_name: String, user_name: String, max_reloads: u32) -> Self {
        Self {
            chat_name,
            user_name,
            welcome_message_id: None,
            challenge_chat_id: None,
            challenge_message_id: None,
            expected_code: String::new(),
            expected_code_length: 0,
            entered_digits: String::new(),
            failed_attempts: 0,
            reloads_remaining: max_reloads,
            state: SessionState::AwaitingLink,
            joined_at: chrono::Utc::now().timestamp_millis(),
            challenge_issued_at: None,
        }
    }

    /// Start (or restart) the challenge with a fresh puzzle and full budgets
    pub fn begin_challenge(&mut self, code: &str, max_reloads: u32, issued_at: i64) {
        self.install_code(code);
        self.failed_attempts = 0;
        self.reloads_remaining = max_reloads;
        self.state = SessionState::ChallengeActive;
        self.challenge_issued_at = Some(issued_at);
    }

    /// Swap in a regenerated puzzle answer; clears the input buffer
    pub fn install_code(&mut self, code: &str) {
        self.expected_code = code.to_string();
        self.expected_code_length = code.chars().count();
        self.entered_digits.clear();
    }

    /// Append one digit; refused when the buffer is full or `digit` is not a digit
    pub fn push_digit(&mut self, digit: char) -> bool {
        if !digit.is_ascii_digit() || self.entered_digits.len() >= MAX_ENTERED_DIGITS {
            return false;
        }
        self.entered_digits.push(digit);
        true
    }

    /// Clear the input buffer; returns false if it was already empty
    pub fn clear_input(&mut self) -> bool {
        if self.entered_digits.is_empty() {
            return false;
        }
        self.entered_digits.clear();
        true
    }

    pub fn input_is_full(&self) -> bool {
        self.entered_digits.len() >= MAX_ENTERED_DIGITS
    }

    /// True once enough digits are entered to submit
    pub fn input_is_submittable(&self) -> bool {
        self.entered_digits.len() >= self.expected_code_length
    }

    pub fn input_matches(&self) -> bool {
        self.entered_digits == self.expected_code
    }

    /// Milliseconds since the current challenge was issued
    pub fn challenge_elapsed_ms(&self, now_ms: i64) -> Option<i64> {
        self.challenge_issued_at.map(|issued| now_ms - issued)
    }
}

/// Puzzle flavour produced by the challenge generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorMode {
    /// Read the digits off the image
    #[default]
    Default,
    /// Solve the arithmetic expression shown
    Math,
}

/// Puzzle difficulty (0-5).
/// Controls image distortion and, in math mode, operand size. Values above
/// 5, including deserialized ones, are clamped to 5.
///
/// - 0-1: Few noise lines, single-digit arithmetic
/// - 2-3: Moderate noise, two-digit addition/subtraction
/// - 4-5: Heavy noise, multiplication allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: Difficulty = Difficulty(0);
    pub const MAX: Difficulty = Difficulty(5);
    pub const DEFAULT: Difficulty = Difficulty(1);

    /// Create a new Difficulty, clamping to valid range [0, 5]
    pub fn new(level: u8) -> Self {
        Self(level.min(Self::MAX.0))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Random lines drawn across the image
    pub fn noise_lines(&self) -> u32 {
        4 + 4 * self.0 as u32
    }

    /// Random specks sprinkled over the image
    pub fn noise_dots(&self) -> u32 {
        30 + 40 * self.0 as u32
    }

    /// Largest per-glyph tilt in degrees
    pub fn max_tilt_degrees(&self) -> f32 {
        8.0 + 5.0 * self.0 as f32
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Difficulty {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_session(code: &str) -> Session {
        let mut session = Session::awaiting_link("Rustaceans".into(), "ferris".into(), 2);
        session.begin_challenge(code, 2, 1_000);
        session
    }

    #[test]
    fn test_key_file_name_round_trip() {
        let key = SessionKey::new(-100123, 42);
        assert_eq!(key.file_name(), "-100123=42.session");
        assert_eq!(SessionKey::from_file_name(&key.file_name()), Some(key));
        assert_eq!(SessionKey::from_file_name("-100123=42.session.tmp"), None);
        assert_eq!(SessionKey::from_file_name("garbage.session"), None);
    }

    #[test]
    fn test_push_digit_caps_buffer() {
        let mut session = active_session("123");
        for d in ['1', '2', '3', '4'] {
            assert!(session.push_digit(d));
        }
        assert!(session.input_is_full());
        assert!(!session.push_digit('5'));
        assert_eq!(session.entered_digits, "1234");
    }

    #[test]
    fn test_push_digit_rejects_non_digits() {
        let mut session = active_session("123");
        assert!(!session.push_digit('x'));
        assert!(session.entered_digits.is_empty());
    }

    #[test]
    fn test_clear_input_removes_whole_buffer() {
        let mut session = active_session("123");
        assert!(!session.clear_input());
        session.push_digit('7');
        session.push_digit('8');
        assert!(session.clear_input());
        assert!(session.entered_digits.is_empty());
    }

    #[test]
    fn test_begin_challenge_resets_budgets() {
        let mut session = active_session("123");
        session.failed_attempts = 2;
        session.reloads_remaining = 0;
        session.push_digit('9');

        session.begin_challenge("4567", 3, 5_000);
        assert_eq!(session.state, SessionState::ChallengeActive);
        assert_eq!(session.expected_code_length, 4);
        assert_eq!(session.failed_attempts, 0);
        assert_eq!(session.reloads_remaining, 3);
        assert!(session.entered_digits.is_empty());
        assert_eq!(session.challenge_elapsed_ms(6_500), Some(1_500));
    }

    #[test]
    fn test_session_json_shape() {
        let session = active_session("321");
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["state"], "challenge_active");
        assert!(json.get("welcome_message_id").is_none());
        let parsed: Session = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn test_difficulty_clamps() {
        assert_eq!(Difficulty::new(42), Difficulty::MAX);
        assert!(Difficulty::new(5).noise_lines() > Difficulty::new(0).noise_lines());
    }

    #[test]
    fn test_difficulty_deserialize_clamps() {
        let parsed: Difficulty = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, Difficulty::MAX);
        assert_eq!(parsed.max_tilt_degrees(), Difficulty::MAX.max_tilt_degrees());

        let parsed: Difficulty = serde_json::from_str("3").unwrap();
        assert_eq!(parsed.value(), 3);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "3");
    }
}
