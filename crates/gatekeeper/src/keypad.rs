//! Keypad layout for the puzzle message.

use gatekeeper_common::{CallbackToken, KeypadAction, Session, SessionKey};

use crate::config::VerificationConfig;

/// Buttons per keyboard row
pub const ROW_WIDTH: usize = 5;

const RELOAD_LABEL: &str = "🔄";
const BACK_LABEL: &str = "⬅️";
const SUBMIT_LABEL: &str = "✅";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypadButton {
    pub label: String,
    pub action: KeypadAction,
    /// Callback data sent back when pressed
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypad {
    pub rows: Vec<Vec<KeypadButton>>,
}

impl Keypad {
    pub fn buttons(&self) -> impl Iterator<Item = &KeypadButton> {
        self.rows.iter().flatten()
    }

    pub fn button(&self, action: KeypadAction) -> Option<&KeypadButton> {
        self.buttons().find(|b| b.action == action)
    }
}

/// Build the keypad for `session`: one button per alphabet digit, reload
/// while credits remain, back, and submit labelled with attempts left.
pub fn build(key: SessionKey, session: &Session, digits: &str, rules: &VerificationConfig) -> Keypad {
    let button = |label: String, action: KeypadAction| KeypadButton {
        label,
        action,
        token: CallbackToken::new(key, action).encode(),
    };

    let mut buttons: Vec<KeypadButton> = digits
        .chars()
        .map(|d| button(d.to_string(), KeypadAction::Digit(d)))
        .collect();

    if session.reloads_remaining > 0 {
        buttons.push(button(
            format!("{RELOAD_LABEL} {}", session.reloads_remaining),
            KeypadAction::Reload,
        ));
    }
    buttons.push(button(BACK_LABEL.to_string(), KeypadAction::Back));
    buttons.push(button(submit_label(session, rules), KeypadAction::Submit));

    let rows = buttons
        .chunks(ROW_WIDTH)
        .map(|row| row.to_vec())
        .collect();

    Keypad { rows }
}

fn submit_label(session: &Session, rules: &VerificationConfig) -> String {
    let mut attempts_left = rules.max_attempts as i64 - session.failed_attempts as i64;
    if rules.max_incorrect_to_auto_reload <= 0 {
        attempts_left = 0;
    }

    if attempts_left <= 0 {
        SUBMIT_LABEL.to_string()
    } else {
        format!("{SUBMIT_LABEL} {attempts_left}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new(-100, 42)
    }

    fn session(reloads: u32, failed: u32) -> Session {
        let mut session = Session::awaiting_link("chat".into(), "user".into(), reloads);
        session.begin_challenge("123", reloads, 0);
        session.failed_attempts = failed;
        session
    }

    #[test]
    fn test_layout() {
        let keypad = build(key(), &session(2, 0), "1234567890", &VerificationConfig::default());

        let labels: Vec<&str> = keypad.buttons().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "🔄 2", "⬅️", "✅ 2"]
        );
        assert_eq!(keypad.rows.len(), 3);
        assert!(keypad.rows.iter().all(|row| row.len() <= ROW_WIDTH));
        assert_eq!(
            keypad.button(KeypadAction::Digit('7')).unwrap().token,
            "?cap=42=7=-100"
        );
    }

    #[test]
    fn test_reload_hidden_without_credits() {
        let keypad = build(key(), &session(0, 0), "1234567890", &VerificationConfig::default());
        assert!(keypad.button(KeypadAction::Reload).is_none());
        assert!(keypad.button(KeypadAction::Back).is_some());
        assert_eq!(keypad.buttons().filter(|b| matches!(b.action, KeypadAction::Digit(_))).count(), 10);
    }

    #[test]
    fn test_submit_label_floors_at_empty() {
        let rules = VerificationConfig::default();
        let keypad = build(key(), &session(2, 1), "1234567890", &rules);
        assert_eq!(keypad.button(KeypadAction::Submit).unwrap().label, "✅ 1");

        let keypad = build(key(), &session(2, 2), "1234567890", &rules);
        assert_eq!(keypad.button(KeypadAction::Submit).unwrap().label, "✅");

        let hidden = VerificationConfig {
            max_incorrect_to_auto_reload: 0,
            ..VerificationConfig::default()
        };
        let keypad = build(key(), &session(2, 0), "1234567890", &hidden);
        assert_eq!(keypad.button(KeypadAction::Submit).unwrap().label, "✅");
    }
}
