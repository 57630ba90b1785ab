//! Verification state machine.
//!
//! Pure transition logic for keypad events: given the stored session, the
//! decoded callback token and the pressing member, decide the next session
//! value and what the UI must do. No I/O happens here; the
//! [`Verifier`](crate::verifier::Verifier) applies decisions under the
//! session lock.

use std::time::Duration;

use gatekeeper_common::{CallbackToken, KeypadAction, Session, SessionState};

use crate::config::VerificationConfig;

/// Short rejection shown to the presser; the session is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NotYourChallenge,
    CodeTooShort,
    CodeTooLong,
    NoReloadsLeft,
}

/// How the puzzle message must be updated after a self-transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    /// Same image, new caption/keypad
    Caption,
    /// Regenerate the puzzle; `retry` annotates the caption after a wrong code
    NewPuzzle { retry: bool },
}

/// Outcome of one keypad event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Acknowledge with a notice, no mutation
    Refuse(Notice),
    /// Acknowledge silently, no mutation
    Ignore,
    /// Stay in `ChallengeActive` with an updated session
    Continue { session: Session, redraw: Redraw },
    /// Correct code: restore access, drop the session
    Verified { failed_attempts: u32 },
    /// Attempts exhausted: remove the member, drop the session
    Rejected { failed_attempts: u32 },
}

/// Decide the transition for a keypad press by `actor_id`
pub fn decide(
    session: &Session,
    token: &CallbackToken,
    actor_id: u64,
    rules: &VerificationConfig,
) -> Decision {
    if actor_id != token.user_id {
        return Decision::Refuse(Notice::NotYourChallenge);
    }
    if session.state != SessionState::ChallengeActive {
        return Decision::Ignore;
    }

    let mut next = session.clone();
    match token.action {
        KeypadAction::Digit(digit) => {
            if !next.push_digit(digit) {
                return Decision::Refuse(Notice::CodeTooLong);
            }
            Decision::Continue { session: next, redraw: Redraw::Caption }
        }
        KeypadAction::Back => {
            if !next.clear_input() {
                return Decision::Ignore;
            }
            Decision::Continue { session: next, redraw: Redraw::Caption }
        }
        KeypadAction::Reload => {
            if next.reloads_remaining == 0 {
                return Decision::Refuse(Notice::NoReloadsLeft);
            }
            next.reloads_remaining -= 1;
            next.entered_digits.clear();
            Decision::Continue {
                session: next,
                redraw: Redraw::NewPuzzle { retry: false },
            }
        }
        KeypadAction::Submit => {
            if !next.input_is_submittable() {
                return Decision::Refuse(Notice::CodeTooShort);
            }
            next.failed_attempts += 1;

            if next.input_matches() {
                Decision::Verified { failed_attempts: next.failed_attempts }
            } else if next.failed_attempts > rules.max_attempts {
                Decision::Rejected { failed_attempts: next.failed_attempts }
            } else {
                next.entered_digits.clear();
                Decision::Continue {
                    session: next,
                    redraw: Redraw::NewPuzzle { retry: true },
                }
            }
        }
    }
}

/// True when an active challenge has outlived `timeout`
pub fn timeout_due(session: &Session, now_ms: i64, timeout: Duration) -> bool {
    if session.state != SessionState::ChallengeActive {
        return false;
    }
    session
        .challenge_elapsed_ms(now_ms)
        .is_some_and(|elapsed| elapsed >= timeout.as_millis() as i64)
}
