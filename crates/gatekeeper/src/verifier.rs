//! Verification orchestrator.
//!
//! Turns platform events into session transitions. Every transition for a
//! key runs under that key's lock, end to end: load, decide, platform side
//! effects and persistence. Store and platform calls are retried; a failure
//! that survives the retries aborts the transition with the stored session
//! exactly as it was, so the member can simply press again.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use gatekeeper_common::{
    CallbackToken, DeepLinkPayload, GatekeeperError, Session, SessionKey, SessionState,
};

use crate::access::AccessController;
use crate::captcha::{Challenge, ChallengeGenerator};
use crate::config::{AppConfig, ExpiryAction, RetryConfig, VerificationConfig};
use crate::keypad;
use crate::locks::SessionLocks;
use crate::machine::{self, Decision, Notice, Redraw};
use crate::messages::{self, Messages};
use crate::platform::Platform;
use crate::retry::with_retry;
use crate::store::SessionStore;

/// A member appeared in a guarded chat
#[derive(Debug, Clone)]
pub struct MemberJoined {
    pub chat_id: i64,
    pub chat_title: Option<String>,
    pub chat_username: Option<String>,
    pub user_id: u64,
    pub username: Option<String>,
    pub first_name: String,
}

/// Someone opened the bot through a deep link
#[derive(Debug, Clone)]
pub struct LinkFollowed {
    pub payload: String,
    pub actor_id: u64,
    /// Private chat the puzzle is sent to
    pub private_chat_id: i64,
}

/// Keypad button pressed
#[derive(Debug, Clone)]
pub struct KeypadPress {
    pub callback_id: String,
    pub actor_id: u64,
    pub data: String,
    /// Chat and id of the message carrying the pressed keypad
    pub message: Option<(i64, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Member muted and prompted
    Prompted,
    /// Fresh puzzle sent
    ChallengeIssued,
    /// Puzzle message redrawn
    Updated,
    Refused(Notice),
    /// Stale, foreign or malformed event
    Ignored,
    Verified,
    Rejected,
    Expired,
}

#[derive(Debug, Default)]
struct Counters {
    joined: AtomicU64,
    challenges: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub joined: u64,
    pub challenges: u64,
    pub verified: u64,
    pub rejected: u64,
    pub expired: u64,
}

pub struct Verifier {
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    generator: Arc<dyn ChallengeGenerator>,
    platform: Arc<dyn Platform>,
    access: AccessController,
    rules: VerificationConfig,
    /// Keypad alphabet
    digits: String,
    messages: Messages,
    retry: RetryConfig,
    /// Lifetime of a session whose link was never followed
    session_ttl: Duration,
    counters: Counters,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Verifier {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn ChallengeGenerator>,
        platform: Arc<dyn Platform>,
        config: &AppConfig,
    ) -> Self {
        Self {
            access: AccessController::new(platform.clone(), config.retry.clone()),
            store,
            locks: SessionLocks::new(),
            generator,
            platform,
            rules: config.verification.clone(),
            digits: config.captcha.digits.clone(),
            messages: config.messages.clone(),
            retry: config.retry.clone(),
            session_ttl: config.store.session_ttl(),
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Keys currently holding a lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            joined: self.counters.joined.load(Ordering::Relaxed),
            challenges: self.counters.challenges.load(Ordering::Relaxed),
            verified: self.counters.verified.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }

    // === Events ===

    /// Mute the member, post the deep-link prompt and start a fresh session.
    /// A previous session for the same key is discarded with its messages.
    pub async fn on_member_joined(&self, event: MemberJoined) -> Result<Outcome, GatekeeperError> {
        let key = SessionKey::new(event.chat_id, event.user_id);
        self.locks.with_lock(key, self.member_joined(key, event)).await
    }

    async fn member_joined(
        &self,
        key: SessionKey,
        event: MemberJoined,
    ) -> Result<Outcome, GatekeeperError> {
        if let Some(previous) = self.load_session(key).await? {
            debug!(session = %key, state = %previous.state, "Replacing previous session");
            self.discard_messages(key, &previous).await;
        }

        self.access.restrict(key).await?;

        let user_name = messages::display_name(event.username.as_deref(), &event.first_name);
        let chat_name =
            messages::chat_label(event.chat_title.as_deref(), event.chat_username.as_deref());

        let link = self
            .platform
            .start_link(&DeepLinkPayload::new(key).encode());
        let text = self
            .messages
            .welcome(&messages::mention(event.user_id, &user_name));

        let welcome_id = with_retry(&self.retry, "send prompt", || {
            self.platform
                .send_prompt(key.chat_id, &text, &self.messages.verify_button, &link)
        })
        .await?;

        let mut session = Session::awaiting_link(chat_name, user_name, self.rules.max_reloads);
        session.welcome_message_id = Some(welcome_id);
        self.save_session(key, &session).await?;

        self.counters.joined.fetch_add(1, Ordering::Relaxed);
        info!(session = %key, "Member joined, verification prompted");
        Ok(Outcome::Prompted)
    }

    /// Issue a puzzle to the invited member and arm the expiry timer
    pub async fn on_link_followed(
        self: &Arc<Self>,
        event: LinkFollowed,
    ) -> Result<Outcome, GatekeeperError> {
        let payload = match DeepLinkPayload::decode(&event.payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(actor = event.actor_id, error = %e, "Ignoring deep link");
                return Ok(Outcome::Ignored);
            }
        };

        let key = payload.key();
        if event.actor_id != key.user_id {
            debug!(session = %key, actor = event.actor_id, "Deep link followed by another user");
            return Ok(Outcome::Ignored);
        }

        let outcome = self
            .locks
            .with_lock(key, self.link_followed(key, event.private_chat_id))
            .await?;

        if outcome == Outcome::ChallengeIssued {
            self.schedule_timeout(key, self.rules.timeout());
        }
        Ok(outcome)
    }

    async fn link_followed(
        &self,
        key: SessionKey,
        private_chat_id: i64,
    ) -> Result<Outcome, GatekeeperError> {
        let Some(mut session) = self.load_session(key).await? else {
            debug!(session = %key, "Deep link for unknown session");
            return Ok(Outcome::Ignored);
        };

        let challenge = self.fresh_challenge().await?;
        let previous = session.challenge_chat_id.zip(session.challenge_message_id);

        session.begin_challenge(&challenge.code, self.rules.max_reloads, now_ms());
        let keypad = keypad::build(key, &session, &self.digits, &self.rules);
        let caption = self.messages.challenge_caption(&session, false);

        let message_id = with_retry(&self.retry, "send challenge", || {
            self.platform
                .send_challenge(private_chat_id, &challenge.image, &caption, &keypad)
        })
        .await?;

        if let Some((chat_id, message_id)) = previous {
            self.delete_quietly(chat_id, message_id).await;
        }

        session.challenge_chat_id = Some(private_chat_id);
        session.challenge_message_id = Some(message_id);
        self.save_session(key, &session).await?;

        self.counters.challenges.fetch_add(1, Ordering::Relaxed);
        info!(session = %key, length = challenge.length, "Challenge issued");
        Ok(Outcome::ChallengeIssued)
    }

    /// Apply one keypad press
    pub async fn on_keypad(&self, press: KeypadPress) -> Result<Outcome, GatekeeperError> {
        let token = match CallbackToken::parse(&press.data) {
            Ok(token) => token,
            Err(e) => {
                debug!(actor = press.actor_id, error = %e, "Ignoring keypad press");
                self.answer(&press.callback_id, None, false).await;
                return Ok(Outcome::Ignored);
            }
        };

        let key = token.key();
        self.locks
            .with_lock(key, self.keypad_pressed(key, &token, &press))
            .await
    }

    async fn keypad_pressed(
        &self,
        key: SessionKey,
        token: &CallbackToken,
        press: &KeypadPress,
    ) -> Result<Outcome, GatekeeperError> {
        let Some(session) = self.load_session(key).await? else {
            debug!(session = %key, "Keypad press for unknown session");
            self.answer(&press.callback_id, None, false).await;
            return Ok(Outcome::Ignored);
        };

        // Presses on a superseded puzzle message
        if let (Some(current), Some((_, pressed))) = (session.challenge_message_id, press.message)
            && current != pressed
        {
            debug!(session = %key, current, pressed, "Keypad press on stale challenge");
            self.answer(&press.callback_id, None, false).await;
            return Ok(Outcome::Ignored);
        }

        match machine::decide(&session, token, press.actor_id, &self.rules) {
            Decision::Refuse(notice) => {
                debug!(session = %key, ?notice, actor = press.actor_id, "Keypad press refused");
                self.answer(&press.callback_id, Some(self.messages.notice(notice)), true)
                    .await;
                Ok(Outcome::Refused(notice))
            }
            Decision::Ignore => {
                self.answer(&press.callback_id, None, false).await;
                Ok(Outcome::Ignored)
            }
            Decision::Continue { session: mut next, redraw } => {
                let (challenge, retry) = match redraw {
                    Redraw::Caption => (None, false),
                    Redraw::NewPuzzle { retry } => {
                        let challenge = self.fresh_challenge().await?;
                        next.install_code(&challenge.code);
                        (Some(challenge), retry)
                    }
                };

                // The stored code must match the puzzle on screen: persist
                // first and put the previous session back if the redraw fails
                self.save_session(key, &next).await?;
                let image = challenge.as_ref().map(|c| c.image.as_slice());
                if let Err(e) = self.redraw(key, &next, image, retry).await {
                    if let Err(restore) = self.save_session(key, &session).await {
                        error!(session = %key, error = %restore, "Failed to restore session after redraw failure");
                    }
                    return Err(e);
                }

                self.answer(&press.callback_id, None, false).await;
                Ok(Outcome::Updated)
            }
            Decision::Verified { failed_attempts } => {
                self.access.unrestrict(key).await?;
                self.delete_session(key).await?;
                self.discard_messages(key, &session).await;
                self.answer(&press.callback_id, None, false).await;

                self.counters.verified.fetch_add(1, Ordering::Relaxed);
                info!(session = %key, attempts = failed_attempts, "Member verified");
                Ok(Outcome::Verified)
            }
            Decision::Rejected { failed_attempts } => {
                self.access.remove(key).await?;
                self.delete_session(key).await?;
                self.discard_messages(key, &session).await;
                self.answer(&press.callback_id, None, false).await;

                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                info!(session = %key, attempts = failed_attempts, "Member rejected");
                Ok(Outcome::Rejected)
            }
        }
    }

    /// Expire the session if its challenge is still active and overdue
    pub async fn on_timeout(&self, key: SessionKey) -> Result<Outcome, GatekeeperError> {
        self.locks.with_lock(key, self.timed_out(key)).await
    }

    async fn timed_out(&self, key: SessionKey) -> Result<Outcome, GatekeeperError> {
        let Some(session) = self.load_session(key).await? else {
            return Ok(Outcome::Ignored);
        };
        if !machine::timeout_due(&session, now_ms(), self.rules.timeout()) {
            return Ok(Outcome::Ignored);
        }

        if self.rules.expiry_action == ExpiryAction::Remove {
            self.access.remove(key).await?;
        }
        self.delete_session(key).await?;
        self.discard_messages(key, &session).await;

        let notice = self.messages.expired(&session.user_name);
        if let Err(e) = with_retry(&self.retry, "send expiry notice", || {
            self.platform.send_text(key.chat_id, &notice)
        })
        .await
        {
            warn!(session = %key, error = %e, "Failed to post expiry notice");
        }

        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        info!(session = %key, action = ?self.rules.expiry_action, "Challenge expired");
        Ok(Outcome::Expired)
    }

    // === Timers ===

    /// Check the session for expiry after `delay`
    pub fn schedule_timeout(self: &Arc<Self>, key: SessionKey, delay: Duration) {
        let verifier = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match verifier.on_timeout(key).await {
                Ok(Outcome::Expired) => {}
                Ok(_) => debug!(session = %key, "Expiry timer found nothing to expire"),
                Err(e) => error!(session = %key, error = %e, "Expiry handling failed"),
            }
        });
    }

    /// Re-arm expiry timers for challenges persisted before a restart
    pub async fn recover_timeouts(self: &Arc<Self>) -> Result<usize, GatekeeperError> {
        let now = now_ms();
        let timeout = self.rules.timeout();
        let mut armed = 0;

        for key in self.session_keys().await? {
            let Some(session) = self.load_session(key).await? else {
                continue;
            };
            if session.state != SessionState::ChallengeActive {
                continue;
            }

            let elapsed = session.challenge_elapsed_ms(now).unwrap_or(0).max(0) as u64;
            self.schedule_timeout(key, timeout.saturating_sub(Duration::from_millis(elapsed)));
            armed += 1;
        }

        info!(armed, backend = self.store.name(), "Expiry timers restored");
        Ok(armed)
    }

    /// Drop sessions whose deep link was never followed within the session
    /// lifetime, along with their prompts. Members stay muted.
    pub async fn sweep_abandoned(&self) -> Result<usize, GatekeeperError> {
        let cutoff = now_ms().saturating_sub(self.session_ttl.as_millis() as i64);
        let mut swept = 0;

        for key in self.session_keys().await? {
            if self.locks.with_lock(key, self.sweep_one(key, cutoff)).await? {
                swept += 1;
            }
        }

        if swept > 0 {
            info!(swept, "Abandoned sessions removed");
        }
        Ok(swept)
    }

    async fn sweep_one(&self, key: SessionKey, cutoff: i64) -> Result<bool, GatekeeperError> {
        let Some(session) = self.load_session(key).await? else {
            return Ok(false);
        };
        if session.state != SessionState::AwaitingLink || session.joined_at > cutoff {
            return Ok(false);
        }

        self.delete_session(key).await?;
        self.discard_messages(key, &session).await;
        debug!(session = %key, "Abandoned session removed");
        Ok(true)
    }

    /// Run `sweep_abandoned` every `period` for the life of the process
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) {
        let verifier = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = verifier.sweep_abandoned().await {
                    warn!(error = %e, "Abandoned session sweep failed");
                }
            }
        });
    }

    // === Store access ===

    async fn load_session(&self, key: SessionKey) -> Result<Option<Session>, GatekeeperError> {
        with_retry(&self.retry, "load session", || self.store.load(&key)).await
    }

    async fn save_session(&self, key: SessionKey, session: &Session) -> Result<(), GatekeeperError> {
        with_retry(&self.retry, "save session", || self.store.save(&key, session)).await
    }

    async fn delete_session(&self, key: SessionKey) -> Result<(), GatekeeperError> {
        with_retry(&self.retry, "delete session", || self.store.delete(&key)).await
    }

    async fn session_keys(&self) -> Result<Vec<SessionKey>, GatekeeperError> {
        with_retry(&self.retry, "list sessions", || self.store.keys()).await
    }

    // === Helpers ===

    /// Generate on the blocking pool; one retry before giving up
    async fn fresh_challenge(&self) -> Result<Challenge, GatekeeperError> {
        match self.generate_once().await {
            Ok(challenge) => Ok(challenge),
            Err(e) => {
                warn!(error = %e, "Challenge generation failed, retrying");
                self.generate_once().await
            }
        }
    }

    async fn generate_once(&self) -> Result<Challenge, GatekeeperError> {
        let generator = Arc::clone(&self.generator);
        tokio::task::spawn_blocking(move || generator.generate())
            .await
            .map_err(|e| GatekeeperError::Internal(format!("generator task failed: {e}")))?
    }

    async fn redraw(
        &self,
        key: SessionKey,
        session: &Session,
        image: Option<&[u8]>,
        retry: bool,
    ) -> Result<(), GatekeeperError> {
        let Some((chat_id, message_id)) = session.challenge_chat_id.zip(session.challenge_message_id)
        else {
            return Err(GatekeeperError::Internal(format!(
                "session {key} is active without a challenge message"
            )));
        };

        let keypad = keypad::build(key, session, &self.digits, &self.rules);
        let caption = self.messages.challenge_caption(session, retry);

        with_retry(&self.retry, "edit challenge", || {
            self.platform
                .edit_challenge(chat_id, message_id, image, &caption, &keypad)
        })
        .await
    }

    /// Remove the welcome prompt and the puzzle message, ignoring failures
    async fn discard_messages(&self, key: SessionKey, session: &Session) {
        if let Some(message_id) = session.welcome_message_id {
            self.delete_quietly(key.chat_id, message_id).await;
        }
        if let Some((chat_id, message_id)) =
            session.challenge_chat_id.zip(session.challenge_message_id)
        {
            self.delete_quietly(chat_id, message_id).await;
        }
    }

    async fn delete_quietly(&self, chat_id: i64, message_id: i32) {
        if let Err(e) = self.platform.delete_message(chat_id, message_id).await {
            debug!(chat_id, message_id, error = %e, "Could not delete message");
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>, alert: bool) {
        if let Err(e) = self.platform.answer_action(callback_id, text, alert).await {
            warn!(error = %e, "Failed to answer keypad press");
        }
    }
}
