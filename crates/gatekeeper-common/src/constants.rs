//! Shared constants for Gatekeeper components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default directory for the file-backed session store
pub const DEFAULT_SESSION_DIR: &str = "./captcha";

/// Default health endpoint listen address
pub const DEFAULT_HEALTH_ADDR: &str = "127.0.0.1:8899";

/// Hard cap on the keypad input buffer
pub const MAX_ENTERED_DIGITS: usize = 4;

/// Default keypad alphabet, in button order
pub const DEFAULT_DIGITS: &str = "1234567890";

/// Seconds a member has to solve an issued challenge
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Wrong submissions tolerated before removal
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Puzzle regenerations a member may request
pub const DEFAULT_MAX_RELOADS: u32 = 2;

/// Stored sessions outlive any realistic verification (24 hours)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

/// How often unfollowed link prompts are swept (10 minutes)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Keypad callback token wire constants
pub mod callback {
    /// Namespace prefix of every keypad token
    pub const NAMESPACE: &str = "?cap";

    /// Field separator inside a token
    pub const SEPARATOR: char = '=';

    /// Action names
    pub const RELOAD: &str = "RELOAD";
    pub const BACK: &str = "BACK";
    pub const SUBMIT: &str = "OK";
}

/// Redis key prefixes
pub mod redis_keys {
    /// Session record: gatekeeper:session:{chat_id}:{user_id}
    pub const SESSION_PREFIX: &str = "gatekeeper:session:";
}
