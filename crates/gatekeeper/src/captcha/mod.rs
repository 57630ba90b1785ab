//! CAPTCHA generation.
//!
//! A challenge is an expected answer (digits only) plus a PNG showing the
//! puzzle. Generation is CPU-bound and synchronous; callers run it on the
//! blocking pool.

mod generator;
mod puzzle;
mod render;

pub use generator::CaptchaGenerator;

use gatekeeper_common::GatekeeperError;

/// One generated puzzle
#[derive(Clone)]
pub struct Challenge {
    /// Correct answer, ASCII digits
    pub code: String,
    /// Rendered PNG
    pub image: Vec<u8>,
    pub length: usize,
}

impl Challenge {
    pub fn new(code: String, image: Vec<u8>) -> Self {
        let length = code.chars().count();
        Self { code, image, length }
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Challenge")
            .field("length", &self.length)
            .field("image_bytes", &self.image.len())
            .finish()
    }
}

/// Source of fresh challenges
pub trait ChallengeGenerator: Send + Sync {
    fn generate(&self) -> Result<Challenge, GatekeeperError>;
}
