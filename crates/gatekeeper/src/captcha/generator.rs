use gatekeeper_common::{Difficulty, GatekeeperError, GeneratorMode};

use super::puzzle::{self, Puzzle};
use super::render::Renderer;
use super::{Challenge, ChallengeGenerator};
use crate::config::CaptchaConfig;

/// Image CAPTCHA generator configured from `[captcha]`
pub struct CaptchaGenerator {
    mode: GeneratorMode,
    difficulty: Difficulty,
    alphabet: Vec<char>,
    code_length: usize,
    renderer: Renderer,
}

impl CaptchaGenerator {
    pub fn new(config: &CaptchaConfig) -> Result<Self, GatekeeperError> {
        let alphabet: Vec<char> = config.digits.chars().collect();
        if alphabet.is_empty() {
            return Err(GatekeeperError::Config("captcha alphabet is empty".into()));
        }

        Ok(Self {
            mode: config.mode,
            difficulty: config.difficulty,
            alphabet,
            code_length: config.code_length,
            renderer: Renderer::new(config.font_path.as_deref())?,
        })
    }

    fn puzzle<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Puzzle {
        match self.mode {
            GeneratorMode::Default => puzzle::numeric(rng, &self.alphabet, self.code_length),
            GeneratorMode::Math => puzzle::arithmetic(rng, self.difficulty),
        }
    }
}

impl ChallengeGenerator for CaptchaGenerator {
    fn generate(&self) -> Result<Challenge, GatekeeperError> {
        let mut rng = rand::rng();
        let puzzle = self.puzzle(&mut rng);
        let image = self.renderer.render(&puzzle.display, self.difficulty, &mut rng)?;

        tracing::debug!(
            mode = ?self.mode,
            difficulty = self.difficulty.value(),
            length = puzzle.answer.len(),
            "Generated challenge"
        );

        Ok(Challenge::new(puzzle.answer, image))
    }
}
