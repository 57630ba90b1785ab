//! Puzzle text and answers.

use gatekeeper_common::Difficulty;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::ops::RangeInclusive;

/// What the image shows and what the member must type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    pub display: String,
    pub answer: String,
}

/// Random code of `length` characters drawn from `alphabet`
pub fn numeric<R: Rng + ?Sized>(rng: &mut R, alphabet: &[char], length: usize) -> Puzzle {
    let answer: String = (0..length)
        .filter_map(|_| alphabet.choose(&mut *rng).copied())
        .collect();

    Puzzle {
        display: answer.clone(),
        answer,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Subtract,
    Multiply,
}

impl Operator {
    fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => 'x',
        }
    }
}

/// Arithmetic expression; the answer is never negative and at most 4 digits
pub fn arithmetic<R: Rng + ?Sized>(rng: &mut R, difficulty: Difficulty) -> Puzzle {
    let operators: &[Operator] = match difficulty.value() {
        0..=3 => &[Operator::Add, Operator::Subtract],
        _ => &[Operator::Add, Operator::Subtract, Operator::Multiply],
    };
    let operator = *operators.choose(rng).unwrap_or(&Operator::Add);

    let operand_range: RangeInclusive<u32> = match difficulty.value() {
        0..=1 => 1..=9,
        2..=3 => 10..=99,
        _ => 10..=999,
    };

    let (mut a, mut b): (u32, u32) = match operator {
        Operator::Multiply => (rng.random_range(10..=99), rng.random_range(2..=9)),
        _ => (
            rng.random_range(operand_range.clone()),
            rng.random_range(operand_range),
        ),
    };

    let result = match operator {
        Operator::Add => a + b,
        Operator::Subtract => {
            if a < b {
                std::mem::swap(&mut a, &mut b);
            }
            a - b
        }
        Operator::Multiply => a * b,
    };

    Puzzle {
        display: format!("{a} {} {b} = ?", operator.symbol()),
        answer: result.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_numeric_uses_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let alphabet: Vec<char> = "357".chars().collect();
        for _ in 0..100 {
            let puzzle = numeric(&mut rng, &alphabet, 4);
            assert_eq!(puzzle.answer.len(), 4);
            assert_eq!(puzzle.display, puzzle.answer);
            assert!(puzzle.answer.chars().all(|c| alphabet.contains(&c)));
        }
    }

    #[test]
    fn test_arithmetic_answers_are_enterable() {
        let mut rng = StdRng::seed_from_u64(11);
        for level in 0..=5 {
            for _ in 0..500 {
                let puzzle = arithmetic(&mut rng, Difficulty::new(level));
                assert!(puzzle.answer.chars().all(|c| c.is_ascii_digit()), "{puzzle:?}");
                assert!((1..=4).contains(&puzzle.answer.len()), "{puzzle:?}");
                assert!(puzzle.display.ends_with("= ?"));
            }
        }
    }

    #[test]
    fn test_arithmetic_evaluates() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let puzzle = arithmetic(&mut rng, Difficulty::MAX);
            let parts: Vec<&str> = puzzle.display.split(' ').collect();
            let (a, b): (u32, u32) = (parts[0].parse().unwrap(), parts[2].parse().unwrap());
            let expected = match parts[1] {
                "+" => a + b,
                "-" => a - b,
                "x" => a * b,
                op => panic!("unexpected operator {op}"),
            };
            assert_eq!(puzzle.answer, expected.to_string());
        }
    }
}
