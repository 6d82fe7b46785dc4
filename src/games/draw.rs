//! Keno-style draw and PC28 result derivation

use crate::errors::{Pc28Error, Pc28Result};
use crate::games::types::DrawResult;
use rand::seq::index;
use std::sync::Mutex;

/// Values drawn per round
pub const DRAW_SIZE: usize = 20;
/// Draws are taken from 1..=UNIVERSE_MAX
pub const UNIVERSE_MAX: u8 = 80;
/// Sorted values consumed by the result: three groups of six
pub const RESULT_PREFIX: usize = 18;
const GROUP_SIZE: usize = 6;

/// Source of raw draws
pub trait DrawSource: Send + Sync {
    fn generate_draw(&self) -> Vec<u8>;
}

/// Uniform sample without replacement from the thread RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraw;

impl DrawSource for RandomDraw {
    fn generate_draw(&self) -> Vec<u8> {
        generate_draw()
    }
}

/// Replays a fixed list of draws, repeating the last one
pub struct ScriptedDraw {
    draws: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedDraw {
    pub fn new(mut draws: Vec<Vec<u8>>) -> Self {
        draws.reverse();
        Self {
            draws: Mutex::new(draws),
        }
    }

    pub fn repeating(draw: Vec<u8>) -> Self {
        Self::new(vec![draw])
    }
}

impl DrawSource for ScriptedDraw {
    fn generate_draw(&self) -> Vec<u8> {
        let mut draws = match self.draws.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if draws.len() > 1 {
            draws.pop().unwrap_or_default()
        } else {
            draws.last().cloned().unwrap_or_default()
        }
    }
}

/// 20 distinct values drawn uniformly from 1..=80
pub fn generate_draw() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    index::sample(&mut rng, UNIVERSE_MAX as usize, DRAW_SIZE)
        .into_iter()
        .map(|i| i as u8 + 1)
        .collect()
}

/// Derive `(a, b, c, sum)` from a draw.
///
/// The draw is sorted ascending; `a`, `b` and `c` are the sums of sorted
/// positions 0-5, 6-11 and 12-17, each mod 10. Values past position 17 never
/// influence the result.
pub fn compute_result(draw: &[u8]) -> Pc28Result<DrawResult> {
    if draw.len() < RESULT_PREFIX {
        return Err(Pc28Error::InvalidInput(format!(
            "draw has {} values, need at least {}",
            draw.len(),
            RESULT_PREFIX
        )));
    }

    let mut sorted = draw.to_vec();
    sorted.sort_unstable();

    let digit = |group: usize| -> u8 {
        let start = group * GROUP_SIZE;
        let total: u32 = sorted[start..start + GROUP_SIZE]
            .iter()
            .map(|&v| u32::from(v))
            .sum();
        (total % 10) as u8
    };

    let (a, b, c) = (digit(0), digit(1), digit(2));
    Ok(DrawResult {
        a,
        b,
        c,
        sum: a + b + c,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ascending() -> Vec<u8> {
        (1..=20).collect()
    }

    #[test]
    fn test_standard_draw() {
        let result = compute_result(&ascending()).unwrap();
        assert_eq!((result.a, result.b, result.c, result.sum), (1, 7, 3, 11));
    }

    #[test]
    fn test_unsorted_input() {
        let mut draw = ascending();
        draw.reverse();
        assert_eq!(compute_result(&draw).unwrap(), compute_result(&ascending()).unwrap());
    }

    #[test]
    fn test_high_numbers() {
        let draw: Vec<u8> = (61..=80).collect();
        let result = compute_result(&draw).unwrap();
        assert_eq!((result.a, result.b, result.c, result.sum), (1, 7, 3, 11));
    }

    #[test]
    fn test_tail_values_do_not_matter() {
        let mut first = ascending();
        let mut second = ascending();
        first[18] = 70;
        first[19] = 71;
        second[18] = 79;
        second[19] = 80;
        assert_eq!(compute_result(&first).unwrap(), compute_result(&second).unwrap());
    }

    #[test]
    fn test_permutation_invariance() {
        let draw = generate_draw();
        let expected = compute_result(&draw).unwrap();
        let mut rotated = draw.clone();
        rotated.rotate_left(7);
        assert_eq!(compute_result(&rotated).unwrap(), expected);
        let mut swapped = draw;
        swapped.swap(0, 19);
        assert_eq!(compute_result(&swapped).unwrap(), expected);
    }

    #[test]
    fn test_result_ranges() {
        for _ in 0..500 {
            let result = compute_result(&generate_draw()).unwrap();
            assert!(result.a <= 9 && result.b <= 9 && result.c <= 9);
            assert_eq!(result.sum, result.a + result.b + result.c);
            assert!(result.sum <= 27);
        }
    }

    #[test]
    fn test_short_draw_rejected() {
        let draw: Vec<u8> = (1..=17).collect();
        assert!(matches!(compute_result(&draw), Err(Pc28Error::InvalidInput(_))));
        // Exactly 18 is enough
        let draw: Vec<u8> = (1..=18).collect();
        assert_eq!(compute_result(&draw).unwrap().sum, 11);
    }

    #[test]
    fn test_generate_draw_unique_and_in_range() {
        for _ in 0..200 {
            let draw = generate_draw();
            assert_eq!(draw.len(), DRAW_SIZE);
            let unique: HashSet<u8> = draw.iter().copied().collect();
            assert_eq!(unique.len(), DRAW_SIZE);
            assert!(draw.iter().all(|&v| (1..=UNIVERSE_MAX).contains(&v)));
        }
    }

    #[test]
    fn test_scripted_draw_replays_then_repeats() {
        let source = ScriptedDraw::new(vec![vec![1; 20], vec![2; 20]]);
        assert_eq!(source.generate_draw(), vec![1; 20]);
        assert_eq!(source.generate_draw(), vec![2; 20]);
        assert_eq!(source.generate_draw(), vec![2; 20]);
    }
}
