//! Short shareable poll codes.

use log::{debug, warn};
use rand::{Rng, RngCore};

use crate::config::*;
use crate::repository::PollRepository;

/// Uppercase letters and digits, without the look-alikes `0`, `1`, `I` and `O`.
pub const CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Draws `length` characters uniformly from [`CODE_ALPHABET`].
pub fn random_code<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> String {
    let alphabet = CODE_ALPHABET.as_bytes();
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// True if the code could have been produced by [`random_code`] with this length.
pub fn is_well_formed(code: &str, length: usize) -> bool {
    code.chars().count() == length && code.chars().all(|c| CODE_ALPHABET.contains(c))
}

/// Returns a code that no stored poll uses yet.
///
/// Codes are drawn at random and checked against the repository. After
/// `rules.max_attempts` collisions, fails with `PollError::Exhausted`.
pub fn generate_unique_code<R, P>(rng: &mut R, rules: &CodeRules, repo: &P) -> PollResult<String>
where
    R: RngCore + ?Sized,
    P: PollRepository + ?Sized,
{
    for attempt in 1..=rules.max_attempts {
        let code = random_code(rng, rules.length);
        if repo.find_poll_by_code(&code)?.is_none() {
            debug!("generate_unique_code: {} found at attempt {}", code, attempt);
            return Ok(code);
        }
        debug!("generate_unique_code: attempt {}: {} already used", attempt, code);
    }
    warn!(
        "generate_unique_code: no free code of length {} after {} attempts",
        rules.length, rules.max_attempts
    );
    ExhaustedSnafu {
        attempts: rules.max_attempts,
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn alphabet_table() {
        assert_eq!(CODE_ALPHABET.len(), 32);
        for c in ['0', '1', 'I', 'O'] {
            assert!(!CODE_ALPHABET.contains(c), "{} should be excluded", c);
        }
        let distinct: HashSet<char> = CODE_ALPHABET.chars().collect();
        assert_eq!(distinct.len(), 32);
        assert!(CODE_ALPHABET
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn seeded_source_is_deterministic() {
        let a = random_code(&mut StdRng::seed_from_u64(7), 6);
        let b = random_code(&mut StdRng::seed_from_u64(7), 6);
        assert_eq!(a, b);
        assert!(is_well_formed(&a, 6));
    }

    #[test]
    fn well_formed() {
        assert!(is_well_formed("ABC234", 6));
        assert!(!is_well_formed("ABC23", 6));
        assert!(!is_well_formed("ABC230", 6));
        assert!(!is_well_formed("abc234", 6));
    }

    #[test]
    fn never_returns_a_used_code() {
        let repo = MemoryRepository::new();
        let mut rng = StdRng::seed_from_u64(42);
        // Short codes make collisions frequent: 32^2 = 1024 possible codes.
        let rules = CodeRules {
            length: 2,
            max_attempts: 10,
        };
        let mut seen: HashSet<String> = HashSet::new();
        for _ in 0..300 {
            match generate_unique_code(&mut rng, &rules, &repo) {
                Ok(code) => {
                    assert!(seen.insert(code.clone()), "duplicate code {}", code);
                    repo.insert_poll(Poll::new("q", &code, Utc::now())).unwrap();
                }
                Err(PollError::Exhausted { .. }) => {}
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }
        assert!(seen.len() > 250);
    }

    #[test]
    fn exhausted_when_every_code_is_taken() {
        let repo = MemoryRepository::new();
        for c in CODE_ALPHABET.chars() {
            repo.insert_poll(Poll::new("q", &c.to_string(), Utc::now()))
                .unwrap();
        }
        let rules = CodeRules {
            length: 1,
            max_attempts: 10,
        };
        let res = generate_unique_code(&mut StdRng::seed_from_u64(1), &rules, &repo);
        assert!(matches!(res, Err(PollError::Exhausted { attempts: 10 })));
    }
}
