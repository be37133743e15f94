//! Seeds for reproducible noise draws
//!
//! A seed is a sequence of unsigned integers. A single integer is the
//! one-element sequence. The draw for split `i` uses the seed sequence with
//! `i` appended, so every split is reproducible on its own.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NoiseError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<u64>", from = "SeedRepr")]
pub struct Seed(Vec<u64>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedRepr {
    One(u64),
    Many(Vec<u64>),
}

impl From<SeedRepr> for Seed {
    fn from(repr: SeedRepr) -> Self {
        match repr {
            SeedRepr::One(word) => Seed(vec![word]),
            SeedRepr::Many(words) => Seed(words),
        }
    }
}

impl From<Seed> for Vec<u64> {
    fn from(seed: Seed) -> Self {
        seed.0
    }
}

impl From<u64> for Seed {
    fn from(word: u64) -> Self {
        Seed(vec![word])
    }
}

impl From<Vec<u64>> for Seed {
    fn from(words: Vec<u64>) -> Self {
        Seed(words)
    }
}

impl From<&[u64]> for Seed {
    fn from(words: &[u64]) -> Self {
        Seed(words.to_vec())
    }
}

impl TryFrom<&Value> for Seed {
    type Error = NoiseError;

    fn try_from(value: &Value) -> Result<Self> {
        fn to_word(value: &Value) -> Result<u64> {
            match value.as_u64() {
                Some(word) => Ok(word),
                None => Err(NoiseError::SeedType(format!(
                    "expected an unsigned integer, got {value}"
                ))),
            }
        }

        match value {
            Value::Number(_) => Ok(Seed(vec![to_word(value)?])),
            Value::Array(items) => items
                .iter()
                .map(to_word)
                .collect::<Result<Vec<_>>>()
                .map(Seed),
            other => Err(NoiseError::SeedType(format!(
                "expected an integer or a list of integers, got {other}"
            ))),
        }
    }
}

impl Seed {
    pub fn words(&self) -> &[u64] {
        &self.0
    }

    /// This sequence with `index` appended
    pub fn child(&self, index: u64) -> Seed {
        let mut words = self.0.clone();
        words.push(index);
        Seed(words)
    }

    /// Deterministic generator for this exact sequence.
    pub fn rng(&self) -> ChaCha8Rng {
        // length first, so [1] and [1, 0] diverge
        let mut state = self.0.len() as u64;
        let mut absorbed = splitmix64(&mut state);
        for &word in &self.0 {
            state ^= word ^ absorbed;
            absorbed = splitmix64(&mut state);
        }
        let mut key = [0u8; 32];
        for chunk in key.chunks_exact_mut(8) {
            chunk.copy_from_slice(&splitmix64(&mut state).to_le_bytes());
        }
        ChaCha8Rng::from_seed(key)
    }
}

/// Generator for the draw of one split: seeded draws are reproducible,
/// unseeded draws take fresh entropy every time.
pub(crate) fn split_rng(seed: Option<&Seed>, split: usize) -> ChaCha8Rng {
    match seed {
        Some(seed) => seed.child(split as u64).rng(),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
