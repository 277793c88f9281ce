//! Deterministic input → sigil encoding.
//!
//! Text is hashed with a 32-bit rolling hash over UTF-16 code units
//! (`hash = hash * 31 + unit`, wrapping). The hash seeds a sine recurrence
//! (`s = sin(s) * 10000`, yield `frac(s)`) whose first 64 draws form the
//! pattern and whose 65th draw sets `strength = 0.5 + draw * 0.5`.
//!
//! The sine recurrence is kept bit-for-bit so stored sigils stay comparable.
//! It relies on the platform `sin`, so golden values are only guaranteed on
//! targets whose libm agrees with the one that produced them.

use rayon::prelude::*;

use crate::constants::{HASH_MULTIPLIER, PATTERN_DIM, SINE_SCALE, STRENGTH_FLOOR};
use crate::sigil::{Category, Pattern, Sigil, SourceKind};
use crate::snapshot::{self, ConsciousnessSnapshot};

/// Rolling 32-bit hash of `text`. The empty string hashes to 0.
pub fn text_hash(text: &str) -> i32 {
    text.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_mul(HASH_MULTIPLIER)
            .wrapping_add(i32::from(unit))
    })
}

/// Sine-based seeded generator. Not cryptographic; a seed of 0 yields 0 forever.
#[derive(Clone, Debug)]
pub struct SineRng {
    state: f64,
}

impl SineRng {
    pub fn new(seed: i32) -> Self {
        Self {
            state: f64::from(seed),
        }
    }

    /// Next draw in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.sin() * SINE_SCALE;
        self.state - self.state.floor()
    }
}

impl Iterator for SineRng {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_f64())
    }
}

/// Pattern and strength fully determined by an origin hash.
pub fn derive_from_hash(hash: i32) -> (Pattern, f64) {
    let mut rng = SineRng::new(hash);
    let mut values = [0.0; PATTERN_DIM];
    for v in &mut values {
        *v = rng.next_f64();
    }
    let strength = STRENGTH_FLOOR + rng.next_f64() * (1.0 - STRENGTH_FLOOR);
    (Pattern::new(values), strength)
}

/// Canonical text form of a pattern, used to hash snapshot-derived sigils.
fn canonical_form(pattern: &Pattern) -> String {
    pattern
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Stateless encoder. Construct one and pass it by reference; instances are
/// interchangeable and safe to share across threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode free text. Same `text` and `kind` always give the same pattern,
    /// category, strength and origin hash; only id and timestamp differ.
    pub fn encode_text(&self, text: &str, kind: SourceKind) -> Sigil {
        let hash = text_hash(text);
        let (pattern, strength) = derive_from_hash(hash);
        Sigil::new(pattern, Category::from_hash(hash), kind, strength, hash)
    }

    /// Pack a snapshot into a 64-d vector. Never fails; see [`snapshot`] for the layout.
    pub fn encode_snapshot(&self, snapshot: &ConsciousnessSnapshot) -> Pattern {
        snapshot::pack(snapshot)
    }

    /// Inverse of [`Encoder::encode_snapshot`] for the named leading fields.
    pub fn decode_vector(&self, pattern: &Pattern) -> ConsciousnessSnapshot {
        snapshot::unpack(pattern)
    }

    /// Sigil whose pattern is the packed snapshot. The origin hash is the text
    /// hash of the packed vector's canonical form; category and strength follow
    /// from it exactly as for text.
    pub fn encode_snapshot_sigil(
        &self,
        snapshot: &ConsciousnessSnapshot,
        kind: SourceKind,
    ) -> Sigil {
        let pattern = self.encode_snapshot(snapshot);
        let hash = text_hash(&canonical_form(&pattern));
        let (_, strength) = derive_from_hash(hash);
        Sigil::new(pattern, Category::from_hash(hash), kind, strength, hash)
    }

    /// Encode independent texts in parallel. Output order matches input order.
    pub fn encode_batch<S>(&self, inputs: &[(S, SourceKind)]) -> Vec<Sigil>
    where
        S: AsRef<str> + Sync,
    {
        inputs
            .par_iter()
            .map(|(text, kind)| self.encode_text(text.as_ref(), *kind))
            .collect()
    }
}
