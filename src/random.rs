//! Salted hash randomization primitives
//!
//! **Problem**: assignments must be reproducible without storing them. The
//! same (salt, unit) pair has to land in the same bucket on every process and
//! on every implementation that shares the assignment history.
//!
//! **Solution**: PlanOut's hash construction, pinned bit for bit:
//!
//! ```text
//! salty    = full_salt  |  "{experiment_salt}.{param_salt}"
//! input    = "{salty}.{unit_1}.{unit_2}...[.{appended}]"
//! hash     = first 15 hex digits of SHA1(input)   (60 bits)
//! uniform  = hash / 0xFFFFFFFFFFFFFFF
//! ```
//!
//! Every draw derives from `hash`, so two draws with the same inputs always
//! agree.

use crate::text::python_str;
use crate::{Error, Result};
use serde_json::Value;
use sha1::{Digest, Sha1};

/// Scale of the 60-bit hash prefix (`0xFFFFFFFFFFFFFFF`).
pub const LONG_SCALE: f64 = 1_152_921_504_606_846_975.0;

/// Render a unit value the way the legacy assignment history did.
///
/// This is Python's `str()`: strings verbatim, integral floats with a
/// trailing `.0`, `1e-05`-style exponents, booleans as `True`/`False`, null as
/// `None` and lists as `[1, 'a']`. See [`crate::text`].
#[must_use]
pub fn unit_string(value: &Value) -> String {
    python_str(value)
}

/// Deterministic random source for one operator evaluation.
///
/// Holds the salted prefix with the rendered unit already appended, so
/// repeated draws (one per element in `sample`) only format the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Randomizer {
    prefix: String,
}

impl Randomizer {
    /// Build from the experiment salt and the operator's own salt.
    #[must_use]
    pub fn new(experiment_salt: &str, param_salt: &str, units: &[Value]) -> Self {
        Self::with_full_salt(&format!("{experiment_salt}.{param_salt}"), units)
    }

    /// Build from a full salt that replaces the experiment/param pair.
    #[must_use]
    pub fn with_full_salt(full_salt: &str, units: &[Value]) -> Self {
        let mut prefix = String::from(full_salt);
        for unit in units {
            prefix.push('.');
            prefix.push_str(&unit_string(unit));
        }
        Self { prefix }
    }

    /// The string that gets hashed when nothing is appended.
    #[must_use]
    pub fn hash_input(&self) -> &str {
        &self.prefix
    }

    /// 60-bit hash of the unit.
    #[must_use]
    pub fn hash(&self) -> u64 {
        sha1_prefix(&self.prefix)
    }

    /// 60-bit hash of the unit with one extra value appended.
    #[must_use]
    pub fn hash_appended(&self, appended: &Value) -> u64 {
        sha1_prefix(&format!("{}.{}", self.prefix, unit_string(appended)))
    }

    /// Uniform real in `[min, max]`.
    #[must_use]
    pub fn uniform(&self, min: f64, max: f64) -> f64 {
        scale(self.hash(), min, max)
    }

    /// Uniform real in `[min, max]` with an appended unit.
    #[must_use]
    pub fn uniform_appended(&self, min: f64, max: f64, appended: &Value) -> f64 {
        scale(self.hash_appended(appended), min, max)
    }

    /// Uniform integer in `[min, max]` inclusive.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if `min > max`
    pub fn integer(&self, min: i64, max: i64) -> Result<i64> {
        if min > max {
            return Err(Error::InvalidOperator(format!(
                "randomInteger min {min} is greater than max {max}"
            )));
        }
        let span = (i128::from(max) - i128::from(min) + 1) as u128;
        let offset = u128::from(self.hash()) % span;
        // offset < span, so min + offset stays within [min, max]
        Ok((i128::from(min) + offset as i128) as i64)
    }

    /// Index into a choice list of length `len`.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if `len == 0`
    pub fn choose_index(&self, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(Error::InvalidOperator(
                "uniformChoice requires at least one choice".to_string(),
            ));
        }
        Ok((self.hash() % len as u64) as usize)
    }

    /// Index drawn proportionally to `weights`.
    ///
    /// Weights need not sum to one. The stop value is drawn uniformly from
    /// `[0, total]` and the first bucket whose cumulative weight reaches it
    /// wins.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if the list is empty, any weight is negative
    /// or not finite, or the total is not positive
    pub fn weighted_index(&self, weights: &[f64]) -> Result<usize> {
        if weights.is_empty() {
            return Err(Error::InvalidOperator(
                "weightedChoice requires at least one choice".to_string(),
            ));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::InvalidOperator(format!(
                "weightedChoice weight {w} must be a non-negative number"
            )));
        }

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for w in weights {
            total += w;
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(Error::InvalidOperator(
                "weightedChoice weights must sum to a positive value".to_string(),
            ));
        }

        let stop = self.uniform(0.0, total);
        Ok(cumulative
            .iter()
            .position(|c| stop <= *c)
            .unwrap_or(weights.len() - 1))
    }

    /// Bernoulli draw: true with probability `p`.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if `p` is outside `[0, 1]`
    pub fn bernoulli(&self, p: f64) -> Result<bool> {
        check_probability(p)?;
        Ok(self.uniform(0.0, 1.0) <= p)
    }

    /// Bernoulli draw keyed on an appended value.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if `p` is outside `[0, 1]`
    pub fn bernoulli_appended(&self, p: f64, appended: &Value) -> Result<bool> {
        check_probability(p)?;
        Ok(self.uniform_appended(0.0, 1.0, appended) <= p)
    }

    /// Deterministic Fisher-Yates shuffle.
    ///
    /// Step `i` (from the back) swaps with `hash(unit, i) % (i + 1)`.
    #[must_use]
    pub fn shuffle<T>(&self, mut items: Vec<T>) -> Vec<T> {
        for i in (1..items.len()).rev() {
            let j = (self.hash_appended(&Value::from(i as u64)) % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
        items
    }
}

fn check_probability(p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::InvalidOperator(format!(
            "probability {p} is outside [0, 1]"
        )))
    }
}

// No fused multiply-add: the rounding has to match the legacy history.
#[allow(clippy::suboptimal_flops)]
fn scale(hash: u64, min: f64, max: f64) -> f64 {
    let zero_to_one = hash as f64 / LONG_SCALE;
    min + (max - min) * zero_to_one
}

fn sha1_prefix(input: &str) -> u64 {
    let digest = Sha1::digest(input.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) >> 4
}
