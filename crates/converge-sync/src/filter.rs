//! Probabilistic set membership for commit ids.
//!
//! The protocol depends on two properties beyond the usual bloom contract:
//!
//! 1. **No false negatives, ever** — an id that was added always answers
//!    `true`.
//! 2. **Per-instance random hashing** — seeds are drawn from the thread RNG
//!    at construction, so two peers building filters over the *same* set
//!    produce *different* filters with different false-positive surfaces.
//!    Deterministic seeds would pin the same false positives cycle after
//!    cycle and starve convergence after the first mismatch.
//!
//! Serialization round-trips exactly: a deserialized filter answers `has`
//! identically to the original over all inputs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Default target false-positive rate.
pub const DEFAULT_FPR: f64 = 0.01;

/// The weakest useful filter; also what `low_accuracy` mode forces.
pub const MAX_FPR: f64 = 0.5;

/// Lower clamp preventing `ln(0)` blowups.
const MIN_FPR: f64 = 0.0001;

/// Minimum number of bits (a filter this small is still valid, just dense).
const MIN_NUM_BITS: u64 = 64;

/// Hash count bounds: zero hashes answer `true` for everything, and past
/// sixteen the returns vanish.
const MIN_NUM_HASHES: usize = 1;
const MAX_NUM_HASHES: usize = 16;

/// FNV-1a 64-bit parameters.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A bloom filter over commit ids with per-instance random seeds.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "FilterRepr", into = "FilterRepr")]
pub struct BloomFilter {
    /// Bit array, packed as bytes.
    bits: Vec<u8>,
    /// Number of addressable bits.
    num_bits: u64,
    /// One random seed per hash function.
    seeds: Vec<u64>,
    /// Declared expected cardinality.
    size: u64,
    /// Declared target false-positive rate.
    fpr: f64,
}

impl BloomFilter {
    /// Create a filter sized for `size` expected ids at the target `fpr`.
    ///
    /// Bit length and hash count come from the standard sizing formulae
    /// `m = -n ln(p) / (ln 2)²` and `k = (m/n) ln 2`. The `fpr` is clamped
    /// into `(0, 0.5]`; `NaN` falls back to [`DEFAULT_FPR`].
    #[must_use]
    pub fn new(size: u64, fpr: f64) -> Self {
        let fpr = if fpr.is_nan() {
            DEFAULT_FPR
        } else {
            fpr.clamp(MIN_FPR, MAX_FPR)
        };

        let n = size.max(1);
        let ln2 = core::f64::consts::LN_2;

        let m = (-(n as f64) * fpr.ln() / (ln2 * ln2)).ceil() as u64;
        let num_bits = m.max(MIN_NUM_BITS);

        let k = ((num_bits as f64 / n as f64) * ln2).ceil() as usize;
        let num_hashes = k.clamp(MIN_NUM_HASHES, MAX_NUM_HASHES);

        let mut rng = rand::thread_rng();
        let seeds = (0..num_hashes).map(|_| rng.gen()).collect();

        Self {
            bits: vec![0; num_bits.div_ceil(8) as usize],
            num_bits,
            seeds,
            size,
            fpr,
        }
    }

    /// Insert an id.
    pub fn add(&mut self, id: &str) {
        if !self.is_valid() {
            return;
        }

        for i in 0..self.seeds.len() {
            let pos = self.position(i, id);
            let byte = (pos / 8) as usize;
            if byte < self.bits.len() {
                self.bits[byte] |= 1 << (pos % 8);
            }
        }
    }

    /// Whether an id might be in the set.
    ///
    /// `true` may be a false positive (probability ≤ the declared fpr);
    /// `false` is definite.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        if !self.is_valid() {
            return false;
        }

        for i in 0..self.seeds.len() {
            let pos = self.position(i, id);
            let byte = (pos / 8) as usize;
            if byte >= self.bits.len() || self.bits[byte] & (1 << (pos % 8)) == 0 {
                return false;
            }
        }
        true
    }

    fn position(&self, seed_index: usize, id: &str) -> u64 {
        let mut hash = FNV_OFFSET_BASIS ^ self.seeds[seed_index];
        for byte in id.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash % self.num_bits
    }

    /// Structural validity. Constructors always produce valid filters;
    /// deserialization from an untrusted peer may not.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.num_bits > 0
            && !self.seeds.is_empty()
            && self.seeds.len() <= MAX_NUM_HASHES
            && self.bits.len() as u64 >= self.num_bits.div_ceil(8)
    }

    /// Estimate of the realized false-positive rate from bit density.
    #[must_use]
    pub fn saturation(&self) -> f64 {
        let ones: u64 = self.bits.iter().map(|b| u64::from(b.count_ones())).sum();
        let density = ones as f64 / self.num_bits as f64;
        density.powi(self.seeds.len() as i32)
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn fpr(&self) -> f64 {
        self.fpr
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> usize {
        self.seeds.len()
    }
}

/// Raised when a serialized filter fails structural validation.
#[derive(Debug, ThisError)]
#[error("invalid bloom filter encoding: {0}")]
pub struct InvalidFilter(String);

/// Wire shape of a filter: bit array (bs58), bit count, seeds, declared
/// size, declared fpr.
#[derive(Deserialize, Serialize)]
struct FilterRepr {
    b: String,
    n: u64,
    h: Vec<u64>,
    s: u64,
    p: f64,
}

impl From<BloomFilter> for FilterRepr {
    fn from(filter: BloomFilter) -> Self {
        Self {
            b: bs58::encode(&filter.bits).into_string(),
            n: filter.num_bits,
            h: filter.seeds,
            s: filter.size,
            p: filter.fpr,
        }
    }
}

impl TryFrom<FilterRepr> for BloomFilter {
    type Error = InvalidFilter;

    fn try_from(repr: FilterRepr) -> Result<Self, Self::Error> {
        let bits = bs58::decode(&repr.b)
            .into_vec()
            .map_err(|err| InvalidFilter(err.to_string()))?;

        let filter = Self {
            bits,
            num_bits: repr.n,
            seeds: repr.h,
            size: repr.s,
            fpr: repr.p,
        };

        if !filter.is_valid() {
            return Err(InvalidFilter("inconsistent filter dimensions".to_owned()));
        }
        if !(filter.fpr > 0.0 && filter.fpr <= MAX_FPR) {
            return Err(InvalidFilter(format!(
                "declared fpr {} out of range",
                filter.fpr
            )));
        }

        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: core::ops::Range<u64>) -> impl Iterator<Item = String> {
        range.map(|i| format!("commit-{i}"))
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::new(1_000, 0.01);

        for id in ids(0..1_000) {
            filter.add(&id);
        }
        for id in ids(0..1_000) {
            assert!(filter.has(&id), "false negative for {id}");
        }
    }

    #[test]
    fn test_empirical_fpr_within_target() {
        let target = 0.01;
        let mut filter = BloomFilter::new(1_000, target);

        for id in ids(0..1_000) {
            filter.add(&id);
        }

        let mut false_positives = 0;
        let sample = 10_000;
        for id in ids(1_000..1_000 + sample) {
            if filter.has(&id) {
                false_positives += 1;
            }
        }

        let observed = f64::from(false_positives) / f64::from(sample as u32);
        assert!(
            observed < target * 3.0,
            "observed fpr {observed} too far above target {target}"
        );
    }

    #[test]
    fn test_two_filters_over_same_set_differ() {
        let build = || {
            let mut filter = BloomFilter::new(100, 0.01);
            for id in ids(0..100) {
                filter.add(&id);
            }
            filter
        };

        // Random seeds make identical contents hash to different surfaces.
        let (a, b) = (build(), build());
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_roundtrip_preserves_answers() {
        let mut filter = BloomFilter::new(500, 0.02);
        for id in ids(0..500) {
            filter.add(&id);
        }

        let encoded = serde_json::to_string(&filter).unwrap();
        let decoded: BloomFilter = serde_json::from_str(&encoded).unwrap();

        assert_eq!(filter, decoded);
        for id in ids(0..2_000) {
            assert_eq!(filter.has(&id), decoded.has(&id));
        }
    }

    #[test]
    fn test_fpr_clamping() {
        for fpr in [0.0, -1.0, 2.0, f64::NAN, f64::INFINITY] {
            let filter = BloomFilter::new(100, fpr);
            assert!(filter.is_valid(), "fpr {fpr} produced an invalid filter");
            assert!(filter.fpr() > 0.0 && filter.fpr() <= MAX_FPR);
        }
    }

    #[test]
    fn test_low_accuracy_filter_is_small() {
        let precise = BloomFilter::new(10_000, 0.001);
        let cheap = BloomFilter::new(10_000, MAX_FPR);

        assert!(cheap.num_bits() < precise.num_bits() / 4);
    }

    #[test]
    fn test_malicious_repr_rejected() {
        // Claims a million bits but ships one byte.
        let raw = format!(
            r#"{{"b":"{}","n":1000000,"h":[1,2,3],"s":10,"p":0.01}}"#,
            bs58::encode([0_u8]).into_string()
        );
        assert!(serde_json::from_str::<BloomFilter>(&raw).is_err());

        // Zero hash functions.
        let raw = format!(
            r#"{{"b":"{}","n":64,"h":[],"s":10,"p":0.01}}"#,
            bs58::encode([0_u8; 8]).into_string()
        );
        assert!(serde_json::from_str::<BloomFilter>(&raw).is_err());

        // Out-of-range declared fpr.
        let raw = format!(
            r#"{{"b":"{}","n":64,"h":[1],"s":10,"p":0.9}}"#,
            bs58::encode([0_u8; 8]).into_string()
        );
        assert!(serde_json::from_str::<BloomFilter>(&raw).is_err());
    }

    #[test]
    fn test_saturation_grows_with_inserts() {
        let mut filter = BloomFilter::new(100, 0.01);
        let empty = filter.saturation();

        for id in ids(0..100) {
            filter.add(&id);
        }

        assert_eq!(empty, 0.0);
        assert!(filter.saturation() > 0.0);
        assert!(filter.saturation() < 0.1);
    }
}
