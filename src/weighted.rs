//! Weighted-choice sampler shared between the echo server's `status` and
//! `delay` query parameters: both accept either a bare value or a
//! distribution spec `value1:weight1,value2:weight2,...`.

use rand::Rng;

use crate::error::{CoreError, CoreResult};

/// One `(value, weight)` entry in a parsed distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEntry<T> {
    pub value: T,
    pub weight: f64,
}

/// A parsed weighted distribution over values of type `T`.
#[derive(Debug, Clone)]
pub struct Distribution<T> {
    entries: Vec<WeightedEntry<T>>,
    total_weight: f64,
}

impl<T: Clone> Distribution<T> {
    /// A distribution with a single value at weight 1 — the common case
    /// where the query parameter was a bare value, not a `v:w,...` spec.
    pub fn constant(value: T) -> Self {
        Self {
            entries: vec![WeightedEntry { value, weight: 1.0 }],
            total_weight: 1.0,
        }
    }

    /// Parses `"v1:w1,v2:w2,..."` using `parse_value` to convert each
    /// value token. Weights must be positive; a spec with no `:` and a
    /// single token is treated as `constant`.
    pub fn parse(spec: &str, parse_value: impl Fn(&str) -> CoreResult<T>) -> CoreResult<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(CoreError::Config("empty distribution spec".into()));
        }

        if !spec.contains(':') {
            return Ok(Self::constant(parse_value(spec)?));
        }

        let mut entries = Vec::new();
        let mut total_weight = 0.0;

        for token in spec.split(',') {
            let token = token.trim();
            let (value_part, weight_part) = token.split_once(':').ok_or_else(|| {
                CoreError::Config(format!(
                    "malformed distribution entry {token:?}, expected value:weight"
                ))
            })?;

            let value = parse_value(value_part.trim())?;
            let weight: f64 = weight_part
                .trim()
                .parse()
                .map_err(|_| CoreError::Config(format!("invalid weight in {token:?}")))?;

            if !(weight.is_finite() && weight > 0.0) {
                return Err(CoreError::Config(format!(
                    "weight must be positive, got {weight} in {token:?}"
                )));
            }

            total_weight += weight;
            entries.push(WeightedEntry { value, weight });
        }

        if entries.is_empty() {
            return Err(CoreError::Config("distribution spec had no entries".into()));
        }

        Ok(Self { entries, total_weight })
    }

    /// Samples one value according to the weights, using `rng`.
    pub fn sample(&self, rng: &mut impl Rng) -> T {
        if self.entries.len() == 1 {
            return self.entries[0].value.clone();
        }

        let mut roll = rng.gen_range(0.0..self.total_weight);
        for entry in &self.entries {
            if roll < entry.weight {
                return entry.value.clone();
            }
            roll -= entry.weight;
        }

        // Floating-point rounding can leave `roll` just past the last
        // weight; fall back to the last entry rather than panicking.
        self.entries.last().expect("validated non-empty").value.clone()
    }

    pub fn entries(&self) -> &[WeightedEntry<T>] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse_u16(s: &str) -> CoreResult<u16> {
        s.parse().map_err(|_| CoreError::Config(format!("bad code {s:?}")))
    }

    #[test]
    fn bare_value_is_constant() {
        let d = Distribution::parse("200", parse_u16).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(d.sample(&mut rng), 200);
        }
    }

    #[test]
    fn rejects_malformed_entry() {
        assert!(Distribution::parse("200:3,not-a-pair", parse_u16).is_err());
    }

    #[test]
    fn rejects_nonpositive_weight() {
        assert!(Distribution::parse("200:0", parse_u16).is_err());
        assert!(Distribution::parse("200:-1", parse_u16).is_err());
    }

    #[test]
    fn weighted_distribution_converges_to_expected_ratio() {
        let d = Distribution::parse("200:3,500:1", parse_u16).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut count_200 = 0u32;
        let mut count_500 = 0u32;
        const N: u32 = 40_000;
        for _ in 0..N {
            match d.sample(&mut rng) {
                200 => count_200 += 1,
                500 => count_500 += 1,
                other => panic!("unexpected value {other}"),
            }
        }
        let ratio = count_200 as f64 / N as f64;
        // Expect ~75% 200s; chi-square-style tolerance of a few percent.
        assert!((ratio - 0.75).abs() < 0.03, "ratio was {ratio}");
    }
}
