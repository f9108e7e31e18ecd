//! Parses the `-p` flag: a comma-separated list of percentile specifiers.

use crate::error::{CoreError, CoreResult};

/// Parses `"50,75,90,99,99.9"` into a sorted, de-duplicated list of
/// percentiles in `(0, 100]`. Rejects anything outside that range with a
/// `ConfigError` (surfaced here as `CoreError::Config`).
pub fn parse_percentiles(spec: &str) -> CoreResult<Vec<f64>> {
    let mut values = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let p: f64 = part
            .parse()
            .map_err(|_| CoreError::Config(format!("invalid percentile {part:?}")))?;

        if !(p > 0.0 && p <= 100.0) {
            return Err(CoreError::Config(format!(
                "percentile {p} out of range (0, 100]"
            )));
        }
        values.push(p);
    }

    if values.is_empty() {
        return Err(CoreError::Config("percentile list must not be empty".into()));
    }

    values.sort_by(|a, b| a.partial_cmp(b).expect("percentiles are never NaN"));
    values.dedup();

    Ok(values)
}

pub const DEFAULT_PERCENTILES: &str = "50,75,90,99,99.9";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_list() {
        let ps = parse_percentiles(DEFAULT_PERCENTILES).unwrap();
        assert_eq!(ps, vec![50.0, 75.0, 90.0, 99.0, 99.9]);
    }

    #[test]
    fn sorts_and_dedups() {
        let ps = parse_percentiles("99,50,50,75").unwrap();
        assert_eq!(ps, vec![50.0, 75.0, 99.0]);
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(parse_percentiles("0").is_err());
        assert!(parse_percentiles("-1").is_err());
    }

    #[test]
    fn rejects_above_100() {
        assert!(parse_percentiles("100.1").is_err());
    }

    #[test]
    fn accepts_exactly_100() {
        let ps = parse_percentiles("100").unwrap();
        assert_eq!(ps, vec![100.0]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_percentiles("fifty").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_percentiles("").is_err());
        assert!(parse_percentiles(",,,").is_err());
    }

    #[test]
    fn is_total_on_well_formed_input_and_idempotent_sorted() {
        // ParsePercentiles should be a total function on well-formed input —
        // calling it twice on its own (sorted) output is a fixed point.
        let once = parse_percentiles("90,50,99.9,75,99").unwrap();
        let rendered = once
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let twice = parse_percentiles(&rendered).unwrap();
        assert_eq!(once, twice);
    }
}
