//! Empirical highest posterior density intervals.

use super::error::CoverageError;
use crate::models::CredibleInterval;

/// Default probability mass of a credible interval.
pub const DEFAULT_MASS: f64 = 0.95;

/// Checks that `mass` lies strictly inside (0, 1).
pub fn validate_mass(mass: f64) -> Result<(), CoverageError> {
    if mass > 0.0 && mass < 1.0 {
        Ok(())
    } else {
        Err(CoverageError::invalid(
            "mass level",
            format!("{} is not strictly between 0 and 1", mass),
        ))
    }
}

/// Estimate the HPD interval of `samples` holding `mass` of the draws.
///
/// The samples are sorted and every window spanning `floor(mass * n)` ranks
/// is scanned; the narrowest one wins, ties going to the lowest window. The
/// result is an empirical approximation from a finite sample, not the exact
/// HPD region of the underlying distribution, and for multimodal posteriors
/// it spans the gaps between modes.
///
/// Input order does not matter. Empty input, a mass outside (0, 1) and
/// NaN or infinite samples are rejected with `InvalidInput`.
pub fn estimate(samples: &[f64], mass: f64) -> Result<CredibleInterval, CoverageError> {
    if samples.is_empty() {
        return Err(CoverageError::invalid("hpd", "sample sequence is empty"));
    }
    validate_mass(mass)?;
    if let Some(pos) = samples.iter().position(|x| !x.is_finite()) {
        return Err(CoverageError::invalid(
            "hpd",
            format!("sample {} is not finite ({})", pos, samples[pos]),
        ));
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len();

    let covered_count = (mass * n as f64).floor() as usize;
    if covered_count >= n {
        return Ok(CredibleInterval {
            lower: sorted[0],
            upper: sorted[n - 1],
        });
    }

    // Strict `<` keeps the first minimum.
    let mut best = 0;
    let mut best_width = f64::INFINITY;
    for (j, (lo, hi)) in sorted.iter().zip(&sorted[covered_count..]).enumerate() {
        let width = hi - lo;
        if width < best_width {
            best = j;
            best_width = width;
        }
    }

    Ok(CredibleInterval {
        lower: sorted[best],
        upper: sorted[best + covered_count],
    })
}
