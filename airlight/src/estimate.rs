//! Weighted aggregation of per-pair airlight estimates.

use crate::error::{Error, Result};
use crate::pair::PairEstimate;

/// `Σ(wᵢ·Aᵢ) / Σwᵢ` over the surviving pairs.
///
/// Fails with [`Error::NoEstimate`] on an empty set or when every weight is
/// zero; an empty survivor set is never turned into a zero airlight.
pub fn estimate_airlight<'a, I>(estimates: I) -> Result<[f32; 3]>
where
    I: IntoIterator<Item = &'a PairEstimate>,
{
    let mut weighted = [0.0f64; 3];
    let mut total_weight = 0.0f64;
    let mut count = 0usize;

    for estimate in estimates {
        let w = estimate.weight as f64;
        for (acc, &a) in weighted.iter_mut().zip(&estimate.airlight) {
            *acc += w * a as f64;
        }
        total_weight += w;
        count += 1;
    }

    if count == 0 {
        return Err(Error::NoEstimate {
            reason: "no pairs survived filtering",
        });
    }
    if total_weight <= 0.0 {
        return Err(Error::NoEstimate {
            reason: "all surviving pairs have zero weight",
        });
    }

    let airlight = weighted.map(|s| (s / total_weight) as f32);
    tracing::info!(
        pairs = count,
        total_weight,
        r = airlight[0],
        g = airlight[1],
        b = airlight[2],
        "Estimated airlight"
    );
    Ok(airlight)
}
