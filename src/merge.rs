//! Fragment merging: rejoin pieces of one order that a dead column or a gap
//! in the illumination split into separate clusters.
//!
//! Fitted clusters are swept left to right. Each one is attached to the
//! chain it continues best, provided the two do not overlap in columns and
//! both polynomials, extrapolated across the gap, agree to within the
//! tolerance at either end of it. A chain is refitted on the combined
//! centroid profile every time it grows.

use tracing::debug;

use crate::fit::{fit_profile, CentroidProfile, FittedCluster};

/// Row disagreement between `chain` and a `fragment` that starts to its right.
///
/// Both polynomials are evaluated at the two columns bounding the gap; the
/// larger difference is returned. `None` when the column spans overlap.
pub fn gap_mismatch(chain: &FittedCluster, fragment: &FittedCluster) -> Option<f64> {
    if chain.max_col >= fragment.min_col {
        return None;
    }
    let left = chain.max_col as f64;
    let right = fragment.min_col as f64;
    let at_left = (fragment.row_at(left) - chain.row_at(left)).abs();
    let at_right = (chain.row_at(right) - fragment.row_at(right)).abs();
    Some(at_left.max(at_right))
}

/// Merge fragments whose gap mismatch is within `tolerance` rows.
///
/// `degree` and `scale` are the fit parameters used for the refit. Returns
/// the merged set ordered by first column and the number of fragments that
/// were folded into another one. A tolerance of 0 leaves the input as is.
pub fn merge_fragments(
    mut fragments: Vec<FittedCluster>,
    tolerance: f64,
    degree: usize,
    scale: f64,
) -> (Vec<FittedCluster>, usize) {
    if tolerance <= 0.0 || fragments.len() < 2 {
        return (fragments, 0);
    }
    fragments.sort_by_key(|f| (f.min_col, f.id));

    let mut chains: Vec<FittedCluster> = Vec::with_capacity(fragments.len());
    let mut num_merged = 0usize;
    for fragment in fragments {
        let best = chains
            .iter()
            .enumerate()
            .filter_map(|(i, chain)| gap_mismatch(chain, &fragment).map(|m| (i, m)))
            .filter(|&(_, m)| m <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let Some((index, mismatch)) = best else {
            chains.push(fragment);
            continue;
        };
        match join(&chains[index], &fragment, degree, scale) {
            Some(joined) => {
                debug!(
                    "Merged cluster {} into cluster {} across columns {}..{} (mismatch {:.3} rows)",
                    fragment.id, joined.id, chains[index].max_col, fragment.min_col, mismatch
                );
                chains[index] = joined;
                num_merged += 1;
            }
            None => chains.push(fragment),
        }
    }
    (chains, num_merged)
}

/// Concatenate two non-overlapping fragments and refit the combined profile.
fn join(
    left: &FittedCluster,
    right: &FittedCluster,
    degree: usize,
    scale: f64,
) -> Option<FittedCluster> {
    let mut profile = CentroidProfile {
        columns: Vec::with_capacity(left.profile.len() + right.profile.len()),
        rows: Vec::with_capacity(left.profile.len() + right.profile.len()),
    };
    for part in [&left.profile, &right.profile] {
        profile.columns.extend_from_slice(&part.columns);
        profile.rows.extend_from_slice(&part.rows);
    }
    let coefficients = fit_profile(&profile, degree, scale)?;
    Some(FittedCluster {
        id: left.id.min(right.id),
        min_col: left.min_col,
        max_col: right.max_col,
        profile,
        coefficients,
    })
}
