//! Length adjustment for effective search space computation.
//!
//! Alignments cannot extend past sequence ends, so the statistically
//! effective lengths are shorter than the physical ones. The adjustment is
//! the fixed point of
//!
//! ```text
//! ell = alpha/lambda * (ln K + ln((m - ell) * (n - N*ell))) + beta
//! ```
//!
//! found by bounded iteration.
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_stat.c:5041-5126
//! (BLAST_ComputeLengthAdjustment), including its exact `ell_min == ell_max`
//! comparison and truncating casts.

use super::tables::KarlinBlock;

const MAX_ITERATIONS: i32 = 20;

/// Effective lengths for one query context against the whole database.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveLengths {
    pub length_adjustment: i64,
    pub eff_query_length: i64,
    pub eff_db_length: i64,
    pub eff_searchsp: i64,
    pub converged: bool,
}

/// Compute the length adjustment for a query of length `m` against a
/// database of total length `n` in `num_seqs` sequences.
pub fn length_adjustment(m: i64, n: i64, num_seqs: i64, kbp: &KarlinBlock) -> (i64, bool) {
    let mf = m as f64;
    let nf = n as f64;
    let nseq = num_seqs.max(1) as f64;

    if mf <= 0.0 || nf <= 0.0 || !kbp.is_valid() {
        return (0, false);
    }

    let alpha_d_lambda = kbp.alpha / kbp.lambda;
    let log_k = kbp.log_k;

    // Largest nonnegative ell with K*(m-ell)*(n-N*ell) > max(m,n), via the
    // numerically stable quadratic root 2c / (-b + sqrt(b^2 - 4ac)).
    let a = nseq;
    let neg_b = mf * nseq + nf;
    let c = nf * mf - mf.max(nf) / kbp.k;
    if c < 0.0 {
        return (0, true);
    }
    let disc = neg_b * neg_b - 4.0 * a * c;
    if disc < 0.0 {
        return (0, false);
    }

    let mut ell_min = 0.0_f64;
    let mut ell_max = 2.0 * c / (neg_b + disc.sqrt());
    let mut ell_next = 0.0_f64;
    let mut converged = false;

    for i in 1..=MAX_ITERATIONS {
        let ell = ell_next;
        let ss = (mf - ell) * (nf - nseq * ell);
        let ell_bar = alpha_d_lambda * (log_k + ss.ln()) + kbp.beta;

        if ell_bar >= ell {
            ell_min = ell;
            if ell_bar - ell_min <= 1.0 {
                converged = true;
                break;
            }
            if ell_min == ell_max {
                break;
            }
        } else {
            ell_max = ell;
        }

        ell_next = if ell_min <= ell_bar && ell_bar <= ell_max {
            ell_bar
        } else if i == 1 {
            ell_max
        } else {
            (ell_min + ell_max) / 2.0
        };
    }

    let mut adjustment = ell_min as i64;
    if converged {
        // floor(ell_min) usually equals floor of the true fixed point, but
        // check whether ceil(ell_min) is still below it.
        let ell_ceil = ell_min.ceil();
        if ell_ceil <= ell_max {
            let ss = (mf - ell_ceil) * (nf - nseq * ell_ceil);
            if alpha_d_lambda * (log_k + ss.ln()) + kbp.beta >= ell_ceil {
                adjustment = ell_ceil as i64;
            }
        }
    }

    (adjustment, converged)
}

/// Effective lengths and search space after adjustment. Lengths are clamped
/// to at least 1 so downstream logarithms stay finite.
pub fn effective_lengths(m: i64, n: i64, num_seqs: i64, kbp: &KarlinBlock) -> EffectiveLengths {
    let (ell, converged) = length_adjustment(m, n, num_seqs, kbp);
    let eff_q = (m - ell).max(1);
    let eff_db = (n - num_seqs.max(1) * ell).max(1);
    EffectiveLengths {
        length_adjustment: ell,
        eff_query_length: eff_q,
        eff_db_length: eff_db,
        eff_searchsp: eff_q.saturating_mul(eff_db),
        converged,
    }
}
