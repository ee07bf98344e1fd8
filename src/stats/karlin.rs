//! Karlin-Altschul score conversions and cutoff derivation.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_stat.c and
//! blast_parameters.c. Every conversion that crosses the bit/raw boundary
//! goes through [`BitScore`], so a raw `i32` can never be passed where bits
//! are expected.

use super::tables::KarlinBlock;

pub const NCBIMATH_LN2: f64 = std::f64::consts::LN_2;

/// Smallest E-value accepted by cutoff derivation; smaller requests are
/// clamped so the logarithm stays finite.
const CUTOFF_E_MIN: f64 = 1.0e-300;

/// A score expressed in bits. Option defaults (X-drops, gap trigger) are
/// stated in bits and converted to raw scores per context.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BitScore(pub f64);

/// Convert a raw score to bits: S' = (lambda * S - ln K) / ln 2.
pub fn bit_score_from_raw(raw: i32, kbp: &KarlinBlock) -> BitScore {
    BitScore((kbp.lambda * raw as f64 - kbp.log_k) / NCBIMATH_LN2)
}

/// E-value of a raw score over the given effective search space:
/// E = searchsp * exp(-lambda * S + ln K).
pub fn evalue_from_raw(raw: i32, kbp: &KarlinBlock, searchsp: f64) -> f64 {
    searchsp * (-kbp.lambda * raw as f64 + kbp.log_k).exp()
}

/// Raw score needed to reach a bit threshold, rounded up.
///
/// Used for X-dropoffs and score cutoffs; the scale factor multiplies the
/// result for scaled-matrix (composition adjusted) searches.
/// Reference: blast_parameters.c (s_BlastFindValidKarlinBlk consumers).
pub fn raw_from_bits(bits: BitScore, lambda: f64, scale_factor: f64) -> i32 {
    (scale_factor * bits.0 * NCBIMATH_LN2 / lambda).ceil() as i32
}

/// Raw score for the gap trigger threshold.
///
/// Unlike every other bit conversion this one includes ln K and truncates
/// toward zero, matching BlastInitialWordParametersNew.
pub fn gap_trigger_raw(bits: BitScore, kbp: &KarlinBlock, scale_factor: f64) -> i32 {
    (scale_factor * (bits.0 * NCBIMATH_LN2 + kbp.log_k) / kbp.lambda) as i32
}

/// Closed-form E-to-S: smallest raw score whose E-value over `searchsp` is
/// at most `evalue`. Reference: BLAST_Cutoffs / BlastKarlinEtoS_simple.
pub fn cutoff_score_for_evalue(evalue: f64, kbp: &KarlinBlock, searchsp: f64) -> i32 {
    let e = evalue.max(CUTOFF_E_MIN);
    let s = ((kbp.k * searchsp / e).ln() / kbp.lambda).ceil() as i32;
    s.max(1)
}

/// E-to-S with the gap decay divisor applied, compensating for choosing the
/// best among multiply linked alignments.
pub fn cutoff_score_for_evalue_with_decay(
    evalue: f64,
    kbp: &KarlinBlock,
    searchsp: f64,
    gap_decay_rate: f64,
) -> i32 {
    let mut e = evalue;
    if gap_decay_rate > 0.0 && gap_decay_rate < 1.0 {
        e *= super::sum_statistics::gap_decay_divisor(gap_decay_rate, 1);
    }
    cutoff_score_for_evalue(e, kbp, searchsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tables::{blastn_ungapped_params, blosum62_gapped_params, blosum62_ungapped_params};

    #[test]
    fn blosum62_seven_bit_xdrop_is_sixteen() {
        // 7 bits with ungapped BLOSUM62 lambda 0.3176: ceil(7*ln2/0.3176).
        let kbp = blosum62_ungapped_params();
        assert_eq!(raw_from_bits(BitScore(7.0), kbp.lambda, 1.0), 16);
    }

    #[test]
    fn blosum62_gap_trigger_is_forty_one() {
        // 22 bits: trunc((22*ln2 + ln 0.134) / 0.3176) = 41.
        let kbp = blosum62_ungapped_params();
        assert_eq!(gap_trigger_raw(BitScore(22.0), &kbp, 1.0), 41);
    }

    #[test]
    fn scale_factor_multiplies_raw_thresholds() {
        let kbp = blosum62_ungapped_params();
        let unscaled = raw_from_bits(BitScore(7.0), kbp.lambda, 1.0);
        let scaled = raw_from_bits(BitScore(7.0), kbp.lambda, 32.0);
        assert!(scaled >= unscaled * 32 - 32 && scaled <= unscaled * 32);
    }

    #[test]
    fn bit_score_round_trip() {
        let kbp = blosum62_gapped_params(11, 1).unwrap();
        let bits = bit_score_from_raw(100, &kbp);
        let expected = (0.267 * 100.0 - 0.041f64.ln()) / NCBIMATH_LN2;
        assert!((bits.0 - expected).abs() < 1e-9);
    }

    #[test]
    fn evalue_decreases_with_score() {
        let kbp = blastn_ungapped_params(1, -3).unwrap();
        let searchsp = 1.0e6;
        let e20 = evalue_from_raw(20, &kbp, searchsp);
        let e32 = evalue_from_raw(32, &kbp, searchsp);
        assert!(e32 < e20);
    }

    #[test]
    fn cutoff_inverts_evalue() {
        let kbp = blosum62_gapped_params(11, 1).unwrap();
        let searchsp = 2.0e7;
        let s = cutoff_score_for_evalue(10.0, &kbp, searchsp);
        // Score s reaches E <= 10, score s-1 does not.
        assert!(evalue_from_raw(s, &kbp, searchsp) <= 10.0);
        assert!(evalue_from_raw(s - 1, &kbp, searchsp) > 10.0);
    }

    #[test]
    fn decay_divisor_tightens_cutoff() {
        let kbp = blosum62_gapped_params(11, 1).unwrap();
        let searchsp = 2.0e7;
        let plain = cutoff_score_for_evalue(10.0, &kbp, searchsp);
        let decayed = cutoff_score_for_evalue_with_decay(10.0, &kbp, searchsp, 0.5);
        assert!(decayed >= plain);
    }

    #[test]
    fn tiny_evalue_is_clamped() {
        let kbp = blosum62_ungapped_params();
        let s = cutoff_score_for_evalue(0.0, &kbp, 1.0e6);
        assert!(s > 0 && s < 10_000);
    }
}
