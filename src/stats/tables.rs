//! Precomputed Karlin-Altschul parameter sets.
//!
//! Values are the published constants from NCBI's blast_stat.c for the
//! substitution schemes the engine supports: blastn reward/penalty pairs and
//! BLOSUM62. Each entry carries (gap_open, gap_extend, lambda, K, H, alpha,
//! beta); the first entry of every table with gap costs (0, 0) or
//! (i32::MAX, i32::MAX) holds the ungapped values.

/// One set of Karlin-Altschul statistical parameters.
///
/// `log_k` is stored alongside `k` because cutoff derivation and sum
/// statistics consume ln(K) far more often than K itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KarlinBlock {
    pub lambda: f64,
    pub k: f64,
    pub log_k: f64,
    pub h: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl KarlinBlock {
    pub fn new(lambda: f64, k: f64, h: f64, alpha: f64, beta: f64) -> Self {
        let log_k = if k > 0.0 { k.ln() } else { 0.0 };
        Self { lambda, k, log_k, h, alpha, beta }
    }

    /// A block may only be used for statistics when all three primary
    /// parameters are strictly positive. Invalid blocks are skipped, never
    /// divided by.
    pub fn is_valid(&self) -> bool {
        self.lambda > 0.0 && self.k > 0.0 && self.h > 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ParamEntry {
    gap_open: i32,
    gap_extend: i32,
    lambda: f64,
    k: f64,
    h: f64,
    alpha: f64,
    beta: f64,
}

impl ParamEntry {
    const fn new(
        gap_open: i32,
        gap_extend: i32,
        lambda: f64,
        k: f64,
        h: f64,
        alpha: f64,
        beta: f64,
    ) -> Self {
        Self { gap_open, gap_extend, lambda, k, h, alpha, beta }
    }

    fn block(&self) -> KarlinBlock {
        KarlinBlock::new(self.lambda, self.k, self.h, self.alpha, self.beta)
    }
}

const BLASTN_1_5: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 1.39, 0.747, 1.38, 1.00, 0.0),
    ParamEntry::new(3, 3, 1.39, 0.747, 1.38, 1.00, 0.0),
];

const BLASTN_1_4: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 1.383, 0.738, 1.36, 1.02, 0.0),
    ParamEntry::new(1, 2, 1.36, 0.67, 1.2, 1.1, 0.0),
    ParamEntry::new(0, 2, 1.26, 0.43, 0.90, 1.4, -1.0),
    ParamEntry::new(2, 1, 1.35, 0.61, 1.1, 1.2, -1.0),
    ParamEntry::new(1, 1, 1.22, 0.35, 0.72, 1.7, -3.0),
];

const BLASTN_2_7: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 0.69, 0.73, 1.34, 0.515, 0.0),
    ParamEntry::new(2, 4, 0.68, 0.67, 1.2, 0.55, 0.0),
    ParamEntry::new(0, 4, 0.63, 0.43, 0.90, 0.7, -1.0),
    ParamEntry::new(4, 2, 0.675, 0.62, 1.1, 0.6, -1.0),
    ParamEntry::new(2, 2, 0.61, 0.35, 0.72, 1.7, -3.0),
];

const BLASTN_1_3: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 1.374, 0.711, 1.31, 1.05, 0.0),
    ParamEntry::new(2, 2, 1.37, 0.70, 1.2, 1.1, 0.0),
    ParamEntry::new(1, 2, 1.35, 0.64, 1.1, 1.2, -1.0),
    ParamEntry::new(0, 2, 1.25, 0.42, 0.83, 1.5, -2.0),
    ParamEntry::new(2, 1, 1.34, 0.60, 1.1, 1.2, -1.0),
    ParamEntry::new(1, 1, 1.21, 0.34, 0.71, 1.7, -2.0),
];

const BLASTN_2_5: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 0.675, 0.65, 1.1, 0.6, -1.0),
    ParamEntry::new(2, 4, 0.67, 0.59, 1.1, 0.6, -1.0),
    ParamEntry::new(0, 4, 0.62, 0.39, 0.78, 0.8, -2.0),
    ParamEntry::new(4, 2, 0.67, 0.61, 1.0, 0.65, -2.0),
    ParamEntry::new(2, 2, 0.56, 0.32, 0.59, 0.95, -4.0),
];

const BLASTN_1_2: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 1.28, 0.46, 0.85, 1.5, -2.0),
    ParamEntry::new(2, 2, 1.33, 0.62, 1.1, 1.2, 0.0),
    ParamEntry::new(1, 2, 1.30, 0.52, 0.93, 1.4, -2.0),
    ParamEntry::new(0, 2, 1.19, 0.34, 0.66, 1.8, -3.0),
    ParamEntry::new(3, 1, 1.32, 0.57, 1.0, 1.3, -1.0),
    ParamEntry::new(2, 1, 1.29, 0.49, 0.92, 1.4, -1.0),
    ParamEntry::new(1, 1, 1.14, 0.26, 0.52, 2.2, -5.0),
];

const BLASTN_2_3: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 0.55, 0.21, 0.46, 1.2, -5.0),
    ParamEntry::new(4, 4, 0.63, 0.42, 0.84, 0.75, -2.0),
    ParamEntry::new(2, 4, 0.615, 0.37, 0.72, 0.85, -3.0),
    ParamEntry::new(0, 4, 0.55, 0.21, 0.46, 1.2, -5.0),
    ParamEntry::new(3, 3, 0.615, 0.37, 0.68, 0.9, -3.0),
    ParamEntry::new(6, 2, 0.63, 0.42, 0.84, 0.75, -2.0),
    ParamEntry::new(5, 2, 0.625, 0.41, 0.78, 0.8, -2.0),
    ParamEntry::new(4, 2, 0.61, 0.35, 0.68, 0.9, -3.0),
    ParamEntry::new(2, 2, 0.515, 0.14, 0.33, 1.55, -9.0),
];

const BLASTN_3_4: &[ParamEntry] = &[
    ParamEntry::new(6, 3, 0.389, 0.25, 0.56, 0.7, -5.0),
    ParamEntry::new(5, 3, 0.375, 0.21, 0.47, 0.8, -6.0),
    ParamEntry::new(4, 3, 0.351, 0.14, 0.35, 1.0, -9.0),
    ParamEntry::new(6, 2, 0.362, 0.16, 0.45, 0.8, -4.0),
    ParamEntry::new(5, 2, 0.330, 0.092, 0.28, 1.2, -13.0),
    ParamEntry::new(4, 2, 0.281, 0.046, 0.16, 1.8, -23.0),
];

const BLASTN_4_5: &[ParamEntry] = &[
    ParamEntry::new(0, 0, 0.22, 0.061, 0.22, 1.0, -15.0),
    ParamEntry::new(6, 5, 0.28, 0.21, 0.47, 0.6, -7.0),
    ParamEntry::new(5, 5, 0.27, 0.17, 0.39, 0.7, -9.0),
    ParamEntry::new(4, 5, 0.25, 0.10, 0.31, 0.8, -10.0),
    ParamEntry::new(3, 5, 0.23, 0.065, 0.25, 0.9, -11.0),
];

const BLASTN_1_1: &[ParamEntry] = &[
    ParamEntry::new(3, 2, 1.09, 0.31, 0.55, 2.0, -2.0),
    ParamEntry::new(2, 2, 1.07, 0.27, 0.49, 2.2, -3.0),
    ParamEntry::new(1, 2, 1.02, 0.21, 0.36, 2.8, -6.0),
    ParamEntry::new(0, 2, 0.80, 0.064, 0.17, 4.8, -16.0),
    ParamEntry::new(4, 1, 1.08, 0.28, 0.54, 2.0, -2.0),
    ParamEntry::new(3, 1, 1.06, 0.25, 0.46, 2.3, -4.0),
    ParamEntry::new(2, 1, 0.99, 0.17, 0.30, 3.3, -10.0),
];

const BLASTN_3_2: &[ParamEntry] = &[ParamEntry::new(5, 5, 0.208, 0.030, 0.072, 2.9, -47.0)];

const BLASTN_5_4: &[ParamEntry] = &[
    ParamEntry::new(10, 6, 0.163, 0.068, 0.16, 1.0, -19.0),
    ParamEntry::new(8, 6, 0.146, 0.039, 0.11, 1.3, -29.0),
];

const BLOSUM62: &[ParamEntry] = &[
    ParamEntry::new(i32::MAX, i32::MAX, 0.3176, 0.134, 0.4012, 0.7916, -3.2),
    ParamEntry::new(11, 2, 0.297, 0.082, 0.27, 1.1, -10.0),
    ParamEntry::new(10, 2, 0.291, 0.075, 0.23, 1.3, -15.0),
    ParamEntry::new(9, 2, 0.279, 0.058, 0.19, 1.5, -19.0),
    ParamEntry::new(8, 2, 0.264, 0.045, 0.15, 1.8, -26.0),
    ParamEntry::new(7, 2, 0.239, 0.027, 0.10, 2.5, -46.0),
    ParamEntry::new(6, 2, 0.201, 0.012, 0.061, 3.3, -58.0),
    ParamEntry::new(13, 1, 0.292, 0.071, 0.23, 1.2, -11.0),
    ParamEntry::new(12, 1, 0.283, 0.059, 0.19, 1.5, -19.0),
    ParamEntry::new(11, 1, 0.267, 0.041, 0.14, 1.9, -30.0),
    ParamEntry::new(10, 1, 0.243, 0.024, 0.10, 2.5, -44.0),
    ParamEntry::new(9, 1, 0.206, 0.010, 0.052, 4.0, -87.0),
];

fn blastn_table(reward: i32, penalty: i32) -> Option<&'static [ParamEntry]> {
    match (reward, penalty.abs()) {
        (1, 5) => Some(BLASTN_1_5),
        (1, 4) => Some(BLASTN_1_4),
        (2, 7) => Some(BLASTN_2_7),
        (1, 3) => Some(BLASTN_1_3),
        (2, 5) => Some(BLASTN_2_5),
        (1, 2) => Some(BLASTN_1_2),
        (2, 3) => Some(BLASTN_2_3),
        (3, 4) => Some(BLASTN_3_4),
        (4, 5) => Some(BLASTN_4_5),
        (1, 1) => Some(BLASTN_1_1),
        (3, 2) => Some(BLASTN_3_2),
        (5, 4) => Some(BLASTN_5_4),
        _ => None,
    }
}

fn find_entry(table: &[ParamEntry], gap_open: i32, gap_extend: i32) -> Option<KarlinBlock> {
    table
        .iter()
        .find(|e| e.gap_open == gap_open && e.gap_extend == gap_extend)
        .map(|e| e.block())
}

/// Ungapped parameters for a blastn reward/penalty pair. `None` when the
/// scheme has no published values (the caller reports it as a configuration
/// error rather than guessing).
pub fn blastn_ungapped_params(reward: i32, penalty: i32) -> Option<KarlinBlock> {
    let table = blastn_table(reward, penalty)?;
    // Schemes like 3/-4 and 5/-4 only publish gapped rows.
    find_entry(table, 0, 0)
}

/// Gapped parameters for a blastn reward/penalty pair and gap costs.
pub fn blastn_gapped_params(
    reward: i32,
    penalty: i32,
    gap_open: i32,
    gap_extend: i32,
) -> Option<KarlinBlock> {
    let table = blastn_table(reward, penalty)?;
    find_entry(table, gap_open.abs(), gap_extend.abs())
}

/// Ungapped BLOSUM62 parameters.
pub fn blosum62_ungapped_params() -> KarlinBlock {
    BLOSUM62[0].block()
}

/// Gapped BLOSUM62 parameters for the given gap costs.
pub fn blosum62_gapped_params(gap_open: i32, gap_extend: i32) -> Option<KarlinBlock> {
    find_entry(BLOSUM62, gap_open.abs(), gap_extend.abs())
}

/// Reward/penalty pairs whose scores share an even common divisor only
/// produce even raw scores; bit-score round trips must stay on that lattice.
pub fn requires_even_scores(reward: i32, penalty: i32) -> bool {
    matches!((reward, penalty.abs()), (2, 7) | (2, 5) | (2, 3) | (4, 5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blastn_1_3_ungapped() {
        let kbp = blastn_ungapped_params(1, -3).unwrap();
        assert!((kbp.lambda - 1.374).abs() < 1e-12);
        assert!((kbp.k - 0.711).abs() < 1e-12);
        assert!((kbp.h - 1.31).abs() < 1e-12);
        assert!(kbp.is_valid());
    }

    #[test]
    fn blosum62_default_gap_costs() {
        let kbp = blosum62_gapped_params(11, 1).unwrap();
        assert!((kbp.lambda - 0.267).abs() < 1e-12);
        assert!((kbp.k - 0.041).abs() < 1e-12);
        assert!((kbp.log_k - 0.041f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn unsupported_scheme_is_none() {
        assert!(blastn_ungapped_params(7, -11).is_none());
        assert!(blastn_gapped_params(1, -3, 99, 99).is_none());
    }

    #[test]
    fn validity_gate_rejects_nonpositive() {
        let kbp = KarlinBlock::new(-1.0, 0.041, 0.14, 1.9, -30.0);
        assert!(!kbp.is_valid());
        let kbp = KarlinBlock::new(0.267, 0.0, 0.14, 1.9, -30.0);
        assert!(!kbp.is_valid());
    }
}
