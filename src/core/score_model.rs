//! Scoring system plus per-context Karlin-Altschul statistics.
//!
//! A [`ScoreBlock`] is built once per search and then only read: residue
//! pair scores (or PSSM column scores) for the aligners, and one ungapped
//! plus one gapped Karlin block per query context for the statistics layer.
//! Contexts whose statistics cannot be computed carry `None` and are skipped
//! everywhere; nothing ever divides by a parameter from an invalid block.

use crate::core::encoding::AA_SIZE;
use crate::error::{EngineError, EngineResult};
use crate::stats::tables::{
    blastn_gapped_params, blastn_ungapped_params, blosum62_gapped_params,
    blosum62_ungapped_params, KarlinBlock,
};

/// Score assigned when either residue is a sentinel or otherwise outside
/// the alphabet. Large enough to stop any extension instantly, small enough
/// not to overflow running sums.
pub const SENTINEL_SCORE: i32 = -1024;

/// BLOSUM62 in matrix order ARNDCQEGHILKMFPSTWYVBJZX*.
/// Source: NCBI sm_blosum62.c, verbatim.
#[rustfmt::skip]
pub static BLOSUM62: [i8; AA_SIZE * AA_SIZE] = [
    //       A,  R,  N,  D,  C,  Q,  E,  G,  H,  I,  L,  K,  M,  F,  P,  S,  T,  W,  Y,  V,  B,  J,  Z,  X,  *
    /*A*/    4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0, -2, -1, -1, -1, -4,
    /*R*/   -1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3, -1, -2,  0, -1, -4,
    /*N*/   -2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3,  4, -3,  0, -1, -4,
    /*D*/   -2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3,  4, -3,  1, -1, -4,
    /*C*/    0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1, -3, -1, -3, -1, -4,
    /*Q*/   -1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2,  0, -2,  4, -1, -4,
    /*E*/   -1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2,  1, -3,  4, -1, -4,
    /*G*/    0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3, -1, -4, -2, -1, -4,
    /*H*/   -2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3,  0, -3,  0, -1, -4,
    /*I*/   -1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3, -3,  3, -3, -1, -4,
    /*L*/   -1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1, -4,  3, -3, -1, -4,
    /*K*/   -1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2,  0, -3,  1, -1, -4,
    /*M*/   -1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1, -3,  2, -1, -1, -4,
    /*F*/   -2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1, -3,  0, -3, -1, -4,
    /*P*/   -1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2, -2, -3, -1, -1, -4,
    /*S*/    1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2,  0, -2,  0, -1, -4,
    /*T*/    0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0, -1, -1, -1, -1, -4,
    /*W*/   -3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3, -4, -2, -2, -1, -4,
    /*Y*/   -2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1, -3, -1, -2, -1, -4,
    /*V*/    0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4, -3,  2, -2, -1, -4,
    /*B*/   -2, -1,  4,  4, -3,  0,  1, -1,  0, -3, -4,  0, -3, -3, -2,  0, -1, -4, -3, -3,  4, -3,  0, -1, -4,
    /*J*/   -1, -2, -3, -3, -1, -2, -3, -4, -3,  3,  3, -3,  2,  0, -3, -2, -1, -2, -1,  2, -3,  3, -3, -1, -4,
    /*Z*/   -1,  0,  0,  1, -3,  4,  4, -2,  0, -3, -3,  1, -1, -3, -1,  0, -1, -2, -2, -2,  0, -3,  4, -1, -4,
    /*X*/   -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -4,
    /***/   -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4,  1,
];

/// Position-specific scoring matrix: one row of 25 residue scores per
/// profile column.
#[derive(Debug, Clone)]
pub struct Pssm {
    pub rows: Vec<[i32; AA_SIZE]>,
}

impl Pssm {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ScoringSystem {
    /// Uniform match/mismatch nucleotide scoring.
    NucleotideMatch { reward: i32, penalty: i32 },
    /// BLOSUM62 residue pair scores.
    Blosum62,
    /// Profile scores, one column per profile position.
    Profile(Pssm),
}

#[derive(Debug, Clone)]
pub struct ScoreBlock {
    pub scoring: ScoringSystem,
    pub gap_open: i32,
    pub gap_extend: i32,
    /// Ungapped Karlin block per context; `None` marks an unusable context.
    pub kbp_std: Vec<Option<KarlinBlock>>,
    /// Gapped Karlin block per context.
    pub kbp_gap: Vec<Option<KarlinBlock>>,
    /// Matrix scale factor; 1.0 unless a scaled PSSM is in use.
    pub scale_factor: f64,
}

impl ScoreBlock {
    /// Score block for match/mismatch nucleotide scoring. Statistics come
    /// from the published reward/penalty tables; an unsupported scheme is a
    /// configuration error.
    pub fn nucleotide(
        reward: i32,
        penalty: i32,
        gap_open: i32,
        gap_extend: i32,
        num_contexts: usize,
    ) -> EngineResult<Self> {
        if reward <= 0 || penalty >= 0 {
            return Err(EngineError::Configuration(format!(
                "nucleotide scoring needs reward > 0 and penalty < 0, got {reward}/{penalty}"
            )));
        }
        let std = blastn_ungapped_params(reward, penalty).ok_or_else(|| {
            EngineError::Configuration(format!(
                "no statistics for reward/penalty {reward}/{penalty}"
            ))
        })?;
        // Greedy defaults (0, 0) resolve to the ungapped row.
        let gap = blastn_gapped_params(reward, penalty, gap_open, gap_extend).ok_or_else(|| {
            EngineError::Configuration(format!(
                "no statistics for gap costs {gap_open}/{gap_extend} with reward/penalty {reward}/{penalty}"
            ))
        })?;
        Ok(Self {
            scoring: ScoringSystem::NucleotideMatch { reward, penalty },
            gap_open,
            gap_extend,
            kbp_std: vec![Some(std); num_contexts],
            kbp_gap: vec![Some(gap); num_contexts],
            scale_factor: 1.0,
        })
    }

    /// Score block for BLOSUM62 protein scoring.
    pub fn blosum62(gap_open: i32, gap_extend: i32, num_contexts: usize) -> EngineResult<Self> {
        let std = blosum62_ungapped_params();
        let gap = blosum62_gapped_params(gap_open, gap_extend).ok_or_else(|| {
            EngineError::Configuration(format!(
                "no BLOSUM62 statistics for gap costs {gap_open}/{gap_extend}"
            ))
        })?;
        Ok(Self {
            scoring: ScoringSystem::Blosum62,
            gap_open,
            gap_extend,
            kbp_std: vec![Some(std); num_contexts],
            kbp_gap: vec![Some(gap); num_contexts],
            scale_factor: 1.0,
        })
    }

    /// Score block for a profile search. Profile statistics follow the
    /// BLOSUM62 convention of scaled RPS databases.
    pub fn profile(
        pssm: Pssm,
        gap_open: i32,
        gap_extend: i32,
        scale_factor: f64,
        num_contexts: usize,
    ) -> EngineResult<Self> {
        if pssm.is_empty() {
            return Err(EngineError::Configuration("empty profile".into()));
        }
        let mut block = Self::blosum62(gap_open, gap_extend, num_contexts)?;
        block.scoring = ScoringSystem::Profile(pssm);
        block.scale_factor = scale_factor;
        Ok(block)
    }

    /// Score of a residue pair. Sentinels and out-of-alphabet codes get
    /// [`SENTINEL_SCORE`].
    #[inline]
    pub fn pair_score(&self, a: u8, b: u8) -> i32 {
        match &self.scoring {
            ScoringSystem::NucleotideMatch { reward, penalty } => {
                // Ambiguity codes (anything above T) never count as a match.
                if a > 3 || b > 3 {
                    if a == crate::core::sequence::SENTINEL || b == crate::core::sequence::SENTINEL
                    {
                        return SENTINEL_SCORE;
                    }
                    return *penalty;
                }
                if a == b {
                    *reward
                } else {
                    *penalty
                }
            }
            ScoringSystem::Blosum62 | ScoringSystem::Profile(_) => {
                if (a as usize) < AA_SIZE && (b as usize) < AA_SIZE {
                    BLOSUM62[a as usize * AA_SIZE + b as usize] as i32
                } else {
                    SENTINEL_SCORE
                }
            }
        }
    }

    /// Score of a residue against a profile column.
    #[inline]
    pub fn profile_score(&self, column: usize, residue: u8) -> i32 {
        match &self.scoring {
            ScoringSystem::Profile(pssm) => {
                if (residue as usize) < AA_SIZE && column < pssm.len() {
                    pssm.rows[column][residue as usize]
                } else {
                    SENTINEL_SCORE
                }
            }
            _ => SENTINEL_SCORE,
        }
    }

    pub fn num_contexts(&self) -> usize {
        self.kbp_std.len()
    }

    /// Mark one context as statistically unusable.
    pub fn invalidate_context(&mut self, ctx: usize) {
        self.kbp_std[ctx] = None;
        self.kbp_gap[ctx] = None;
    }

    pub fn kbp(&self, ctx: usize, gapped: bool) -> Option<&KarlinBlock> {
        let v = if gapped { &self.kbp_gap } else { &self.kbp_std };
        v.get(ctx).and_then(|k| k.as_ref()).filter(|k| k.is_valid())
    }

    /// Smallest valid lambda over a context range. Shared raw thresholds are
    /// derived from this so that no context's cutoff is too strict.
    pub fn smallest_valid_lambda(
        &self,
        first: usize,
        last: usize,
        gapped: bool,
    ) -> EngineResult<f64> {
        let mut min: Option<f64> = None;
        for ctx in first..=last {
            if let Some(kbp) = self.kbp(ctx, gapped) {
                min = Some(match min {
                    Some(m) => m.min(kbp.lambda),
                    None => kbp.lambda,
                });
            }
        }
        min.ok_or(EngineError::StatisticsUnavailable { first_context: first, last_context: last })
    }

    /// First context with a valid block, with its block.
    pub fn first_valid_kbp(&self, gapped: bool) -> EngineResult<(usize, &KarlinBlock)> {
        let v = if gapped { &self.kbp_gap } else { &self.kbp_std };
        for (ctx, kbp) in v.iter().enumerate() {
            if let Some(k) = kbp {
                if k.is_valid() {
                    return Ok((ctx, k));
                }
            }
        }
        Err(EngineError::StatisticsUnavailable {
            first_context: 0,
            last_context: v.len().saturating_sub(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::{encode_protein, ASCII_TO_AA};

    #[test]
    fn blosum62_spot_checks() {
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let w = ASCII_TO_AA[b'W' as usize];
        let a = ASCII_TO_AA[b'A' as usize];
        let s = ASCII_TO_AA[b'S' as usize];
        assert_eq!(sb.pair_score(w, w), 11);
        assert_eq!(sb.pair_score(a, s), 1);
        assert_eq!(sb.pair_score(s, a), 1);
        // Sentinel never scores.
        assert_eq!(sb.pair_score(crate::core::sequence::SENTINEL, a), SENTINEL_SCORE);
    }

    #[test]
    fn nucleotide_ambiguity_never_matches() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        assert_eq!(sb.pair_score(0, 0), 1);
        assert_eq!(sb.pair_score(0, 3), -3);
        // N vs N is a mismatch, not a match.
        assert_eq!(sb.pair_score(14, 14), -3);
    }

    #[test]
    fn smallest_lambda_skips_invalid_contexts() {
        let mut sb = ScoreBlock::nucleotide(1, -3, 0, 0, 3).unwrap();
        // Give one context artificially smaller lambda, then invalidate it.
        sb.kbp_std[1] = Some(crate::stats::tables::KarlinBlock::new(0.5, 0.3, 0.5, 1.0, 0.0));
        assert!((sb.smallest_valid_lambda(0, 2, false).unwrap() - 0.5).abs() < 1e-12);
        sb.invalidate_context(1);
        assert!((sb.smallest_valid_lambda(0, 2, false).unwrap() - 1.374).abs() < 1e-12);
    }

    #[test]
    fn all_invalid_is_statistics_unavailable() {
        let mut sb = ScoreBlock::nucleotide(1, -3, 0, 0, 2).unwrap();
        sb.invalidate_context(0);
        sb.invalidate_context(1);
        assert!(matches!(
            sb.smallest_valid_lambda(0, 1, false),
            Err(EngineError::StatisticsUnavailable { .. })
        ));
        assert!(sb.first_valid_kbp(false).is_err());
    }

    #[test]
    fn profile_scores_by_column() {
        let consensus = encode_protein(b"MKV");
        let mut rows = Vec::new();
        for &r in &consensus {
            let mut row = [-4i32; AA_SIZE];
            row[r as usize] = 9;
            rows.push(row);
        }
        let sb = ScoreBlock::profile(Pssm { rows }, 11, 1, 1.0, 1).unwrap();
        assert_eq!(sb.profile_score(0, consensus[0]), 9);
        assert_eq!(sb.profile_score(1, consensus[0]), -4);
        assert_eq!(sb.profile_score(99, consensus[0]), SENTINEL_SCORE);
    }
}
