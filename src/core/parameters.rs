//! Search options and derived parameters.
//!
//! Options are validated once and then immutable; parameters are derived
//! from options plus the score block. Derivation is pure, so running it
//! twice always yields the same values. Per-subject recomputation writes
//! into a caller-owned [`SubjectCutoffs`] scratch instead of mutating the
//! shared parameter structs.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_parameters.c

use crate::core::score_model::ScoreBlock;
use crate::core::sequence::QueryInfo;
use crate::error::{EngineError, EngineResult};
use crate::stats::karlin::{
    cutoff_score_for_evalue, cutoff_score_for_evalue_with_decay, gap_trigger_raw, raw_from_bits,
    BitScore,
};
use crate::stats::sum_statistics::defaults as link_defaults;

/// Subjects longer than this are scanned in overlapping chunks.
pub const MAX_DBSEQ_LEN: usize = 5_000_000;
/// Overlap between adjacent subject chunks, so alignments spanning a
/// boundary are seen whole by at least one chunk.
pub const DBSEQ_CHUNK_OVERLAP: usize = 100;

/// Program-independent option defaults.
/// NCBI reference: ncbi-blast/c++/include/algo/blast/core/blast_options.h
pub mod defaults {
    use crate::stats::karlin::BitScore;

    pub const EXPECT_VALUE: f64 = 10.0;
    pub const WORD_SIZE_NUCL: usize = 11;
    pub const WORD_SIZE_PROT: usize = 3;
    pub const WORD_SIZE_MEGABLAST: usize = 28;
    pub const WORD_THRESHOLD_BLASTP: i32 = 11;
    pub const WINDOW_SIZE_PROT: i32 = 40;

    pub const UNGAPPED_X_DROPOFF_PROT: BitScore = BitScore(7.0);
    pub const UNGAPPED_X_DROPOFF_NUCL: BitScore = BitScore(20.0);
    pub const GAP_X_DROPOFF_PROT: BitScore = BitScore(15.0);
    pub const GAP_X_DROPOFF_NUCL: BitScore = BitScore(30.0);
    pub const GAP_X_DROPOFF_FINAL_PROT: BitScore = BitScore(25.0);
    pub const GAP_X_DROPOFF_FINAL_NUCL: BitScore = BitScore(100.0);
    pub const GAP_TRIGGER_PROT: BitScore = BitScore(22.0);
    pub const GAP_TRIGGER_NUCL: BitScore = BitScore(27.0);

    pub const GAP_OPEN_PROT: i32 = 11;
    pub const GAP_EXTEND_PROT: i32 = 1;
}

#[derive(Debug, Clone)]
pub struct LookupTableOptions {
    pub word_size: usize,
    /// Neighborhood score threshold for protein lookup tables; unused by
    /// exact-match nucleotide tables.
    pub threshold: i32,
}

impl LookupTableOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.word_size == 0 {
            return Err(EngineError::Configuration("word size must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InitialWordOptions {
    /// Two-hit window on the same diagonal; 0 selects one-hit extension.
    pub window_size: i32,
    pub x_dropoff: BitScore,
}

impl InitialWordOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.window_size < 0 {
            return Err(EngineError::Configuration("window size must be >= 0".into()));
        }
        if self.x_dropoff.0 <= 0.0 {
            return Err(EngineError::Configuration("ungapped X-dropoff must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExtensionOptions {
    pub gap_x_dropoff: BitScore,
    pub gap_x_dropoff_final: BitScore,
    pub gap_trigger: BitScore,
    /// False runs an ungapped-only search.
    pub gapped: bool,
    /// Use the greedy aligner (uniform-score nucleotide searches only).
    pub greedy: bool,
}

impl ExtensionOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.gapped && self.gap_x_dropoff_final.0 < self.gap_x_dropoff.0 {
            return Err(EngineError::Configuration(
                "final gap X-dropoff must not be below the preliminary one".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HitSavingOptions {
    pub expect_value: f64,
    /// Keep at most this many higher-scoring HSPs over any subject region
    /// before discarding one; 0 disables culling.
    pub culling_limit: usize,
    /// Longest intron for uneven-gap linking in translated searches;
    /// <= 0 selects the small/large gap dichotomy.
    pub longest_intron: i32,
    pub sum_statistics: bool,
}

impl HitSavingOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.expect_value <= 0.0 {
            return Err(EngineError::Configuration("expect value must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EffectiveLengthsOptions {
    /// Database length override; 0 derives it from the sequence source.
    pub db_length: i64,
    pub db_num_seqs: i64,
}

impl EffectiveLengthsOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.db_length < 0 || self.db_num_seqs < 0 {
            return Err(EngineError::Configuration("database lengths must be >= 0".into()));
        }
        Ok(())
    }
}

/// Derived gapped-extension thresholds in raw score units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtensionParameters {
    pub gap_x_dropoff: i32,
    pub gap_x_dropoff_final: i32,
    pub gap_trigger: i32,
}

impl ExtensionParameters {
    pub fn new(
        opts: &ExtensionOptions,
        sb: &ScoreBlock,
        query_info: &QueryInfo,
    ) -> EngineResult<Self> {
        opts.validate()?;
        let (_, kbp_std) = sb.first_valid_kbp(false)?;
        let gap_trigger = gap_trigger_raw(opts.gap_trigger, kbp_std, sb.scale_factor);

        let lambda = if opts.gapped {
            sb.smallest_valid_lambda(query_info.first_context, query_info.last_context, true)?
        } else {
            sb.smallest_valid_lambda(query_info.first_context, query_info.last_context, false)?
        };
        Ok(Self {
            gap_x_dropoff: raw_from_bits(opts.gap_x_dropoff, lambda, sb.scale_factor),
            gap_x_dropoff_final: raw_from_bits(opts.gap_x_dropoff_final, lambda, sb.scale_factor),
            gap_trigger,
        })
    }
}

/// Derived initial-word thresholds. `x_dropoff_init` is the option value in
/// raw units; the per-subject effective X-dropoff lives in
/// [`SubjectCutoffs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialWordParameters {
    pub window_size: i32,
    pub x_dropoff_init: i32,
    pub gap_trigger: i32,
    /// Per-subject cutoff E-value used for the ungapped stage (program
    /// dependent, far looser than the reporting E-value).
    pub cutoff_e: f64,
    pub gap_decay_rate: f64,
}

impl InitialWordParameters {
    pub fn new(
        opts: &InitialWordOptions,
        ext: &ExtensionParameters,
        cutoff_e: f64,
        gapped: bool,
        sb: &ScoreBlock,
        query_info: &QueryInfo,
    ) -> EngineResult<Self> {
        opts.validate()?;
        let lambda =
            sb.smallest_valid_lambda(query_info.first_context, query_info.last_context, false)?;
        Ok(Self {
            window_size: opts.window_size,
            x_dropoff_init: raw_from_bits(opts.x_dropoff, lambda, sb.scale_factor),
            gap_trigger: ext.gap_trigger,
            cutoff_e,
            gap_decay_rate: if gapped {
                link_defaults::GAP_DECAY_RATE_GAPPED
            } else {
                link_defaults::GAP_DECAY_RATE_UNGAPPED
            },
        })
    }

    /// Recompute the raw ungapped cutoff and effective X-dropoff for one
    /// subject, writing into `out`. Keeps the invariant
    /// `x_dropoff = min(x_dropoff_init, cutoff_score)`.
    pub fn update_for_subject(
        &self,
        sb: &ScoreBlock,
        query_info: &QueryInfo,
        subject_length: i64,
        gapped: bool,
        out: &mut SubjectCutoffs,
    ) -> EngineResult<()> {
        let mut cutoff = i32::MAX;
        for (ctx, info) in query_info.contexts.iter().enumerate() {
            if !info.is_valid {
                continue;
            }
            let Some(kbp) = sb.kbp(ctx, false) else { continue };
            // Pairwise search space for the ungapped stage: this subject
            // against this context.
            let searchsp = (info.query_length as i64).saturating_mul(subject_length.max(1));
            let s = cutoff_score_for_evalue_with_decay(
                self.cutoff_e,
                kbp,
                searchsp as f64,
                self.gap_decay_rate,
            );
            cutoff = cutoff.min(s);
        }
        if cutoff == i32::MAX {
            return Err(EngineError::StatisticsUnavailable {
                first_context: query_info.first_context,
                last_context: query_info.last_context,
            });
        }
        if gapped {
            cutoff = cutoff.min(self.gap_trigger);
        }
        let cutoff = (cutoff as f64 * sb.scale_factor) as i32;
        out.cutoff_score = cutoff;
        out.x_dropoff = self.x_dropoff_init.min(cutoff);
        Ok(())
    }
}

/// Derived hit-saving thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSavingParameters {
    pub expect_value: f64,
    /// Raw score floor applied before E-values exist. Ungapped searches
    /// derive it from the expect value; gapped searches keep a low floor
    /// and rely on the E-value filter after traceback.
    pub cutoff_score: i32,
    pub culling_limit: usize,
    pub longest_intron: i32,
    pub sum_statistics: bool,
}

impl HitSavingParameters {
    pub fn new(
        opts: &HitSavingOptions,
        sb: &ScoreBlock,
        gapped: bool,
        avg_subject_length: i64,
        query_info: &QueryInfo,
    ) -> EngineResult<Self> {
        opts.validate()?;
        let (ctx, kbp) = sb.first_valid_kbp(gapped)?;
        let qlen = query_info.contexts[ctx].query_length as i64;
        let searchsp = (qlen.max(1) * avg_subject_length.max(1)) as f64;
        let cutoff = cutoff_score_for_evalue(opts.expect_value, kbp, searchsp);
        Ok(Self {
            expect_value: opts.expect_value,
            cutoff_score: cutoff.max(1),
            culling_limit: opts.culling_limit,
            longest_intron: opts.longest_intron,
            sum_statistics: opts.sum_statistics,
        })
    }
}

/// Per-subject scratch for thresholds that depend on subject length.
/// Owned by the scan worker and overwritten for every subject; shared
/// parameter structs stay immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubjectCutoffs {
    pub cutoff_score: i32,
    pub x_dropoff: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sequence::concat_query_contexts;

    fn setup() -> (ScoreBlock, QueryInfo) {
        let (_, qi) = concat_query_contexts(&[(vec![0u8; 200], 1)]).unwrap();
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        (sb, qi)
    }

    fn ext_opts() -> ExtensionOptions {
        ExtensionOptions {
            gap_x_dropoff: defaults::GAP_X_DROPOFF_PROT,
            gap_x_dropoff_final: defaults::GAP_X_DROPOFF_FINAL_PROT,
            gap_trigger: defaults::GAP_TRIGGER_PROT,
            gapped: true,
            greedy: false,
        }
    }

    #[test]
    fn derivation_is_idempotent() {
        let (sb, qi) = setup();
        let ext1 = ExtensionParameters::new(&ext_opts(), &sb, &qi).unwrap();
        let ext2 = ExtensionParameters::new(&ext_opts(), &sb, &qi).unwrap();
        assert_eq!(ext1, ext2);

        let word_opts = InitialWordOptions {
            window_size: defaults::WINDOW_SIZE_PROT,
            x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
        };
        let w1 = InitialWordParameters::new(&word_opts, &ext1, 1e-300, true, &sb, &qi).unwrap();
        let w2 = InitialWordParameters::new(&word_opts, &ext2, 1e-300, true, &sb, &qi).unwrap();
        assert_eq!(w1, w2);

        let mut c1 = SubjectCutoffs::default();
        let mut c2 = SubjectCutoffs::default();
        w1.update_for_subject(&sb, &qi, 10_000, true, &mut c1).unwrap();
        w1.update_for_subject(&sb, &qi, 10_000, true, &mut c2).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn x_dropoff_is_min_of_init_and_cutoff() {
        let (sb, qi) = setup();
        let ext = ExtensionParameters::new(&ext_opts(), &sb, &qi).unwrap();
        let word_opts = InitialWordOptions {
            window_size: defaults::WINDOW_SIZE_PROT,
            x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
        };
        let wp = InitialWordParameters::new(&word_opts, &ext, 1e-300, true, &sb, &qi).unwrap();

        let mut cut = SubjectCutoffs::default();
        for subject_len in [10_i64, 100, 10_000, 10_000_000] {
            wp.update_for_subject(&sb, &qi, subject_len, true, &mut cut).unwrap();
            assert_eq!(cut.x_dropoff, wp.x_dropoff_init.min(cut.cutoff_score));
            assert!(cut.x_dropoff <= wp.x_dropoff_init);
        }
    }

    #[test]
    fn ungapped_protein_defaults_match_published_values() {
        let (sb, qi) = setup();
        let mut opts = ext_opts();
        opts.gapped = false;
        let ext = ExtensionParameters::new(&opts, &sb, &qi).unwrap();
        // gap trigger: 22 bits against ungapped BLOSUM62.
        assert_eq!(ext.gap_trigger, 41);

        let word_opts = InitialWordOptions {
            window_size: 0,
            x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
        };
        let wp = InitialWordParameters::new(&word_opts, &ext, 1e-300, false, &sb, &qi).unwrap();
        // 7 bits against ungapped BLOSUM62 lambda.
        assert_eq!(wp.x_dropoff_init, 16);
    }

    #[test]
    fn gapped_cutoff_capped_by_gap_trigger() {
        let (sb, qi) = setup();
        let ext = ExtensionParameters::new(&ext_opts(), &sb, &qi).unwrap();
        let word_opts = InitialWordOptions {
            window_size: defaults::WINDOW_SIZE_PROT,
            x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
        };
        // A large cutoff_e would give a tiny score cutoff, but a huge
        // subject with a tiny e-value cannot push it above gap_trigger.
        let wp = InitialWordParameters::new(&word_opts, &ext, 1e-300, true, &sb, &qi).unwrap();
        let mut cut = SubjectCutoffs::default();
        wp.update_for_subject(&sb, &qi, 1_000_000_000, true, &mut cut).unwrap();
        assert!(cut.cutoff_score <= ext.gap_trigger);
    }

    #[test]
    fn invalid_options_rejected() {
        assert!(LookupTableOptions { word_size: 0, threshold: 0 }.validate().is_err());
        assert!(InitialWordOptions { window_size: -1, x_dropoff: BitScore(20.0) }
            .validate()
            .is_err());
        assert!(HitSavingOptions {
            expect_value: 0.0,
            culling_limit: 0,
            longest_intron: 0,
            sum_statistics: false
        }
        .validate()
        .is_err());
    }
}
