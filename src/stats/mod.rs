//! Karlin-Altschul statistics: parameter tables, score conversions,
//! effective-length adjustment and sum statistics for linked HSPs.

pub mod karlin;
pub mod length_adjustment;
pub mod sum_statistics;
pub mod tables;

pub use karlin::{
    bit_score_from_raw, cutoff_score_for_evalue, cutoff_score_for_evalue_with_decay,
    evalue_from_raw, gap_trigger_raw, raw_from_bits, BitScore, NCBIMATH_LN2,
};
pub use length_adjustment::{effective_lengths, length_adjustment, EffectiveLengths};
pub use tables::KarlinBlock;
