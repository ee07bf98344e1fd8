//! Search engine core.
//!
//! Reference layout: ncbi-blast/c++/src/algo/blast/core/
//!
//! The pipeline runs lookup-table word matching, ungapped X-drop
//! extension, gapped extension, statistical evaluation and traceback:
//!
//! - `encoding`: residue alphabets, translation, frame coordinates.
//! - `sequence`: encoded blocks, subject views, query context table.
//! - `score_model`: substitution matrix / profile plus Karlin blocks.
//! - `lookup`: lookup table variants (exact, neighborhood, template,
//!   pattern, profile).
//! - `word_finder`: subject scanning and diagonal bookkeeping.
//! - `ungapped`: seed extension to ungapped HSPs.
//! - `gapped`: dynamic-programming and greedy gapped extension.
//! - `parameters`: validated options and derived raw-score thresholds.
//! - `hits`: HSP lists, merging, purging, culling, evaluation.
//! - `link_hsps`: sum-statistics linking.
//! - `engine`: the per-subject orchestration loop.

pub mod encoding;
pub mod engine;
pub mod gapped;
pub mod hits;
pub mod link_hsps;
pub mod lookup;
pub mod parameters;
pub mod score_model;
pub mod sequence;
pub mod ungapped;
pub mod word_finder;
