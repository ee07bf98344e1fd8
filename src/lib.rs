//! seedex: a seed-and-extend local alignment search engine core.
//!
//! The library implements the BLAST pipeline (lookup-table word matching,
//! ungapped X-drop extension, gapped extension, Karlin-Altschul statistics
//! and traceback) behind narrow interfaces. Callers hand in encoded
//! queries ([`core::sequence::SequenceBlock`] + [`core::sequence::QueryInfo`]),
//! a scoring model ([`core::score_model::ScoreBlock`]) and a subject
//! database ([`source::SequenceSource`]); results come back as
//! [`core::hits::HspResults`].

pub mod core;
pub mod error;
pub mod source;
pub mod stats;

pub use core::engine::{SearchEngine, SearchOptions, SearchOutcome, Seeding};
pub use core::hits::{Hsp, HspList, HspResults};
pub use error::{EngineError, EngineResult};
pub use source::{BlastProgram, InMemorySequenceSource, SequenceSource, SubjectSequence};
