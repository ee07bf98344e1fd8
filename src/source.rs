//! Subject acquisition boundary.
//!
//! The engine never reads sequence files itself; it pulls encoded subjects
//! through [`SequenceSource`]. A fetch failure is scoped to one subject,
//! reported as [`EngineError::TransientSubject`], and never fails the
//! whole search.

use crate::error::{EngineError, EngineResult};

/// Supported search programs. The program fixes the query and subject
/// alphabets, the translation layout, and the preliminary-stage E-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlastProgram {
    Blastn,
    Blastp,
    Blastx,
    Tblastn,
    Tblastx,
    Rpsblast,
    Rpstblastn,
}

impl BlastProgram {
    /// Subjects are nucleotide and scanned in all six translation frames.
    pub fn subject_is_translated(self) -> bool {
        matches!(self, BlastProgram::Tblastn | BlastProgram::Tblastx)
    }

    /// Queries are nucleotide and contribute six translated contexts each.
    pub fn query_is_translated(self) -> bool {
        matches!(
            self,
            BlastProgram::Blastx | BlastProgram::Tblastx | BlastProgram::Rpstblastn
        )
    }

    pub fn is_nucleotide_subject(self) -> bool {
        matches!(
            self,
            BlastProgram::Blastn | BlastProgram::Tblastn | BlastProgram::Tblastx
        )
    }

    /// Profile searches invert the roles: the lookup table is built over
    /// the concatenated profile database and the real query is scanned as
    /// the subject.
    pub fn is_rps(self) -> bool {
        matches!(self, BlastProgram::Rpsblast | BlastProgram::Rpstblastn)
    }

    /// Preliminary-stage cutoff E-value. Far looser (or effectively
    /// disabled) compared to the reporting E-value; gapped programs rely
    /// on the gap trigger instead.
    /// NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_parameters.c
    pub fn cutoff_e(self) -> f64 {
        match self {
            BlastProgram::Blastn => 0.05,
            BlastProgram::Blastp | BlastProgram::Rpsblast => 1.0e-300,
            BlastProgram::Blastx => 0.5,
            BlastProgram::Tblastn | BlastProgram::Rpstblastn => 1.0,
            BlastProgram::Tblastx => 1.0e-300,
        }
    }
}

/// One fetched subject, already encoded for the program's alphabet.
#[derive(Debug, Clone)]
pub struct SubjectSequence {
    pub oid: usize,
    pub data: Vec<u8>,
}

/// Read access to the subject database.
pub trait SequenceSource: Send + Sync {
    fn num_subjects(&self) -> usize;

    /// Total residue count over all subjects, for effective-length setup.
    fn total_length(&self) -> i64;

    /// Fetch one subject by ordinal id.
    fn subject(&self, oid: usize) -> EngineResult<SubjectSequence>;
}

/// Subjects held in memory, for tests and the demo driver.
pub struct InMemorySequenceSource {
    subjects: Vec<Vec<u8>>,
}

impl InMemorySequenceSource {
    pub fn new(subjects: Vec<Vec<u8>>) -> Self {
        Self { subjects }
    }
}

impl SequenceSource for InMemorySequenceSource {
    fn num_subjects(&self) -> usize {
        self.subjects.len()
    }

    fn total_length(&self) -> i64 {
        self.subjects.iter().map(|s| s.len() as i64).sum()
    }

    fn subject(&self, oid: usize) -> EngineResult<SubjectSequence> {
        let data = self.subjects.get(oid).ok_or_else(|| EngineError::TransientSubject {
            oid,
            reason: "ordinal id out of range".into(),
        })?;
        Ok(SubjectSequence { oid, data: data.clone() })
    }
}
