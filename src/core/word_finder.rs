//! Word scanning over subject sequences.
//!
//! A word finder walks one subject (or subject window), probes the lookup
//! table, applies the per-diagonal hit rules and hands surviving seeds to
//! the ungapped extender. The finder flavor is chosen once at search setup
//! and then shared immutably across workers; all per-subject mutability
//! lives in [`ScanState`].
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/na_ungapped.c,
//! aa_ungapped.c and phi_extend.c.

use rustc_hash::FxHashMap;

use crate::core::lookup::{
    AaLookupTable, DiscontigLookupTable, NaLookupTable, PhiPattern, RpsLookupTable,
};
use crate::core::parameters::SubjectCutoffs;
use crate::core::ungapped::{UngappedExtender, UngappedHsp};

/// Diagonal tables larger than this fall back to hashing.
const MAX_DIAG_ARRAY: usize = 1 << 22;

#[derive(Debug, Clone, Copy, Default)]
struct DiagCell {
    /// Biased subject position of the last event on this diagonal.
    /// Values below the current bias are stale.
    last_pos: i32,
    /// Whether the last event was a completed extension.
    extended: bool,
}

enum DiagStorage {
    Array { cells: Vec<DiagCell>, mask: usize },
    Hash(FxHashMap<i64, DiagCell>),
}

/// Per-diagonal scan bookkeeping, reset between subjects in O(1) by
/// advancing a bias instead of clearing storage.
pub struct DiagTable {
    storage: DiagStorage,
    bias: i32,
    window: i32,
}

impl DiagTable {
    pub fn new(query_len: usize, max_subject_len: usize, window: i32) -> Self {
        let num_diags = (query_len + max_subject_len + 1).next_power_of_two();
        let storage = if num_diags <= MAX_DIAG_ARRAY {
            DiagStorage::Array { cells: vec![DiagCell::default(); num_diags], mask: num_diags - 1 }
        } else {
            DiagStorage::Hash(FxHashMap::default())
        };
        Self { storage, bias: window + 1, window }
    }

    /// Prepare for the next subject of the given length.
    pub fn reset(&mut self, subject_len: usize) {
        let step = subject_len as i64 + self.window as i64 + 1;
        if self.bias as i64 + step > i32::MAX as i64 / 2 {
            match &mut self.storage {
                DiagStorage::Array { cells, .. } => cells.fill(DiagCell::default()),
                DiagStorage::Hash(map) => map.clear(),
            }
            self.bias = self.window + 1;
        } else {
            self.bias += step as i32;
        }
    }

    fn cell(&mut self, diag: i64) -> &mut DiagCell {
        match &mut self.storage {
            DiagStorage::Array { cells, mask } => &mut cells[(diag as usize) & *mask],
            DiagStorage::Hash(map) => map.entry(diag).or_default(),
        }
    }

    /// Last recorded subject position on `diag`, if still current.
    pub fn last(&mut self, diag: i64) -> Option<(i32, bool)> {
        let bias = self.bias;
        let cell = self.cell(diag);
        if cell.last_pos >= bias {
            Some((cell.last_pos - bias, cell.extended))
        } else {
            None
        }
    }

    pub fn record(&mut self, diag: i64, s_pos: i32, extended: bool) {
        let bias = self.bias;
        let cell = self.cell(diag);
        cell.last_pos = s_pos + bias;
        cell.extended = extended;
    }
}

/// Mutable scratch carried by each worker across subjects.
pub struct ScanState {
    pub diag: DiagTable,
    /// HSPs passing the subject's score cutoff, for one subject at a time.
    pub hits: Vec<UngappedHsp>,
}

impl ScanState {
    pub fn new(query_len: usize, max_subject_len: usize, window: i32) -> Self {
        Self { diag: DiagTable::new(query_len, max_subject_len, window), hits: Vec::new() }
    }

    pub fn begin_subject(&mut self, subject_len: usize) {
        self.diag.reset(subject_len);
        self.hits.clear();
    }
}

/// Extend a seed unless a previous extension on its diagonal already
/// covers it, then record the outcome. Returns whether an extension ran.
fn extend_seed(
    query: &[u8],
    subject: &[u8],
    q_off: usize,
    s_off: usize,
    cutoffs: &SubjectCutoffs,
    extender: &UngappedExtender<'_>,
    state: &mut ScanState,
) -> bool {
    let diag = q_off as i64 - s_off as i64;
    if let Some((last, extended)) = state.diag.last(diag) {
        if extended && last >= s_off as i32 {
            return false;
        }
    }
    let hsp = extender.extend(query, subject, q_off, s_off, cutoffs.x_dropoff);
    state.diag.record(diag, hsp.s_end as i32, true);
    if hsp.score >= cutoffs.cutoff_score {
        state.hits.push(hsp);
    }
    true
}

/// One scanning strategy; the variant is fixed when the search is set up.
pub trait WordFinder: Send + Sync {
    /// Scan `subject`, extending seeds into `state.hits`. Returns the raw
    /// word-hit count before any diagonal filtering.
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize;
}

/// Contiguous nucleotide words, extended on first hit.
pub struct ExactWordFinder {
    pub lut: NaLookupTable,
}

impl WordFinder for ExactWordFinder {
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize {
        let word_size = self.lut.word_size;
        let mask = self.lut.word_mask();
        let mut raw = 0usize;
        let mut word = 0u64;
        let mut run = 0usize;
        for (i, &b) in subject.iter().enumerate() {
            if b > 3 {
                run = 0;
                word = 0;
                continue;
            }
            word = ((word << 2) | b as u64) & mask;
            run += 1;
            if run < word_size {
                continue;
            }
            let s_off = i + 1 - word_size;
            for &q_off in self.lut.probe(word) {
                raw += 1;
                extend_seed(query, subject, q_off as usize, s_off, cutoffs, extender, state);
            }
        }
        raw
    }
}

/// Protein neighborhood words with the two-hit trigger: an extension runs
/// only when two non-overlapping hits land on one diagonal within the
/// window. A zero window degenerates to one-hit scanning.
pub struct TwoHitWordFinder {
    pub lut: AaLookupTable,
    pub window: i32,
}

impl WordFinder for TwoHitWordFinder {
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize {
        let word_size = self.lut.word_size;
        if subject.len() < word_size {
            return 0;
        }
        let mut raw = 0usize;
        for s_off in 0..=subject.len() - word_size {
            for &q_off in self.lut.probe(&subject[s_off..s_off + word_size]) {
                raw += 1;
                let q_off = q_off as usize;
                if self.window == 0 {
                    extend_seed(query, subject, q_off, s_off, cutoffs, extender, state);
                    continue;
                }
                let diag = q_off as i64 - s_off as i64;
                match state.diag.last(diag) {
                    None => state.diag.record(diag, s_off as i32, false),
                    Some((last, true)) => {
                        // A past extension covers the seed, or the seed
                        // starts a fresh pair beyond it.
                        if (s_off as i32) > last {
                            state.diag.record(diag, s_off as i32, false);
                        }
                    }
                    Some((last, false)) => {
                        let diff = s_off as i32 - last;
                        if diff > self.window {
                            state.diag.record(diag, s_off as i32, false);
                        } else if diff >= word_size as i32 {
                            extend_seed(query, subject, q_off, s_off, cutoffs, extender, state);
                        }
                        // Overlapping hits leave the first hit in place.
                    }
                }
            }
        }
        raw
    }
}

/// Discontiguous nucleotide words under a spaced template.
pub struct DiscontigWordFinder {
    pub lut: DiscontigLookupTable,
}

impl WordFinder for DiscontigWordFinder {
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize {
        let template = self.lut.template;
        let full_mask = template.full_mask();
        let mut raw = 0usize;
        let mut word = 0u64;
        let mut run = 0usize;
        for (i, &b) in subject.iter().enumerate() {
            if b > 3 {
                run = 0;
                word = 0;
                continue;
            }
            word = ((word << 2) | b as u64) & full_mask;
            run += 1;
            if run < template.length {
                continue;
            }
            let s_off = i + 1 - template.length;
            for &q_off in self.lut.probe(template.extract(word)) {
                raw += 1;
                extend_seed(query, subject, q_off as usize, s_off, cutoffs, extender, state);
            }
        }
        raw
    }
}

/// Pattern-seeded scanning: every subject occurrence of the pattern pairs
/// with every query occurrence, seeded at the occurrence starts.
pub struct PhiWordFinder {
    pub pattern: PhiPattern,
    pub query_occurrences: Vec<(usize, usize)>,
}

impl PhiWordFinder {
    pub fn new(pattern: PhiPattern, query: &[u8]) -> Self {
        let query_occurrences = pattern.find_occurrences(query);
        Self { pattern, query_occurrences }
    }
}

impl WordFinder for PhiWordFinder {
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize {
        let mut raw = 0usize;
        for (s_start, _) in self.pattern.find_occurrences(subject) {
            for &(q_start, _) in &self.query_occurrences {
                raw += 1;
                extend_seed(query, subject, q_start, s_start, cutoffs, extender, state);
            }
        }
        raw
    }
}

/// Profile search scanning. The lookup is built over profile columns, so
/// probes map residue words of the scanned sequence to profile positions;
/// the extender must score the profile on the query side.
pub struct RpsWordFinder {
    pub lut: RpsLookupTable,
}

impl WordFinder for RpsWordFinder {
    fn scan(
        &self,
        query: &[u8],
        subject: &[u8],
        cutoffs: &SubjectCutoffs,
        extender: &UngappedExtender<'_>,
        state: &mut ScanState,
    ) -> usize {
        let word_size = self.lut.word_size;
        if subject.len() < word_size {
            return 0;
        }
        let mut raw = 0usize;
        for s_off in 0..=subject.len() - word_size {
            for &col in self.lut.probe(&subject[s_off..s_off + word_size]) {
                raw += 1;
                extend_seed(query, subject, col as usize, s_off, cutoffs, extender, state);
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::{encode_nucleotide, encode_protein};
    use crate::core::score_model::ScoreBlock;
    use crate::core::ungapped::ProfileSide;

    fn na_cutoffs(cutoff: i32, x: i32) -> SubjectCutoffs {
        SubjectCutoffs { cutoff_score: cutoff, x_dropoff: x }
    }

    #[test]
    fn exact_finder_extends_planted_match() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        let query = encode_nucleotide(b"TTACGTACGTACGTTT");
        let mut subject = encode_nucleotide(b"GGGGGGGG");
        subject.extend(encode_nucleotide(b"ACGTACGTACGT"));
        subject.extend(encode_nucleotide(b"GGGGGGGG"));

        let finder = ExactWordFinder { lut: NaLookupTable::build(&query, 8).unwrap() };
        let extender = UngappedExtender::new(&sb, ProfileSide::None);
        let mut state = ScanState::new(query.len(), subject.len(), 0);
        state.begin_subject(subject.len());

        let raw = finder.scan(&query, &subject, &na_cutoffs(10, 11), &extender, &mut state);
        assert!(raw > 0);
        assert_eq!(state.hits.len(), 1);
        let hsp = &state.hits[0];
        assert_eq!(hsp.score, 12);
        assert_eq!((hsp.q_start, hsp.q_end), (2, 14));
        assert_eq!((hsp.s_start, hsp.s_end), (8, 20));
    }

    #[test]
    fn repeated_words_on_one_diagonal_extend_once() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        // A long shared run produces many overlapping word hits on the
        // same diagonal; the covered ones must be suppressed.
        let query = encode_nucleotide(b"ACGTACGTACGTACGTACGT");
        let subject = query.clone();

        let finder = ExactWordFinder { lut: NaLookupTable::build(&query, 8).unwrap() };
        let extender = UngappedExtender::new(&sb, ProfileSide::None);
        let mut state = ScanState::new(query.len(), subject.len(), 0);
        state.begin_subject(subject.len());

        let raw = finder.scan(&query, &subject, &na_cutoffs(10, 11), &extender, &mut state);
        assert!(raw >= 13);
        let main_diag: Vec<_> =
            state.hits.iter().filter(|h| h.q_start == h.s_start).collect();
        assert_eq!(main_diag.len(), 1);
        assert_eq!(main_diag[0].score, 20);
    }

    #[test]
    fn diag_table_reset_is_per_subject() {
        let mut diag = DiagTable::new(100, 100, 40);
        diag.record(5, 17, true);
        assert_eq!(diag.last(5), Some((17, true)));
        diag.reset(100);
        assert_eq!(diag.last(5), None);
    }

    #[test]
    fn two_hit_finder_requires_second_hit_in_window() {
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let query = encode_protein(b"WWWCCCWWW");
        let subject = encode_protein(b"WWWCCCWWW");
        let finder =
            TwoHitWordFinder { lut: AaLookupTable::build(&query, 3, 11, &sb).unwrap(), window: 40 };
        let extender = UngappedExtender::new(&sb, ProfileSide::None);
        let mut state = ScanState::new(query.len(), subject.len(), 40);
        state.begin_subject(subject.len());

        let raw = finder.scan(&query, &subject, &na_cutoffs(20, 16), &extender, &mut state);
        assert!(raw > 0);
        // The identity diagonal gets two non-overlapping hits and extends.
        assert!(state.hits.iter().any(|h| h.q_start == h.s_start));
    }

    #[test]
    fn two_hit_finder_single_hit_does_not_extend() {
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let query = encode_protein(b"WWWAAAAA");
        let subject = encode_protein(b"WWWGGGGG");
        let finder =
            TwoHitWordFinder { lut: AaLookupTable::build(&query, 3, 11, &sb).unwrap(), window: 40 };
        let extender = UngappedExtender::new(&sb, ProfileSide::None);
        let mut state = ScanState::new(query.len(), subject.len(), 40);
        state.begin_subject(subject.len());

        finder.scan(&query, &subject, &na_cutoffs(20, 16), &extender, &mut state);
        assert!(state.hits.is_empty());
    }

    #[test]
    fn phi_finder_pairs_occurrences() {
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let pattern = PhiPattern::parse("W-W-x-K").unwrap();
        let query = encode_protein(b"AWWGKAAA");
        let subject = encode_protein(b"CCWWAKCC");
        let finder = PhiWordFinder::new(pattern, &query);
        assert_eq!(finder.query_occurrences, vec![(1, 5)]);

        let extender = UngappedExtender::new(&sb, ProfileSide::None);
        let mut state = ScanState::new(query.len(), subject.len(), 0);
        state.begin_subject(subject.len());
        let raw = finder.scan(&query, &subject, &na_cutoffs(10, 16), &extender, &mut state);
        assert_eq!(raw, 1);
    }
}
