//! Lookup tables mapping subject words to query offsets.
//!
//! One table is built per search from the concatenated query block (or, for
//! profile searches, from the profile database) and then shared read-only by
//! all scan workers. Probing is O(1) amortized; building is linear in query
//! length times neighborhood size.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_nalookup.c,
//! blast_aalookup.c and mb_lookup.c.

use rustc_hash::FxHashMap;

use crate::core::encoding::AA_SIZE;
use crate::core::score_model::ScoreBlock;
use crate::error::{EngineError, EngineResult};

/// Direct-indexed tables above this many buckets switch to a hash map.
const MAX_DIRECT_BUCKETS: usize = 1 << 24;

/// Compressed sparse rows: `offsets[i]..offsets[i+1]` indexes `values` for
/// bucket `i`.
#[derive(Debug, Clone)]
struct Csr {
    offsets: Vec<u32>,
    values: Vec<u32>,
}

impl Csr {
    fn build(num_buckets: usize, items: &[(usize, u32)]) -> Self {
        let mut counts = vec![0u32; num_buckets + 1];
        for &(bucket, _) in items {
            counts[bucket + 1] += 1;
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }
        let mut values = vec![0u32; items.len()];
        let mut cursor = counts.clone();
        for &(bucket, value) in items {
            values[cursor[bucket] as usize] = value;
            cursor[bucket] += 1;
        }
        Csr { offsets: counts, values }
    }

    #[inline]
    fn get(&self, bucket: usize) -> &[u32] {
        let lo = self.offsets[bucket] as usize;
        let hi = self.offsets[bucket + 1] as usize;
        &self.values[lo..hi]
    }
}

/// Exact-word nucleotide lookup table over 2-bit packed words.
///
/// Word sizes up to 12 use a direct-indexed backbone; longer words hash.
/// Query words containing any ambiguous base are not indexed, matching the
/// strict 2-bit scan of the word finder.
#[derive(Debug)]
pub struct NaLookupTable {
    pub word_size: usize,
    mask: u64,
    direct: Option<Csr>,
    hashed: Option<FxHashMap<u64, Vec<u32>>>,
}

impl NaLookupTable {
    pub fn build(query: &[u8], word_size: usize) -> EngineResult<Self> {
        if word_size < 4 || word_size > 32 {
            return Err(EngineError::Configuration(format!(
                "nucleotide word size {word_size} out of range 4..=32"
            )));
        }
        let mask: u64 = if word_size == 32 { u64::MAX } else { (1u64 << (2 * word_size)) - 1 };
        let buckets = 1usize.checked_shl(2 * word_size as u32).unwrap_or(usize::MAX);

        let mut items: Vec<(usize, u32)> = Vec::new();
        let mut hashed: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        let direct = buckets <= MAX_DIRECT_BUCKETS;

        // Rolling word; any out-of-alphabet byte restarts the run.
        let mut word: u64 = 0;
        let mut run = 0usize;
        for (i, &b) in query.iter().enumerate() {
            if b > 3 {
                run = 0;
                word = 0;
                continue;
            }
            word = ((word << 2) | b as u64) & mask;
            run += 1;
            if run >= word_size {
                let start = (i + 1 - word_size) as u32;
                if direct {
                    items.push((word as usize, start));
                } else {
                    hashed.entry(word).or_default().push(start);
                }
            }
        }

        Ok(if direct {
            Self { word_size, mask, direct: Some(Csr::build(buckets, &items)), hashed: None }
        } else {
            Self { word_size, mask, direct: None, hashed: Some(hashed) }
        })
    }

    #[inline]
    pub fn word_mask(&self) -> u64 {
        self.mask
    }

    /// Query start offsets indexed under `word`.
    #[inline]
    pub fn probe(&self, word: u64) -> &[u32] {
        if let Some(csr) = &self.direct {
            csr.get(word as usize)
        } else {
            self.hashed
                .as_ref()
                .and_then(|m| m.get(&word))
                .map(|v| v.as_slice())
                .unwrap_or(&[])
        }
    }
}

const AA_BITS: u32 = 5;

/// Pack up to 12 residues at 5 bits each.
#[inline]
pub fn pack_aa_word(word: &[u8]) -> u32 {
    let mut idx = 0u32;
    for &r in word {
        idx = (idx << AA_BITS) | r as u32;
    }
    idx
}

/// Protein neighborhood lookup table.
///
/// Every word of the alphabet scoring at least `threshold` against some
/// query word is indexed under the query word's offsets, so a single exact
/// probe during the scan finds all neighborhood matches.
#[derive(Debug)]
pub struct AaLookupTable {
    pub word_size: usize,
    pub threshold: i32,
    backbone: Csr,
}

impl AaLookupTable {
    pub fn build(
        query: &[u8],
        word_size: usize,
        threshold: i32,
        sb: &ScoreBlock,
    ) -> EngineResult<Self> {
        if word_size != 3 {
            return Err(EngineError::Configuration(format!(
                "protein word size {word_size} unsupported (expected 3)"
            )));
        }
        let buckets = 1usize << (AA_BITS as usize * word_size);

        // Per-position best score over the alphabet, for branch pruning.
        let row_max = |q: u8| -> i32 {
            (0..AA_SIZE as u8).map(|a| sb.pair_score(q, a)).max().unwrap_or(0)
        };

        let mut items: Vec<(usize, u32)> = Vec::new();
        for start in 0..query.len().saturating_sub(word_size - 1) {
            let w = &query[start..start + word_size];
            if w.iter().any(|&r| r as usize >= AA_SIZE) {
                continue;
            }
            let (q0, q1, q2) = (w[0], w[1], w[2]);
            let (m1, m2) = (row_max(q1), row_max(q2));
            for a in 0..AA_SIZE as u8 {
                let s0 = sb.pair_score(q0, a);
                if s0 + m1 + m2 < threshold {
                    continue;
                }
                for b in 0..AA_SIZE as u8 {
                    let s01 = s0 + sb.pair_score(q1, b);
                    if s01 + m2 < threshold {
                        continue;
                    }
                    for c in 0..AA_SIZE as u8 {
                        if s01 + sb.pair_score(q2, c) >= threshold {
                            let idx = pack_aa_word(&[a, b, c]) as usize;
                            items.push((idx, start as u32));
                        }
                    }
                }
            }
        }

        Ok(Self { word_size, threshold, backbone: Csr::build(buckets, &items) })
    }

    #[inline]
    pub fn probe(&self, word: &[u8]) -> &[u32] {
        if word.iter().any(|&r| r as usize >= AA_SIZE) {
            return &[];
        }
        self.backbone.get(pack_aa_word(word) as usize)
    }
}

/// A discontiguous word template: `length` scanned positions of which the
/// set bits of `care` contribute to the word index.
///
/// Coding-style templates ignore every third (wobble) position; the
/// 11-of-18 "optimal" shape is the PatternHunter seed.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub length: usize,
    pub weight: usize,
    care: u32,
}

impl Template {
    /// Coding template: zero out wobble positions (2, 5, 8, ...) from the
    /// left until only `weight` care positions remain.
    pub fn coding(weight: usize, length: usize) -> EngineResult<Self> {
        if length > 32 || weight > length {
            return Err(EngineError::Configuration(format!(
                "bad template {weight}-of-{length}"
            )));
        }
        let mut care: u32 = if length == 32 { u32::MAX } else { (1 << length) - 1 };
        let mut excess = length - weight;
        let mut pos = 2;
        while excess > 0 && pos < length {
            care &= !(1 << (length - 1 - pos));
            excess -= 1;
            pos += 3;
        }
        if excess > 0 {
            return Err(EngineError::Configuration(format!(
                "cannot build coding template {weight}-of-{length}"
            )));
        }
        Ok(Self { length, weight, care })
    }

    /// The PatternHunter 11-of-18 spaced seed.
    pub fn optimal_11_18() -> Self {
        Self { length: 18, weight: 11, care: 0b111010010100110111 }
    }

    /// Extract the discontiguous index from a full-width rolling word
    /// (2 bits per scanned position, most recent position in the low bits).
    #[inline]
    pub fn extract(&self, word: u64) -> u64 {
        let mut idx = 0u64;
        for pos in 0..self.length {
            if self.care & (1 << (self.length - 1 - pos)) != 0 {
                let shift = 2 * (self.length - 1 - pos);
                idx = (idx << 2) | ((word >> shift) & 3);
            }
        }
        idx
    }

    #[inline]
    pub fn full_mask(&self) -> u64 {
        if self.length == 32 {
            u64::MAX
        } else {
            (1u64 << (2 * self.length)) - 1
        }
    }
}

/// Discontiguous nucleotide lookup for megablast-style scanning.
#[derive(Debug)]
pub struct DiscontigLookupTable {
    pub template: Template,
    map: FxHashMap<u64, Vec<u32>>,
}

impl DiscontigLookupTable {
    pub fn build(query: &[u8], template: Template) -> Self {
        let mut map: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
        let full_mask = template.full_mask();
        let mut word: u64 = 0;
        let mut run = 0usize;
        for (i, &b) in query.iter().enumerate() {
            if b > 3 {
                run = 0;
                word = 0;
                continue;
            }
            word = ((word << 2) | b as u64) & full_mask;
            run += 1;
            if run >= template.length {
                let start = (i + 1 - template.length) as u32;
                map.entry(template.extract(word)).or_default().push(start);
            }
        }
        Self { template, map }
    }

    #[inline]
    pub fn probe(&self, index: u64) -> &[u32] {
        self.map.get(&index).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// One element of a PHI pattern in PROSITE-like syntax.
#[derive(Debug, Clone)]
enum PhiItem {
    /// Fixed residue.
    Residue(u8),
    /// One of a residue class, e.g. `[ILV]`.
    Class(Vec<u8>),
    /// Wildcard repeated `min..=max` times, e.g. `x(2,4)`.
    Any { min: usize, max: usize },
}

/// Parsed PHI pattern with occurrence search over encoded sequences.
#[derive(Debug, Clone)]
pub struct PhiPattern {
    items: Vec<PhiItem>,
}

impl PhiPattern {
    /// Parse `A-x(2)-[ILV]-G`-style patterns (dashes optional).
    pub fn parse(text: &str) -> EngineResult<Self> {
        use crate::core::encoding::ASCII_TO_AA;
        let bad =
            |msg: &str| EngineError::Configuration(format!("bad PHI pattern \"{text}\": {msg}"));
        let mut items = Vec::new();
        let bytes: Vec<u8> = text.bytes().filter(|&b| b != b'-' && b != b' ').collect();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'[' => {
                    let close = bytes[i..]
                        .iter()
                        .position(|&b| b == b']')
                        .ok_or_else(|| bad("unterminated class"))?
                        + i;
                    let class: Vec<u8> =
                        bytes[i + 1..close].iter().map(|&b| ASCII_TO_AA[b as usize]).collect();
                    if class.is_empty() {
                        return Err(bad("empty class"));
                    }
                    items.push(PhiItem::Class(class));
                    i = close + 1;
                }
                b'x' | b'X' => {
                    i += 1;
                    let (mut min, mut max) = (1usize, 1usize);
                    if i < bytes.len() && bytes[i] == b'(' {
                        let close = bytes[i..]
                            .iter()
                            .position(|&b| b == b')')
                            .ok_or_else(|| bad("unterminated repeat"))?
                            + i;
                        let body = std::str::from_utf8(&bytes[i + 1..close])
                            .map_err(|_| bad("repeat not utf8"))?;
                        if let Some((lo, hi)) = body.split_once(',') {
                            min = lo.trim().parse().map_err(|_| bad("repeat min"))?;
                            max = hi.trim().parse().map_err(|_| bad("repeat max"))?;
                        } else {
                            min = body.trim().parse().map_err(|_| bad("repeat count"))?;
                            max = min;
                        }
                        i = close + 1;
                    }
                    if min > max || max == 0 {
                        return Err(bad("bad repeat bounds"));
                    }
                    items.push(PhiItem::Any { min, max });
                }
                c if c.is_ascii_alphabetic() => {
                    items.push(PhiItem::Residue(ASCII_TO_AA[c as usize]));
                    i += 1;
                }
                _ => return Err(bad("unexpected character")),
            }
        }
        if items.is_empty() {
            return Err(bad("empty pattern"));
        }
        Ok(Self { items })
    }

    /// All `[start, end)` occurrences in an encoded sequence. Backtracking
    /// over variable-length wildcards; patterns are short, so this stays
    /// cheap.
    pub fn find_occurrences(&self, seq: &[u8]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for start in 0..seq.len() {
            if let Some(end) = self.match_from(seq, start, 0) {
                out.push((start, end));
            }
        }
        out
    }

    fn match_from(&self, seq: &[u8], pos: usize, item: usize) -> Option<usize> {
        if item == self.items.len() {
            return Some(pos);
        }
        match &self.items[item] {
            PhiItem::Residue(r) => {
                if pos < seq.len() && seq[pos] == *r {
                    self.match_from(seq, pos + 1, item + 1)
                } else {
                    None
                }
            }
            PhiItem::Class(class) => {
                if pos < seq.len() && class.contains(&seq[pos]) {
                    self.match_from(seq, pos + 1, item + 1)
                } else {
                    None
                }
            }
            PhiItem::Any { min, max } => {
                for n in (*min..=*max).rev() {
                    if pos + n <= seq.len()
                        && seq[pos..pos + n].iter().all(|&r| (r as usize) < AA_SIZE)
                    {
                        if let Some(end) = self.match_from(seq, pos + n, item + 1) {
                            return Some(end);
                        }
                    }
                }
                None
            }
        }
    }
}

/// Profile-database lookup: words scoring at least `threshold` against some
/// run of profile columns are indexed under the column start.
#[derive(Debug)]
pub struct RpsLookupTable {
    pub word_size: usize,
    pub threshold: i32,
    backbone: Csr,
}

impl RpsLookupTable {
    pub fn build(sb: &ScoreBlock, profile_len: usize, threshold: i32) -> EngineResult<Self> {
        let word_size = 3usize;
        if profile_len < word_size {
            return Err(EngineError::Configuration("profile shorter than one word".into()));
        }
        let buckets = 1usize << (AA_BITS as usize * word_size);

        let col_max = |col: usize| -> i32 {
            (0..AA_SIZE as u8).map(|r| sb.profile_score(col, r)).max().unwrap_or(0)
        };

        let mut items: Vec<(usize, u32)> = Vec::new();
        for start in 0..=profile_len - word_size {
            let (m1, m2) = (col_max(start + 1), col_max(start + 2));
            for a in 0..AA_SIZE as u8 {
                let s0 = sb.profile_score(start, a);
                if s0 + m1 + m2 < threshold {
                    continue;
                }
                for b in 0..AA_SIZE as u8 {
                    let s01 = s0 + sb.profile_score(start + 1, b);
                    if s01 + m2 < threshold {
                        continue;
                    }
                    for c in 0..AA_SIZE as u8 {
                        if s01 + sb.profile_score(start + 2, c) >= threshold {
                            items.push((pack_aa_word(&[a, b, c]) as usize, start as u32));
                        }
                    }
                }
            }
        }

        Ok(Self { word_size, threshold, backbone: Csr::build(buckets, &items) })
    }

    /// Profile column starts indexed under a residue word.
    #[inline]
    pub fn probe(&self, word: &[u8]) -> &[u32] {
        if word.iter().any(|&r| r as usize >= AA_SIZE) {
            return &[];
        }
        self.backbone.get(pack_aa_word(word) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::{encode_nucleotide, encode_protein};
    use crate::core::score_model::{Pssm, ScoreBlock};

    #[test]
    fn na_lookup_finds_planted_word() {
        let query = encode_nucleotide(b"AACGTACGTTGCA");
        let lut = NaLookupTable::build(&query, 4).unwrap();
        // ACGT occurs at offsets 1 and 5.
        let word = encode_nucleotide(b"ACGT");
        let idx = word.iter().fold(0u64, |w, &b| (w << 2) | b as u64);
        assert_eq!(lut.probe(idx), &[1, 5]);
        // A word absent from the query probes empty.
        let other = encode_nucleotide(b"GGGG").iter().fold(0u64, |w, &b| (w << 2) | b as u64);
        assert!(lut.probe(other).is_empty());
    }

    #[test]
    fn na_lookup_skips_ambiguous_words() {
        let query = encode_nucleotide(b"ACGNACGT");
        let lut = NaLookupTable::build(&query, 4).unwrap();
        let idx = encode_nucleotide(b"ACGT").iter().fold(0u64, |w, &b| (w << 2) | b as u64);
        // Only the run after the N produces the word.
        assert_eq!(lut.probe(idx), &[4]);
    }

    #[test]
    fn aa_neighborhood_includes_self_and_neighbors() {
        let query = encode_protein(b"WWW");
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let lut = AaLookupTable::build(&query, 3, 11, &sb).unwrap();
        // Self word scores 33, well above threshold.
        assert_eq!(lut.probe(&encode_protein(b"WWW")), &[0]);
        // W/W/F scores 11+11+1 = 23 >= 11.
        assert_eq!(lut.probe(&encode_protein(b"WWF")), &[0]);
        // A poor word is absent.
        assert!(lut.probe(&encode_protein(b"PPP")).is_empty());
    }

    #[test]
    fn coding_template_extracts_care_positions() {
        let t = Template::coding(12, 16).unwrap();
        assert_eq!(t.weight, 12);
        // Two words differing only at a wobble position collide.
        let w1 = encode_nucleotide(b"AACGTACGTACGTACG");
        let w2 = {
            let mut w = w1.clone();
            w[2] = 3; // wobble position
            w
        };
        let pack = |w: &[u8]| w.iter().fold(0u64, |acc, &b| (acc << 2) | b as u64);
        assert_eq!(t.extract(pack(&w1)), t.extract(pack(&w2)));
        // Differing at a care position separates them.
        let mut w3 = w1.clone();
        w3[0] = 1;
        assert_ne!(t.extract(pack(&w1)), t.extract(pack(&w3)));
    }

    #[test]
    fn discontig_lookup_probes_by_template_index() {
        let query = encode_nucleotide(b"ACGTACGTACGTACGTACGT");
        let t = Template::coding(11, 16).unwrap();
        let lut = DiscontigLookupTable::build(&query, t);
        let pack = |w: &[u8]| w.iter().fold(0u64, |acc, &b| (acc << 2) | b as u64);
        let idx = lut.template.extract(pack(&query[0..16]));
        assert!(lut.probe(idx).contains(&0));
    }

    #[test]
    fn phi_pattern_matching() {
        let pat = PhiPattern::parse("M-x(1,2)-[ILV]-K").unwrap();
        let seq = encode_protein(b"AMGVKA");
        // M at 1, one wildcard G, V in class, K: [1, 5).
        assert_eq!(pat.find_occurrences(&seq), vec![(1, 5)]);
        assert!(PhiPattern::parse("[").is_err());
        assert!(PhiPattern::parse("x(3,1)").is_err());
    }

    #[test]
    fn rps_lookup_indexes_high_scoring_columns() {
        let consensus = encode_protein(b"WWWWW");
        let rows: Vec<[i32; AA_SIZE]> = consensus
            .iter()
            .map(|&r| {
                let mut row = [-4i32; AA_SIZE];
                row[r as usize] = 11;
                row
            })
            .collect();
        let sb = ScoreBlock::profile(Pssm { rows }, 11, 1, 1.0, 1).unwrap();
        let lut = RpsLookupTable::build(&sb, 5, 20).unwrap();
        let probe = lut.probe(&encode_protein(b"WWW"));
        assert_eq!(probe, &[0, 1, 2]);
        assert!(lut.probe(&encode_protein(b"AAA")).is_empty());
    }
}
