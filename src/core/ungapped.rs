//! Ungapped X-drop extension of word hits.
//!
//! A word hit is extended left and right along its diagonal, accumulating
//! pair scores until the running score falls `x_dropoff` below the best seen.
//! The reported extent is truncated back to the positions that achieved the
//! best score, so an extension never ends on a losing stretch.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_extend.c and
//! aa_ungapped.c.

use crate::core::score_model::ScoreBlock;

/// Which side of the alignment the position-specific matrix scores, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSide {
    None,
    /// Profile columns run along the query block.
    Query,
    /// Profile columns run along the subject.
    Subject,
}

/// Result of one ungapped extension, in concatenated-query and
/// subject-window coordinates. Ranges are half open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UngappedHsp {
    pub q_start: usize,
    pub q_end: usize,
    pub s_start: usize,
    pub s_end: usize,
    pub score: i32,
}

/// Scores aligned pairs and extends seeds along a diagonal.
#[derive(Debug, Clone, Copy)]
pub struct UngappedExtender<'a> {
    sb: &'a ScoreBlock,
    profile_side: ProfileSide,
}

impl<'a> UngappedExtender<'a> {
    pub fn new(sb: &'a ScoreBlock, profile_side: ProfileSide) -> Self {
        Self { sb, profile_side }
    }

    #[inline]
    fn pair(&self, query: &[u8], subject: &[u8], q: usize, s: usize) -> i32 {
        match self.profile_side {
            ProfileSide::None => self.sb.pair_score(query[q], subject[s]),
            ProfileSide::Query => self.sb.profile_score(q, subject[s]),
            ProfileSide::Subject => self.sb.profile_score(s, query[q]),
        }
    }

    /// Extend from a seed at `(q_off, s_off)`. The seed position itself is
    /// scored by the rightward pass, so callers hand in the word start.
    pub fn extend(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
        x_dropoff: i32,
    ) -> UngappedHsp {
        // Leftward, not including the seed position.
        let mut sum = 0i32;
        let mut best_left = 0i32;
        let mut left_ext = 0usize;
        let max_left = q_off.min(s_off);
        for i in 1..=max_left {
            sum += self.pair(query, subject, q_off - i, s_off - i);
            if sum > best_left {
                best_left = sum;
                left_ext = i;
            } else if best_left - sum >= x_dropoff {
                break;
            }
        }

        // Rightward, starting at the seed.
        let mut sum = 0i32;
        let mut best_right = 0i32;
        let mut right_ext = 0usize;
        let max_right = (query.len() - q_off).min(subject.len() - s_off);
        for j in 0..max_right {
            sum += self.pair(query, subject, q_off + j, s_off + j);
            if sum > best_right {
                best_right = sum;
                right_ext = j + 1;
            } else if best_right - sum >= x_dropoff {
                break;
            }
        }

        UngappedHsp {
            q_start: q_off - left_ext,
            q_end: q_off + right_ext,
            s_start: s_off - left_ext,
            s_end: s_off + right_ext,
            score: best_left + best_right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::encode_nucleotide;
    use crate::core::sequence::SENTINEL;

    fn extender(sb: &ScoreBlock) -> UngappedExtender<'_> {
        UngappedExtender::new(sb, ProfileSide::None)
    }

    #[test]
    fn extension_truncates_to_running_maximum() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        // 12 matching bases followed by a losing tail of mismatches.
        let query = encode_nucleotide(b"ACGTACGTACGTTTTT");
        let subject = encode_nucleotide(b"ACGTACGTACGTGGGG");
        let hsp = extender(&sb).extend(&query, &subject, 0, 0, 22);
        assert_eq!(hsp.score, 12);
        assert_eq!((hsp.q_start, hsp.q_end), (0, 12));
        assert_eq!((hsp.s_start, hsp.s_end), (0, 12));
    }

    #[test]
    fn extension_recovers_after_small_dip() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        // One mismatch inside a long match: -3 dip is under the dropoff,
        // so the extension continues and the full extent wins.
        let query = encode_nucleotide(b"ACGTACGTTACGTACGT");
        let subject = encode_nucleotide(b"ACGTACGTGACGTACGT");
        let hsp = extender(&sb).extend(&query, &subject, 0, 0, 22);
        assert_eq!(hsp.score, 16 - 3);
        assert_eq!((hsp.q_start, hsp.q_end), (0, 17));
    }

    #[test]
    fn extension_stops_at_sentinel() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        let mut query = encode_nucleotide(b"ACGTACGT");
        query.push(SENTINEL);
        query.extend(encode_nucleotide(b"ACGTACGT"));
        let subject = encode_nucleotide(b"ACGTACGTAACGTACGT");
        let hsp = extender(&sb).extend(&query, &subject, 0, 0, 22);
        // The sentinel pair scores far below any dropoff, ending the pass.
        assert_eq!(hsp.q_end, 8);
        assert_eq!(hsp.score, 8);
    }

    #[test]
    fn seed_in_middle_extends_both_ways() {
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, 1).unwrap();
        let query = encode_nucleotide(b"TTTTACGTACGTTTTT");
        let subject = encode_nucleotide(b"GGGGACGTACGTGGGG");
        let hsp = extender(&sb).extend(&query, &subject, 8, 8, 22);
        assert_eq!(hsp.score, 8);
        assert_eq!((hsp.q_start, hsp.q_end), (4, 12));
        assert_eq!((hsp.s_start, hsp.s_end), (4, 12));
    }

    #[test]
    fn protein_extension_uses_matrix_scores() {
        use crate::core::encoding::encode_protein;
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let query = encode_protein(b"WWWWPPPP");
        let subject = encode_protein(b"WWWWGGGG");
        let hsp = extender(&sb).extend(&query, &subject, 0, 0, 7);
        // Four W/W pairs at 11 each; the P/G tail loses.
        assert_eq!(hsp.score, 44);
        assert_eq!(hsp.q_end, 4);
    }
}
