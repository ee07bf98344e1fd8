//! Gapped extension of high-scoring seeds.
//!
//! Two aligner flavors sit behind one trait, chosen at search setup: an
//! affine-gap X-drop dynamic program for matrix and profile scoring, and a
//! greedy difference-counting aligner for uniform nucleotide reward and
//! penalty. Both extend left and right from a seed pair and can run
//! score-only (preliminary stage) or with full traceback.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_gapalign.c and
//! greedy_align.c.

use crate::core::score_model::ScoreBlock;
use crate::core::ungapped::ProfileSide;
use crate::error::{EngineError, EngineResult};

/// Upper bound on dynamic-program cells one traceback may record.
const MAX_DP_CELLS: usize = 1 << 28;

const NEG_INF: i32 = i32::MIN / 2;

/// One run of an alignment edit script. `Sub` covers aligned pairs, match
/// or mismatch alike; `Ins` consumes query only; `Del` consumes subject
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Sub(u32),
    Ins(u32),
    Del(u32),
}

/// Run-length edit script, adjacent ops of one kind coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapEditScript {
    pub ops: Vec<EditOp>,
}

impl GapEditScript {
    pub fn push(&mut self, op: EditOp) {
        match (self.ops.last_mut(), op) {
            (Some(EditOp::Sub(n)), EditOp::Sub(m)) => *n += m,
            (Some(EditOp::Ins(n)), EditOp::Ins(m)) => *n += m,
            (Some(EditOp::Del(n)), EditOp::Del(m)) => *n += m,
            (_, op) => self.ops.push(op),
        }
    }

    pub fn reverse(&mut self) {
        self.ops.reverse();
    }

    pub fn append(&mut self, other: &GapEditScript) {
        for &op in &other.ops {
            self.push(op);
        }
    }

    /// Total query and subject residues the script consumes.
    pub fn consumed(&self) -> (usize, usize) {
        let mut q = 0usize;
        let mut s = 0usize;
        for op in &self.ops {
            match *op {
                EditOp::Sub(n) => {
                    q += n as usize;
                    s += n as usize;
                }
                EditOp::Ins(n) => q += n as usize,
                EditOp::Del(n) => s += n as usize,
            }
        }
        (q, s)
    }
}

/// A gapped alignment in the coordinates of the extended sequences.
/// Ranges are half open; `edit` is present only after traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GappedAlignment {
    pub q_start: usize,
    pub q_end: usize,
    pub s_start: usize,
    pub s_end: usize,
    pub score: i32,
    pub edit: Option<GapEditScript>,
}

/// Extends seeds into gapped alignments.
pub trait GappedAligner: Send + Sync {
    /// Score and extent only; no edit script.
    fn score_only(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment>;

    /// Full extension with an edit script. The script's score is recomputed
    /// and must match the dynamic program's.
    fn with_traceback(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment>;
}

/// Outcome of one directional extension.
struct DirExtension {
    score: i32,
    a_ext: usize,
    b_ext: usize,
    edit: Option<GapEditScript>,
}

/// Affine-gap X-drop aligner over a substitution matrix or profile.
pub struct DpAligner<'a> {
    sb: &'a ScoreBlock,
    profile_side: ProfileSide,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub x_dropoff: i32,
}

impl<'a> DpAligner<'a> {
    pub fn new(sb: &'a ScoreBlock, profile_side: ProfileSide, x_dropoff: i32) -> Self {
        Self { sb, profile_side, gap_open: sb.gap_open, gap_extend: sb.gap_extend, x_dropoff }
    }

    #[inline]
    fn pair(&self, query: &[u8], subject: &[u8], q: usize, s: usize) -> i32 {
        match self.profile_side {
            ProfileSide::None => self.sb.pair_score(query[q], subject[s]),
            ProfileSide::Query => self.sb.profile_score(q, subject[s]),
            ProfileSide::Subject => self.sb.profile_score(s, query[q]),
        }
    }

    /// X-drop banded Gotoh over `a_len` x `b_len` cells, scoring cell
    /// `(i, j)` with `score(i, j)` for the pair `(a[i], b[j])`. Cell
    /// `(0, 0)` of the matrix is the empty prefix with score zero.
    fn extend_dir(
        &self,
        a_len: usize,
        b_len: usize,
        score: impl Fn(usize, usize) -> i32,
        traceback: bool,
    ) -> EngineResult<DirExtension> {
        // state bits: 0-1 best origin (0 diag, 1 horizontal, 2 vertical),
        // 2 horizontal gap extends, 3 vertical gap extends
        const FROM_DIAG: u8 = 0;
        const FROM_HORIZ: u8 = 1;
        const FROM_VERT: u8 = 2;
        const HORIZ_EXT: u8 = 4;
        const VERT_EXT: u8 = 8;

        let gap_oe = self.gap_open + self.gap_extend;

        let mut best = vec![NEG_INF; b_len + 1];
        let mut vert = vec![NEG_INF; b_len + 1];
        let mut best_score = 0i32;
        let mut best_pos = (0usize, 0usize);

        // Row 0: gaps in a only.
        best[0] = 0;
        let mut row0 = vec![0u8; 0];
        if traceback {
            row0 = vec![0u8; b_len + 1];
        }
        let mut last = 0usize;
        for j in 1..=b_len {
            let s = -self.gap_open - self.gap_extend * j as i32;
            if s < -self.x_dropoff {
                break;
            }
            best[j] = s;
            if traceback {
                row0[j] = FROM_HORIZ | if j > 1 { HORIZ_EXT } else { 0 };
            }
            last = j;
        }
        let mut first = 0usize;

        struct Row {
            first: usize,
            states: Vec<u8>,
        }
        let mut rows: Vec<Row> = Vec::new();
        let mut cells = 0usize;
        if traceback {
            row0.truncate(last + 1);
            cells += row0.len();
            rows.push(Row { first: 0, states: row0 });
        }

        for i in 1..=a_len {
            let row_first = first;
            // The band may grow one column right of the previous row.
            let row_last_cap = (last + 1).min(b_len);
            let mut states: Vec<u8> = if traceback {
                Vec::with_capacity(row_last_cap - row_first + 1)
            } else {
                Vec::new()
            };

            let mut new_first: Option<usize> = None;
            let mut new_last = row_first;
            let mut horiz = NEG_INF;
            let mut diag_prev = if row_first == 0 { NEG_INF } else { best[row_first - 1] };
            let mut prev_in_row = NEG_INF;

            for j in row_first..=row_last_cap {
                let up = if j <= last { best[j] } else { NEG_INF };
                let m = if j > 0 && diag_prev > NEG_INF {
                    diag_prev + score(i - 1, j - 1)
                } else if j == 0 && i == 0 {
                    0
                } else {
                    NEG_INF
                };
                diag_prev = up;

                // Vertical: gap in b (consume a only).
                let v_open = if up > NEG_INF { up - gap_oe } else { NEG_INF };
                let v_ext = if vert[j] > NEG_INF { vert[j] - self.gap_extend } else { NEG_INF };
                let v = v_open.max(v_ext);

                // Horizontal: gap in a (consume b only).
                let h_open = if prev_in_row > NEG_INF { prev_in_row - gap_oe } else { NEG_INF };
                let h_ext = if horiz > NEG_INF { horiz - self.gap_extend } else { NEG_INF };
                let h = h_open.max(h_ext);

                let mut state = FROM_DIAG;
                let mut cell = m;
                if h > cell {
                    cell = h;
                    state = FROM_HORIZ;
                }
                if v > cell {
                    cell = v;
                    state = FROM_VERT;
                }
                if h_ext >= h_open && h > NEG_INF {
                    state |= HORIZ_EXT;
                }
                if v_ext >= v_open && v > NEG_INF {
                    state |= VERT_EXT;
                }

                if cell < best_score - self.x_dropoff {
                    cell = NEG_INF;
                }

                best[j] = cell;
                vert[j] = if cell > NEG_INF { v } else { NEG_INF };
                horiz = if cell > NEG_INF { h } else { NEG_INF };
                prev_in_row = cell;

                if cell > NEG_INF {
                    if new_first.is_none() {
                        new_first = Some(j);
                    }
                    new_last = j;
                    if cell > best_score {
                        best_score = cell;
                        best_pos = (i, j);
                    }
                }
                if traceback {
                    states.push(state);
                }
            }

            let Some(nf) = new_first else {
                break;
            };
            first = nf;
            last = new_last;
            if first > 0 {
                best[first - 1] = NEG_INF;
            }

            if traceback {
                cells += states.len();
                if cells > MAX_DP_CELLS {
                    return Err(EngineError::ResourceExhaustion(format!(
                        "gapped traceback would record over {MAX_DP_CELLS} cells"
                    )));
                }
                rows.push(Row { first: row_first, states });
            }
            if first > b_len {
                break;
            }
        }

        let edit = if traceback {
            let (mut i, mut j) = best_pos;
            let mut script = GapEditScript::default();
            while i > 0 || j > 0 {
                let state = rows[i].states[j - rows[i].first];
                match state & 3 {
                    FROM_DIAG => {
                        script.push(EditOp::Sub(1));
                        i -= 1;
                        j -= 1;
                    }
                    FROM_HORIZ => {
                        // Walk the whole gap run; each cell's extend bit
                        // says whether the run continues leftward.
                        loop {
                            let st = rows[i].states[j - rows[i].first];
                            script.push(EditOp::Del(1));
                            j -= 1;
                            if st & HORIZ_EXT == 0 {
                                break;
                            }
                        }
                    }
                    _ => {
                        loop {
                            let st = rows[i].states[j - rows[i].first];
                            script.push(EditOp::Ins(1));
                            i -= 1;
                            if st & VERT_EXT == 0 {
                                break;
                            }
                        }
                    }
                }
            }
            script.reverse();
            Some(script)
        } else {
            None
        };

        Ok(DirExtension { score: best_score, a_ext: best_pos.0, b_ext: best_pos.1, edit })
    }

    fn extend(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
        traceback: bool,
    ) -> EngineResult<GappedAlignment> {
        // Leftward over reversed prefixes, rightward over suffixes; the
        // seed cell itself is scored by the right half.
        let left = self.extend_dir(
            q_off,
            s_off,
            |i, j| self.pair(query, subject, q_off - 1 - i, s_off - 1 - j),
            traceback,
        )?;
        let right = self.extend_dir(
            query.len() - q_off,
            subject.len() - s_off,
            |i, j| self.pair(query, subject, q_off + i, s_off + j),
            traceback,
        )?;

        let edit = match (left.edit, right.edit) {
            (Some(mut l), Some(r)) => {
                l.reverse();
                l.append(&r);
                Some(l)
            }
            _ => None,
        };
        let alignment = GappedAlignment {
            q_start: q_off - left.a_ext,
            q_end: q_off + right.a_ext,
            s_start: s_off - left.b_ext,
            s_end: s_off + right.b_ext,
            score: left.score + right.score,
            edit,
        };
        if traceback {
            self.verify_script(query, subject, &alignment)?;
        }
        Ok(alignment)
    }

    /// Recompute the script's score; a mismatch with the dynamic program
    /// means corrupted traceback state.
    fn verify_script(
        &self,
        query: &[u8],
        subject: &[u8],
        aln: &GappedAlignment,
    ) -> EngineResult<()> {
        let Some(script) = &aln.edit else {
            return Ok(());
        };
        let (q_used, s_used) = script.consumed();
        let mut score = 0i32;
        let mut q = aln.q_start;
        let mut s = aln.s_start;
        for op in &script.ops {
            match *op {
                EditOp::Sub(n) => {
                    for _ in 0..n {
                        score += self.pair(query, subject, q, s);
                        q += 1;
                        s += 1;
                    }
                }
                EditOp::Ins(n) => {
                    score -= self.gap_open + self.gap_extend * n as i32;
                    q += n as usize;
                }
                EditOp::Del(n) => {
                    score -= self.gap_open + self.gap_extend * n as i32;
                    s += n as usize;
                }
            }
        }
        if q_used != aln.q_end - aln.q_start
            || s_used != aln.s_end - aln.s_start
            || score != aln.score
        {
            return Err(EngineError::InternalConsistency(format!(
                "edit script scores {score}, alignment claims {}",
                aln.score
            )));
        }
        Ok(())
    }
}

impl GappedAligner for DpAligner<'_> {
    fn score_only(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment> {
        self.extend(query, subject, q_off, s_off, false)
    }

    fn with_traceback(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment> {
        self.extend(query, subject, q_off, s_off, true)
    }
}

/// Greedy difference-counting aligner for uniform nucleotide scoring.
///
/// Along any path with `d` differences ending at `(i, j)`, the doubled
/// score is `reward * (i + j) - 2 * (reward - penalty) * d`, so maximizing
/// score reduces to furthest-reaching points per difference count. The
/// implied cost of a one-base gap is `reward / 2 - penalty`, which is why
/// an even reward is required.
pub struct GreedyAligner {
    pub reward: i32,
    /// Negative.
    pub penalty: i32,
    pub x_dropoff: i32,
}

struct GreedyRow {
    lower: i32,
    /// Furthest-reaching `i` per diagonal `k = i - j`, `NEG_INF` if dead.
    reach: Vec<i32>,
}

impl GreedyRow {
    fn get(&self, k: i32) -> i32 {
        let idx = k - self.lower;
        if idx < 0 || idx as usize >= self.reach.len() {
            NEG_INF
        } else {
            self.reach[idx as usize]
        }
    }
}

impl GreedyAligner {
    pub fn new(reward: i32, penalty: i32, x_dropoff: i32) -> EngineResult<Self> {
        if reward <= 0 || reward % 2 != 0 || penalty >= 0 {
            return Err(EngineError::Configuration(format!(
                "greedy extension needs an even positive reward and negative \
                 penalty, got {reward}/{penalty}"
            )));
        }
        Ok(Self { reward, penalty, x_dropoff })
    }

    #[inline]
    fn score2(&self, i: i32, k: i32, d: i32) -> i32 {
        // j = i - k
        self.reward * (2 * i - k) - 2 * (self.reward - self.penalty) * d
    }

    /// One direction; returns rows for traceback plus the best endpoint.
    fn run_dir(
        &self,
        a: &[u8],
        b: &[u8],
        keep_rows: bool,
    ) -> (Vec<GreedyRow>, i32, i32, i32, i32) {
        let a_len = a.len() as i32;
        let b_len = b.len() as i32;
        let snake = |mut i: i32, k: i32| -> i32 {
            while i < a_len && i - k < b_len {
                let (x, y) = (a[i as usize], b[(i - k) as usize]);
                if x > 3 || y > 3 || x != y {
                    break;
                }
                i += 1;
            }
            i
        };

        let mut rows: Vec<GreedyRow> = Vec::new();
        let i0 = snake(0, 0);
        let mut best2 = self.score2(i0, 0, 0);
        let (mut best_d, mut best_k, mut best_i) = (0i32, 0i32, i0);
        let mut cur = GreedyRow { lower: 0, reach: vec![i0] };

        let mut d = 0i32;
        loop {
            let lower = cur.lower - 1;
            let upper = cur.lower + cur.reach.len() as i32;
            let mut next = GreedyRow {
                lower,
                reach: Vec::with_capacity((upper - lower + 1) as usize),
            };
            let mut alive = false;
            for k in lower..=upper {
                // Predecessors: same k is a mismatch, k-1 consumed a only,
                // k+1 consumed b only. A candidate past either sequence
                // end cannot be stepped onto.
                let mut i = NEG_INF;
                for cand in [
                    cur.get(k).saturating_add(1),
                    cur.get(k - 1).saturating_add(1),
                    cur.get(k + 1),
                ] {
                    if cand >= 0 && cand <= a_len && cand - k >= 0 && cand - k <= b_len {
                        i = i.max(cand);
                    }
                }
                if i == NEG_INF {
                    next.reach.push(NEG_INF);
                    continue;
                }
                let i = snake(i, k);
                let s2 = self.score2(i, k, d + 1);
                if s2 < best2 - 2 * self.x_dropoff {
                    next.reach.push(NEG_INF);
                    continue;
                }
                alive = true;
                next.reach.push(i);
                if s2 > best2 {
                    best2 = s2;
                    best_d = d + 1;
                    best_k = k;
                    best_i = i;
                }
            }
            if keep_rows {
                rows.push(std::mem::replace(&mut cur, GreedyRow { lower: 0, reach: Vec::new() }));
                cur = next;
            } else {
                cur = next;
            }
            d += 1;
            if !alive {
                break;
            }
        }
        if keep_rows {
            rows.push(cur);
        }
        (rows, best2, best_d, best_k, best_i)
    }

    fn traceback_dir(
        &self,
        rows: &[GreedyRow],
        a_len: i32,
        b_len: i32,
        d: i32,
        k: i32,
        i: i32,
    ) -> GapEditScript {
        let live = |cand: i32, kk: i32| cand >= 0 && cand <= a_len && cand - kk <= b_len;
        let mut script = GapEditScript::default();
        let (mut d, mut k, mut i) = (d, k, i);
        while d > 0 {
            let prev = &rows[(d - 1) as usize];
            let mut entry = NEG_INF;
            for cand in [
                prev.get(k).saturating_add(1),
                prev.get(k - 1).saturating_add(1),
                prev.get(k + 1),
            ] {
                if live(cand, k) {
                    entry = entry.max(cand);
                }
            }
            // Matches after the difference step.
            if i > entry {
                script.push(EditOp::Sub((i - entry) as u32));
            }
            if entry == prev.get(k).saturating_add(1) {
                script.push(EditOp::Sub(1));
                i = entry - 1;
            } else if entry == prev.get(k - 1).saturating_add(1) {
                script.push(EditOp::Ins(1));
                i = entry - 1;
                k -= 1;
            } else {
                script.push(EditOp::Del(1));
                i = entry;
                k += 1;
            }
            d -= 1;
        }
        if i > 0 {
            script.push(EditOp::Sub(i as u32));
        }
        script.reverse();
        script
    }

    fn extend(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
        traceback: bool,
    ) -> EngineResult<GappedAlignment> {
        let left_a: Vec<u8> = query[..q_off].iter().rev().copied().collect();
        let left_b: Vec<u8> = subject[..s_off].iter().rev().copied().collect();
        let (lrows, l2, ld, lk, li) = self.run_dir(&left_a, &left_b, traceback);
        let (rrows, r2, rd, rk, ri) =
            self.run_dir(&query[q_off..], &subject[s_off..], traceback);

        let score = (l2 + r2) / 2;
        let edit = if traceback {
            let mut l = self.traceback_dir(
                &lrows,
                left_a.len() as i32,
                left_b.len() as i32,
                ld,
                lk,
                li,
            );
            l.reverse();
            let r = self.traceback_dir(
                &rrows,
                (query.len() - q_off) as i32,
                (subject.len() - s_off) as i32,
                rd,
                rk,
                ri,
            );
            l.append(&r);
            Some(l)
        } else {
            None
        };

        Ok(GappedAlignment {
            q_start: q_off - li as usize,
            q_end: q_off + ri as usize,
            s_start: s_off - (li - lk) as usize,
            s_end: s_off + (ri - rk) as usize,
            score,
            edit,
        })
    }
}

impl GappedAligner for GreedyAligner {
    fn score_only(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment> {
        self.extend(query, subject, q_off, s_off, false)
    }

    fn with_traceback(
        &self,
        query: &[u8],
        subject: &[u8],
        q_off: usize,
        s_off: usize,
    ) -> EngineResult<GappedAlignment> {
        self.extend(query, subject, q_off, s_off, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::{encode_nucleotide, encode_protein};

    #[test]
    fn edit_script_coalesces_runs() {
        let mut s = GapEditScript::default();
        s.push(EditOp::Sub(3));
        s.push(EditOp::Sub(2));
        s.push(EditOp::Del(1));
        s.push(EditOp::Sub(1));
        assert_eq!(s.ops, vec![EditOp::Sub(5), EditOp::Del(1), EditOp::Sub(1)]);
        assert_eq!(s.consumed(), (6, 7));
    }

    #[test]
    fn dp_aligner_exact_match() {
        let sb = ScoreBlock::nucleotide(2, -3, 5, 2, 1).unwrap();
        let query = encode_nucleotide(b"ACGTACGTACGT");
        let subject = query.clone();
        let aligner = DpAligner::new(&sb, crate::core::ungapped::ProfileSide::None, 30);
        let aln = aligner.score_only(&query, &subject, 6, 6).unwrap();
        assert_eq!(aln.score, 24);
        assert_eq!((aln.q_start, aln.q_end), (0, 12));
        assert_eq!((aln.s_start, aln.s_end), (0, 12));
    }

    #[test]
    fn dp_aligner_bridges_a_gap() {
        let sb = ScoreBlock::nucleotide(2, -3, 5, 2, 1).unwrap();
        // Subject carries a one-base deletion relative to the query.
        let query = encode_nucleotide(b"ACGTACGTAACGTACGT");
        let mut subject = encode_nucleotide(b"ACGTACGT");
        subject.extend(encode_nucleotide(b"ACGTACGT"));
        let aligner = DpAligner::new(&sb, crate::core::ungapped::ProfileSide::None, 30);
        let aln = aligner.with_traceback(&query, &subject, 2, 2).unwrap();
        // 16 aligned matches at 2 each, one gap of length 1 at 5+2.
        assert_eq!(aln.score, 32 - 7);
        assert_eq!((aln.q_start, aln.q_end), (0, 17));
        assert_eq!((aln.s_start, aln.s_end), (0, 16));
        let script = aln.edit.unwrap();
        let (q_used, s_used) = script.consumed();
        assert_eq!((q_used, s_used), (17, 16));
        assert!(script.ops.contains(&EditOp::Ins(1)));
    }

    #[test]
    fn dp_traceback_matches_score_only() {
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        let query = encode_protein(b"MKVLAAGWWTRNDE");
        let subject = encode_protein(b"MKVLAGWWTRNDE");
        let aligner = DpAligner::new(&sb, crate::core::ungapped::ProfileSide::None, 38);
        let fast = aligner.score_only(&query, &subject, 7, 6).unwrap();
        let full = aligner.with_traceback(&query, &subject, 7, 6).unwrap();
        assert_eq!(fast.score, full.score);
        assert_eq!((fast.q_start, fast.q_end), (full.q_start, full.q_end));
        assert!(full.edit.is_some());
    }

    #[test]
    fn greedy_rejects_odd_reward() {
        assert!(GreedyAligner::new(1, -3, 20).is_err());
        assert!(GreedyAligner::new(2, 3, 20).is_err());
        assert!(GreedyAligner::new(2, -3, 20).is_ok());
    }

    #[test]
    fn greedy_exact_match() {
        let aligner = GreedyAligner::new(2, -3, 20).unwrap();
        let query = encode_nucleotide(b"ACGTACGTACGTACGT");
        let subject = query.clone();
        let aln = aligner.score_only(&query, &subject, 8, 8).unwrap();
        assert_eq!(aln.score, 32);
        assert_eq!((aln.q_start, aln.q_end), (0, 16));
        assert_eq!((aln.s_start, aln.s_end), (0, 16));
    }

    #[test]
    fn greedy_counts_a_mismatch() {
        let aligner = GreedyAligner::new(2, -3, 40).unwrap();
        let query = encode_nucleotide(b"ACGTACGTTACGTACGT");
        let subject = encode_nucleotide(b"ACGTACGTGACGTACGT");
        let aln = aligner.with_traceback(&query, &subject, 2, 2).unwrap();
        // 16 matches and one mismatch.
        assert_eq!(aln.score, 32 - 3);
        assert_eq!((aln.q_start, aln.q_end), (0, 17));
        let (q_used, s_used) = aln.edit.unwrap().consumed();
        assert_eq!((q_used, s_used), (17, 17));
    }
}
