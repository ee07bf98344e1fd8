//! HSP containers and the bookkeeping between extension and reporting.
//!
//! One [`HspList`] collects the alignments of a single subject sequence and
//! moves through a fixed lifecycle: accumulate raw HSPs, merge chunk
//! results, evaluate statistics, then finalize for output. Transitions out
//! of order are internal errors, never silent corruption.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_hits.c.

use std::cmp::Ordering;

use crate::core::gapped::GapEditScript;
use crate::core::score_model::ScoreBlock;
use crate::core::sequence::QueryInfo;
use crate::error::{EngineError, EngineResult};
use crate::stats::evalue_from_raw;

/// Two E-values closer than this are considered tied and break on score.
pub const EVALUE_EPSILON: f64 = 1.0e-180;

/// One high-scoring segment pair. Query coordinates are context local,
/// subject coordinates are local to the full subject sequence.
#[derive(Debug, Clone)]
pub struct Hsp {
    pub context: usize,
    pub q_start: usize,
    pub q_end: usize,
    pub s_start: usize,
    pub s_end: usize,
    /// Subject frame for translated-subject searches, 0 otherwise.
    pub s_frame: i8,
    pub score: i32,
    pub evalue: f64,
    /// Number of linked segments this HSP's E-value covers.
    pub num: i32,
    pub edit: Option<GapEditScript>,
}

impl Hsp {
    pub fn new(
        context: usize,
        q_start: usize,
        q_end: usize,
        s_start: usize,
        s_end: usize,
        s_frame: i8,
        score: i32,
    ) -> Self {
        Self {
            context,
            q_start,
            q_end,
            s_start,
            s_end,
            s_frame,
            score,
            evalue: f64::MAX,
            num: 1,
            edit: None,
        }
    }

    /// Whether `self` lies entirely within `other` on both sequences.
    pub fn contained_in(&self, other: &Hsp) -> bool {
        self.context == other.context
            && self.s_frame == other.s_frame
            && self.q_start >= other.q_start
            && self.q_end <= other.q_end
            && self.s_start >= other.s_start
            && self.s_end <= other.s_end
    }

    pub fn same_coordinates(&self, other: &Hsp) -> bool {
        self.context == other.context
            && self.s_frame == other.s_frame
            && self.q_start == other.q_start
            && self.q_end == other.q_end
            && self.s_start == other.s_start
            && self.s_end == other.s_end
    }
}

/// Score-major ordering used before purging and linking: higher scores
/// first, ties broken on coordinates so equal inputs sort stably.
pub fn score_compare(a: &Hsp, b: &Hsp) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(a.context.cmp(&b.context))
        .then(a.s_start.cmp(&b.s_start))
        .then(b.s_end.cmp(&a.s_end))
        .then(a.q_start.cmp(&b.q_start))
        .then(b.q_end.cmp(&a.q_end))
}

/// E-value ordering for output. E-values within [`EVALUE_EPSILON`] are
/// tied, falling through to the score ordering.
pub fn evalue_compare(a: &Hsp, b: &Hsp) -> Ordering {
    if (a.evalue - b.evalue).abs() > EVALUE_EPSILON {
        return a.evalue.partial_cmp(&b.evalue).unwrap_or(Ordering::Equal);
    }
    score_compare(a, b)
}

/// Lifecycle of a subject's HSP list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HspListState {
    Accumulating,
    Merged,
    Evaluated,
    Final,
}

/// All HSPs of one subject sequence.
#[derive(Debug, Clone)]
pub struct HspList {
    pub oid: usize,
    pub hsps: Vec<Hsp>,
    pub best_evalue: f64,
    state: HspListState,
}

impl HspList {
    pub fn new(oid: usize) -> Self {
        Self { oid, hsps: Vec::new(), best_evalue: f64::MAX, state: HspListState::Accumulating }
    }

    pub fn state(&self) -> HspListState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.hsps.is_empty()
    }

    fn expect_state(&self, wanted: HspListState) -> EngineResult<()> {
        if self.state != wanted {
            return Err(EngineError::InternalConsistency(format!(
                "HSP list for subject {} is {:?}, expected {:?}",
                self.oid, self.state, wanted
            )));
        }
        Ok(())
    }

    pub fn push(&mut self, hsp: Hsp) {
        self.hsps.push(hsp);
    }

    /// Shift subject coordinates of every HSP by a chunk's start offset.
    pub fn rebase_subject(&mut self, offset: usize) {
        for hsp in &mut self.hsps {
            hsp.s_start += offset;
            hsp.s_end += offset;
        }
    }

    /// Fold another chunk's list for the same subject into this one.
    /// Alignments found twice inside the chunk overlap collapse to one.
    pub fn merge_chunk(&mut self, mut other: HspList) -> EngineResult<()> {
        self.expect_state(HspListState::Accumulating)?;
        other.expect_state(HspListState::Accumulating)?;
        if other.oid != self.oid {
            return Err(EngineError::InternalConsistency(format!(
                "merging subject {} into subject {}",
                other.oid, self.oid
            )));
        }
        self.hsps.append(&mut other.hsps);
        Ok(())
    }

    pub fn finish_accumulating(&mut self) -> EngineResult<()> {
        self.expect_state(HspListState::Accumulating)?;
        self.purge_contained();
        self.state = HspListState::Merged;
        Ok(())
    }

    /// Drop HSPs whose extent is contained in a better-or-equal scoring
    /// HSP on the same context and frame. Exact duplicates from chunk
    /// overlaps collapse here as well.
    fn purge_contained(&mut self) {
        self.hsps.sort_by(score_compare);
        let mut kept: Vec<Hsp> = Vec::with_capacity(self.hsps.len());
        for hsp in self.hsps.drain(..) {
            let redundant = kept
                .iter()
                .any(|k| hsp.same_coordinates(k) || (hsp.contained_in(k) && hsp.score <= k.score));
            if !redundant {
                kept.push(hsp);
            }
        }
        self.hsps = kept;
    }

    /// Assign independent E-values from each context's Karlin block and
    /// effective search space.
    pub fn evaluate(&mut self, sb: &ScoreBlock, query_info: &QueryInfo, gapped: bool) -> EngineResult<()> {
        self.expect_state(HspListState::Merged)?;
        for hsp in &mut self.hsps {
            let kbp = sb.kbp(hsp.context, gapped).ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "HSP in context {} without statistics",
                    hsp.context
                ))
            })?;
            let searchsp = query_info.contexts[hsp.context].eff_searchsp;
            hsp.evalue = evalue_from_raw(hsp.score, kbp, searchsp as f64);
        }
        self.state = HspListState::Evaluated;
        Ok(())
    }

    /// Mark linked E-values as assigned externally.
    pub fn mark_evaluated(&mut self) -> EngineResult<()> {
        self.expect_state(HspListState::Merged)?;
        self.state = HspListState::Evaluated;
        Ok(())
    }

    /// Drop HSPs above the expect threshold, apply query-coverage culling
    /// and order the survivors for output.
    pub fn finalize(&mut self, expect_value: f64, culling_limit: i32) -> EngineResult<()> {
        self.expect_state(HspListState::Evaluated)?;
        self.hsps.retain(|h| h.evalue <= expect_value);
        if culling_limit > 0 {
            self.cull(culling_limit);
        }
        self.hsps.sort_by(evalue_compare);
        self.best_evalue = self.hsps.first().map(|h| h.evalue).unwrap_or(f64::MAX);
        self.state = HspListState::Final;
        Ok(())
    }

    /// Remove an HSP once `culling_limit` better-scoring HSPs envelop its
    /// query range.
    fn cull(&mut self, culling_limit: i32) {
        self.hsps.sort_by(score_compare);
        let mut kept: Vec<Hsp> = Vec::with_capacity(self.hsps.len());
        for hsp in self.hsps.drain(..) {
            let dominating = kept
                .iter()
                .filter(|k| {
                    k.context == hsp.context
                        && k.q_start <= hsp.q_start
                        && k.q_end >= hsp.q_end
                })
                .count();
            if (dominating as i32) < culling_limit {
                kept.push(hsp);
            }
        }
        self.hsps = kept;
    }
}

/// Final per-search results: one list per subject with hits, ordered by
/// best E-value.
#[derive(Debug, Default)]
pub struct HspResults {
    pub lists: Vec<HspList>,
}

impl HspResults {
    pub fn push(&mut self, list: HspList) {
        if !list.is_empty() {
            self.lists.push(list);
        }
    }

    pub fn sort(&mut self) {
        self.lists.sort_by(|a, b| {
            a.best_evalue
                .partial_cmp(&b.best_evalue)
                .unwrap_or(Ordering::Equal)
                .then(a.oid.cmp(&b.oid))
        });
    }

    pub fn total_hsps(&self) -> usize {
        self.lists.iter().map(|l| l.hsps.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hsp(q: (usize, usize), s: (usize, usize), score: i32) -> Hsp {
        Hsp::new(0, q.0, q.1, s.0, s.1, 0, score)
    }

    #[test]
    fn score_ordering_breaks_ties_on_coordinates() {
        let a = hsp((0, 10), (5, 15), 30);
        let b = hsp((0, 10), (7, 17), 30);
        let c = hsp((0, 10), (5, 15), 40);
        assert_eq!(score_compare(&c, &a), Ordering::Less);
        assert_eq!(score_compare(&a, &b), Ordering::Less);
        // Longer subject extent wins at equal start.
        let d = hsp((0, 10), (5, 12), 30);
        assert_eq!(score_compare(&a, &d), Ordering::Less);
    }

    #[test]
    fn evalue_ordering_treats_tiny_values_as_tied() {
        let mut a = hsp((0, 10), (0, 10), 50);
        let mut b = hsp((0, 10), (20, 30), 60);
        a.evalue = 1.0e-200;
        b.evalue = 1.0e-190;
        // Both below epsilon: the higher score sorts first.
        assert_eq!(evalue_compare(&b, &a), Ordering::Less);
        a.evalue = 1.0e-10;
        b.evalue = 1.0e-5;
        assert_eq!(evalue_compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn purge_removes_contained_and_duplicate_hsps() {
        let mut list = HspList::new(7);
        list.push(hsp((0, 32), (100, 132), 32));
        list.push(hsp((0, 28), (104, 132), 28));
        list.push(hsp((4, 32), (100, 128), 28));
        list.push(hsp((0, 32), (100, 132), 32));
        list.finish_accumulating().unwrap();
        assert_eq!(list.hsps.len(), 1);
        assert_eq!(list.hsps[0].score, 32);
    }

    #[test]
    fn purge_keeps_disjoint_hsps() {
        let mut list = HspList::new(0);
        list.push(hsp((0, 20), (0, 20), 20));
        list.push(hsp((40, 60), (200, 220), 18));
        list.finish_accumulating().unwrap();
        assert_eq!(list.hsps.len(), 2);
    }

    #[test]
    fn chunk_merge_collapses_overlap_duplicates() {
        let mut left = HspList::new(3);
        left.push(hsp((0, 40), (990, 1030), 40));
        let mut right = HspList::new(3);
        right.push(hsp((0, 40), (40, 80), 40));
        right.rebase_subject(950);
        left.merge_chunk(right).unwrap();
        left.finish_accumulating().unwrap();
        assert_eq!(list_coords(&left), vec![(0, 40, 990, 1030)]);
    }

    fn list_coords(list: &HspList) -> Vec<(usize, usize, usize, usize)> {
        list.hsps.iter().map(|h| (h.q_start, h.q_end, h.s_start, h.s_end)).collect()
    }

    #[test]
    fn state_machine_rejects_out_of_order_transitions() {
        let mut list = HspList::new(0);
        list.push(hsp((0, 10), (0, 10), 20));
        assert!(list.finalize(10.0, 0).is_err());
        list.finish_accumulating().unwrap();
        assert!(list.finish_accumulating().is_err());
    }

    #[test]
    fn finalize_reaps_by_expect_and_orders_by_evalue() {
        let mut list = HspList::new(0);
        let mut a = hsp((0, 10), (0, 10), 50);
        a.evalue = 1.0e-8;
        let mut b = hsp((20, 30), (40, 50), 30);
        b.evalue = 2.0;
        let mut c = hsp((50, 60), (80, 90), 10);
        c.evalue = 25.0;
        list.push(a);
        list.push(b);
        list.push(c);
        list.finish_accumulating().unwrap();
        list.mark_evaluated().unwrap();
        list.finalize(10.0, 0).unwrap();
        assert_eq!(list.hsps.len(), 2);
        assert_eq!(list.best_evalue, 1.0e-8);
        assert!(list.hsps[0].evalue < list.hsps[1].evalue);
    }

    #[test]
    fn culling_drops_enveloped_hsps_past_limit() {
        let mut list = HspList::new(0);
        let mut big = hsp((0, 100), (0, 100), 90);
        big.evalue = 1.0e-20;
        let mut mid = hsp((10, 90), (200, 280), 60);
        mid.evalue = 1.0e-10;
        let mut small = hsp((20, 50), (400, 430), 40);
        small.evalue = 1.0e-5;
        list.push(big);
        list.push(mid);
        list.push(small);
        list.finish_accumulating().unwrap();
        list.mark_evaluated().unwrap();
        list.finalize(10.0, 2).unwrap();
        // The smallest HSP is enveloped by two better ones and drops.
        assert_eq!(list.hsps.len(), 2);
        assert!(list.hsps.iter().all(|h| h.score >= 60));
    }

    #[test]
    fn results_sort_by_best_evalue_then_oid() {
        let mut r = HspResults::default();
        let mut l1 = HspList::new(5);
        l1.best_evalue = 1.0e-3;
        l1.hsps.push(hsp((0, 5), (0, 5), 10));
        let mut l2 = HspList::new(2);
        l2.best_evalue = 1.0e-9;
        l2.hsps.push(hsp((0, 5), (0, 5), 10));
        r.push(l1);
        r.push(l2);
        r.sort();
        assert_eq!(r.lists[0].oid, 2);
        assert_eq!(r.lists[1].oid, 5);
    }
}
