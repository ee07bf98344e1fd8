//! Sum-statistics linking of ungapped HSPs.
//!
//! Consistently ordered HSPs on one query strand and subject frame sign are
//! chained, and each chain's members share one sum E-value in place of
//! their independent E-values. Two gap regimes exist under the even-gap
//! rule: "small" gaps bounded by a window, and "large" gaps of any span;
//! the cheaper of the two sum E-values wins. Translated-query programs
//! with an intron allowance use the uneven rule instead, which bounds the
//! query gap by the window but lets the subject gap run to the intron
//! length.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/link_hsps.c and
//! blast_parameters.c (CalculateLinkHSPCutoffs).

use rustc_hash::FxHashMap;

use crate::core::hits::Hsp;
use crate::core::score_model::ScoreBlock;
use crate::core::sequence::QueryInfo;
use crate::error::{EngineError, EngineResult};
use crate::stats::sum_statistics::{
    defaults::{GAP_PROB_UNGAPPED, GAP_SIZE, OVERLAP_SIZE},
    gap_decay_divisor, large_gap_sum_e, small_gap_sum_e, uneven_gap_sum_e, xsum_term,
};
use crate::stats::KarlinBlock;

const CODON_LENGTH: i64 = 3;
const EPSILON: f64 = 1.0e-9;

#[inline]
fn nint(x: f64) -> i32 {
    (if x >= 0.0 { x + 0.5 } else { x - 0.5 }) as i32
}

/// Static linking options fixed at search setup.
#[derive(Debug, Clone)]
pub struct LinkHspParameters {
    pub gap_size: i32,
    pub overlap_size: i32,
    pub gap_decay_rate: f64,
    /// Lengths are rescaled to the protein frame when the subject is
    /// translated.
    pub translated_subject: bool,
    /// Maximum subject-side gap for the uneven rule; zero selects the
    /// even-gap rule.
    pub longest_intron: i32,
}

impl LinkHspParameters {
    pub fn even(gap_decay_rate: f64, translated_subject: bool) -> Self {
        Self {
            gap_size: GAP_SIZE,
            overlap_size: OVERLAP_SIZE,
            gap_decay_rate,
            translated_subject,
            longest_intron: 0,
        }
    }

    pub fn uneven(gap_decay_rate: f64, translated_subject: bool, longest_intron: i32) -> Self {
        Self { longest_intron, ..Self::even(gap_decay_rate, translated_subject) }
    }

    pub fn window(&self) -> i32 {
        self.gap_size + self.overlap_size + 1
    }

    pub fn trim(&self) -> i32 {
        (self.overlap_size + 1) / 2
    }
}

/// Per-subject score cutoffs for the two even-gap regimes.
#[derive(Debug, Clone, Copy)]
pub struct LinkCutoffs {
    pub cutoff_small_gap: i32,
    pub cutoff_big_gap: i32,
    pub gap_prob: f64,
    /// Set when the search space is too small for the small-gap rule.
    pub ignore_small_gaps: bool,
}

/// Derive the linking score cutoffs for one subject.
///
/// The expected ungapped HSP length is subtracted from both sequence
/// lengths, the E-value scale `y` depends on whether a whole database or
/// a lone subject is searched, and the small-gap rule only engages when
/// the remaining search space dwarfs the linking window.
pub fn calculate_link_cutoffs(
    params: &LinkHspParameters,
    kbp: &KarlinBlock,
    avg_query_length: i32,
    subject_length: i64,
    db_length: i64,
    cutoff_score_min: i32,
    scale_factor: f64,
) -> LinkCutoffs {
    let window = params.window();
    let gap_prob = GAP_PROB_UNGAPPED;

    let mut query_length = avg_query_length;
    let mut subject_length = subject_length;
    let mut db_length = db_length;
    if params.translated_subject {
        subject_length /= CODON_LENGTH;
        db_length /= CODON_LENGTH;
    }
    let mut subject_length = subject_length.max(1) as i32;

    let expected_length =
        nint((kbp.k * query_length as f64 * subject_length as f64).ln() / kbp.h);
    query_length = (query_length - expected_length).max(1);
    subject_length = (subject_length - expected_length).max(1);

    let y = if db_length > subject_length as i64 {
        (db_length as f64 / subject_length as f64).ln() * kbp.k / params.gap_decay_rate
    } else {
        ((subject_length + expected_length) as f64 / subject_length as f64).ln() * kbp.k
            / params.gap_decay_rate
    };

    let search_sp = query_length as i64 * subject_length as i64;
    let mut x = 0.25 * y * search_sp as f64;
    let window_sq = (window * window) as i64;
    let scale = scale_factor as i32;

    if search_sp > 8 * window_sq {
        x /= 1.0 - gap_prob + EPSILON;
        let cutoff_big_gap = (x.ln() / kbp.lambda).floor() as i32 + 1;
        let x_small = y * window_sq as f64 / (gap_prob + EPSILON);
        let cutoff_small_gap =
            cutoff_score_min.max((x_small.ln() / kbp.lambda).floor() as i32 + 1);
        LinkCutoffs {
            cutoff_small_gap: cutoff_small_gap * scale,
            cutoff_big_gap: cutoff_big_gap * scale,
            gap_prob,
            ignore_small_gaps: false,
        }
    } else {
        let cutoff_big_gap = (x.ln() / kbp.lambda).floor() as i32 + 1;
        LinkCutoffs {
            cutoff_small_gap: 0,
            cutoff_big_gap: cutoff_big_gap * scale,
            gap_prob: 0.0,
            ignore_small_gaps: true,
        }
    }
}

/// Trimmed HSP extent plus the per-HSP statistics inputs.
struct LinkEntry {
    hsp: usize,
    q_off: i32,
    q_end: i32,
    s_off: i32,
    s_end: i32,
    score: i32,
    xscore: f64,
}

/// Link the HSPs of one subject and assign chain E-values in place.
///
/// `length_adjustment` is the search's expected-HSP-length correction and
/// `subject_length` the full subject length; both shrink the pairwise
/// space the sum statistics integrate over.
pub fn link_hsps(
    hsps: &mut [Hsp],
    sb: &ScoreBlock,
    query_info: &QueryInfo,
    params: &LinkHspParameters,
    cutoffs: &LinkCutoffs,
    subject_length: usize,
    length_adjustment: i64,
) -> EngineResult<()> {
    if hsps.is_empty() {
        return Ok(());
    }

    // HSPs chain only within one query strand and subject frame sign.
    let mut groups: FxHashMap<(i8, i8), Vec<usize>> = FxHashMap::default();
    for (idx, hsp) in hsps.iter().enumerate() {
        let q_strand = query_info.contexts[hsp.context].frame.signum().max(0);
        groups.entry((q_strand, hsp.s_frame.signum())).or_default().push(idx);
    }

    let mut subject_len = subject_length as i64;
    let mut length_adj = length_adjustment;
    if params.translated_subject {
        subject_len /= CODON_LENGTH;
        length_adj /= CODON_LENGTH;
    }
    let eff_subject_len = (subject_len - length_adj).max(1) as i32;

    let mut keys: Vec<(i8, i8)> = groups.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        let members = &groups[&key];
        let context = hsps[members[0]].context;
        let ctx_info = &query_info.contexts[context];
        let eff_query_len = (ctx_info.query_length as i64 - length_adjustment).max(1) as i32;
        let searchsp = ctx_info.eff_searchsp;

        let trim = params.trim();
        let mut entries: Vec<LinkEntry> = Vec::with_capacity(members.len());
        for &idx in members {
            let hsp = &hsps[idx];
            let kbp = sb.kbp(hsp.context, false).ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "linking HSP in context {} without statistics",
                    hsp.context
                ))
            })?;
            let q_trim = trim.min((hsp.q_end - hsp.q_start) as i32 / 4);
            let s_trim = trim.min((hsp.s_end - hsp.s_start) as i32 / 4);
            entries.push(LinkEntry {
                hsp: idx,
                q_off: hsp.q_start as i32 + q_trim,
                q_end: hsp.q_end as i32 - q_trim,
                s_off: hsp.s_start as i32 + s_trim,
                s_end: hsp.s_end as i32 - s_trim,
                score: hsp.score,
                xscore: xsum_term(hsp.score, kbp.lambda, kbp.log_k),
            });
        }
        entries.sort_unstable_by_key(|e| (e.q_off, e.s_off));

        // Peel off the best-sum chain each pass until none remain.
        let mut active: Vec<usize> = (0..entries.len()).collect();
        while !active.is_empty() {
            let (chain, evalue) = if params.longest_intron > 0 {
                best_uneven_chain(
                    &entries,
                    &active,
                    params,
                    cutoffs,
                    eff_query_len,
                    eff_subject_len,
                    searchsp,
                )
            } else {
                best_even_chain(
                    &entries,
                    &active,
                    params,
                    cutoffs,
                    eff_query_len,
                    eff_subject_len,
                    searchsp,
                )
            };
            let num = chain.len() as i32;
            for &e_idx in &chain {
                let hsp = &mut hsps[entries[e_idx].hsp];
                hsp.evalue = evalue;
                hsp.num = num;
            }
            active.retain(|i| !chain.contains(i));
        }
    }
    Ok(())
}

/// Chain DP under one predecessor rule over the active subset; returns
/// per-position best normalized sums, raw-score sums, and back links.
fn chain_dp(
    entries: &[LinkEntry],
    active: &[usize],
    cutoff: i32,
    admit: impl Fn(&LinkEntry, &LinkEntry) -> bool,
) -> (Vec<i32>, Vec<f64>, Vec<Option<usize>>) {
    let n = active.len();
    let mut sum = vec![0i32; n];
    let mut xsum = vec![0.0f64; n];
    let mut link = vec![None; n];
    for i in 0..n {
        let e = &entries[active[i]];
        let mut best_prev: Option<usize> = None;
        if e.score > cutoff {
            for j in 0..i {
                let p = &entries[active[j]];
                if entries[active[j]].score > cutoff
                    && admit(p, e)
                    && best_prev.map_or(sum[j] > 0, |b| sum[j] > sum[b])
                {
                    best_prev = Some(j);
                }
            }
        }
        let (base_sum, base_xsum) = match best_prev {
            Some(j) => (sum[j], xsum[j]),
            None => (0, 0.0),
        };
        sum[i] = base_sum + (e.score - cutoff);
        xsum[i] = base_xsum + e.xscore;
        link[i] = best_prev;
    }
    (sum, xsum, link)
}

/// Walk the back links from `at`, translating active positions back to
/// entry indices.
fn collect_chain(link: &[Option<usize>], active: &[usize], mut at: usize) -> Vec<usize> {
    let mut chain = vec![active[at]];
    while let Some(prev) = link[at] {
        chain.push(active[prev]);
        at = prev;
    }
    chain
}

/// Even-gap selection: run both regimes, convert each best chain to a sum
/// E-value and keep the better.
fn best_even_chain(
    entries: &[LinkEntry],
    active: &[usize],
    params: &LinkHspParameters,
    cutoffs: &LinkCutoffs,
    eff_query_len: i32,
    eff_subject_len: i32,
    searchsp: i64,
) -> (Vec<usize>, f64) {
    let window = params.window();
    let int4_max = i32::MAX as f64;

    let small = if cutoffs.ignore_small_gaps {
        None
    } else {
        let (sum, xsum, link) = chain_dp(entries, active, cutoffs.cutoff_small_gap, |p, e| {
            e.q_off > p.q_end
                && e.s_off > p.s_end
                && e.q_off <= p.q_end + window
                && e.s_off <= p.s_end + window
        });
        (0..active.len()).max_by_key(|&i| sum[i]).map(|i| {
            let chain = collect_chain(&link, active, i);
            let num = chain.len();
            let divisor = gap_decay_divisor(params.gap_decay_rate, num);
            let mut e = small_gap_sum_e(
                window,
                num as i16,
                xsum[i],
                eff_query_len,
                eff_subject_len,
                searchsp,
                divisor,
            );
            if num > 1 {
                if cutoffs.gap_prob == 0.0 || e / cutoffs.gap_prob > int4_max {
                    e = int4_max;
                } else {
                    e /= cutoffs.gap_prob;
                }
            }
            (chain, e)
        })
    };

    let (sum, xsum, link) = chain_dp(entries, active, cutoffs.cutoff_big_gap, |p, e| {
        e.q_off > p.q_end && e.s_off > p.s_end
    });
    let large = (0..active.len()).max_by_key(|&i| sum[i]).map(|i| {
        let chain = collect_chain(&link, active, i);
        let num = chain.len();
        let divisor = gap_decay_divisor(params.gap_decay_rate, num);
        let mut e = large_gap_sum_e(
            num as i16,
            xsum[i],
            eff_query_len,
            eff_subject_len,
            searchsp,
            divisor,
        );
        if num > 1 {
            let denom = 1.0 - cutoffs.gap_prob;
            if denom <= 0.0 || e / denom > int4_max {
                e = int4_max;
            } else {
                e /= denom;
            }
        }
        (chain, e)
    });

    match (small, large) {
        (Some((sc, se)), Some((lc, le))) => {
            if se <= le {
                (sc, se)
            } else {
                (lc, le)
            }
        }
        (Some(best), None) | (None, Some(best)) => best,
        (None, None) => (vec![active[active.len() - 1]], f64::MAX),
    }
}

/// Uneven-gap selection for translated subjects: the query gap is bounded
/// by the window, the subject gap by the intron allowance.
fn best_uneven_chain(
    entries: &[LinkEntry],
    active: &[usize],
    params: &LinkHspParameters,
    cutoffs: &LinkCutoffs,
    eff_query_len: i32,
    eff_subject_len: i32,
    searchsp: i64,
) -> (Vec<usize>, f64) {
    let window = params.window();
    let intron = params.longest_intron;
    let (sum, xsum, link) = chain_dp(entries, active, cutoffs.cutoff_big_gap, |p, e| {
        e.q_off > p.q_end
            && e.s_off > p.s_end
            && e.q_off <= p.q_end + window
            && e.s_off <= p.s_end + intron
    });
    (0..active.len())
        .max_by_key(|&i| sum[i])
        .map(|i| {
            let chain = collect_chain(&link, active, i);
            let num = chain.len();
            let divisor = gap_decay_divisor(params.gap_decay_rate, num);
            let e = uneven_gap_sum_e(
                window,
                intron,
                num as i16,
                xsum[i],
                eff_query_len,
                eff_subject_len,
                searchsp,
                divisor,
            );
            (chain, e)
        })
        .unwrap_or((vec![active[0]], f64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sequence::concat_query_contexts;
    use crate::stats::tables::blosum62_ungapped_params;

    #[test]
    fn cutoffs_use_small_gap_rule_for_large_search_spaces() {
        let params = LinkHspParameters::even(0.5, false);
        let kbp = blosum62_ungapped_params();
        let c = calculate_link_cutoffs(&params, &kbp, 300, 1_000_000, 50_000_000, 16, 1.0);
        assert!(!c.ignore_small_gaps);
        assert!(c.cutoff_small_gap >= 16);
        assert!(c.cutoff_big_gap > 0);
        assert_eq!(c.gap_prob, GAP_PROB_UNGAPPED);
    }

    #[test]
    fn cutoffs_disable_small_gap_rule_for_tiny_search_spaces() {
        let params = LinkHspParameters::even(0.5, false);
        let kbp = blosum62_ungapped_params();
        // window = 50, so the space must beat 8 * 50^2 = 20000.
        let c = calculate_link_cutoffs(&params, &kbp, 60, 120, 0, 16, 1.0);
        assert!(c.ignore_small_gaps);
        assert_eq!(c.cutoff_small_gap, 0);
        assert_eq!(c.gap_prob, 0.0);
    }

    #[test]
    fn cutoffs_scale_subject_for_translated_searches() {
        let even = LinkHspParameters::even(0.5, false);
        let transl = LinkHspParameters::even(0.5, true);
        let kbp = blosum62_ungapped_params();
        let plain = calculate_link_cutoffs(&even, &kbp, 200, 300_000, 0, 16, 1.0);
        let scaled = calculate_link_cutoffs(&transl, &kbp, 200, 300_000, 0, 16, 1.0);
        // A third of the subject length shrinks the search space.
        assert!(scaled.cutoff_big_gap < plain.cutoff_big_gap);
    }

    fn linked_fixture() -> (ScoreBlock, QueryInfo) {
        let residues = vec![1u8; 300];
        let (_, mut info) = concat_query_contexts(&[(residues, 0)]).unwrap();
        info.contexts[0].eff_searchsp = 4_000_000;
        let sb = ScoreBlock::blosum62(11, 1, 1).unwrap();
        (sb, info)
    }

    fn linkable_cutoffs(sb: &ScoreBlock, params: &LinkHspParameters) -> LinkCutoffs {
        let kbp = sb.kbp(0, false).unwrap();
        calculate_link_cutoffs(params, kbp, 300, 10_000, 0, 16, 1.0)
    }

    #[test]
    fn consistent_hsps_link_into_one_chain() {
        let (sb, info) = linked_fixture();
        let mut hsps = vec![
            Hsp::new(0, 10, 60, 100, 150, 0, 45),
            Hsp::new(0, 70, 120, 160, 210, 0, 43),
        ];
        let params = LinkHspParameters::even(0.5, false);
        let cutoffs = linkable_cutoffs(&sb, &params);
        link_hsps(&mut hsps, &sb, &info, &params, &cutoffs, 10_000, 20).unwrap();
        assert_eq!(hsps[0].num, 2);
        assert_eq!(hsps[1].num, 2);
        assert_eq!(hsps[0].evalue, hsps[1].evalue);
        assert!(hsps[0].evalue.is_finite());
    }

    #[test]
    fn inconsistent_hsps_stay_unlinked() {
        let (sb, info) = linked_fixture();
        // Crossed on the subject: no consistent chain exists.
        let mut hsps = vec![
            Hsp::new(0, 10, 60, 500, 550, 0, 45),
            Hsp::new(0, 70, 120, 100, 150, 0, 43),
        ];
        let params = LinkHspParameters::even(0.5, false);
        let cutoffs = linkable_cutoffs(&sb, &params);
        link_hsps(&mut hsps, &sb, &info, &params, &cutoffs, 10_000, 20).unwrap();
        assert_eq!(hsps[0].num, 1);
        assert_eq!(hsps[1].num, 1);
    }

    #[test]
    fn linked_chain_improves_on_single_evalue() {
        let (sb, info) = linked_fixture();
        let mut hsps = vec![
            Hsp::new(0, 10, 60, 100, 150, 0, 40),
            Hsp::new(0, 70, 120, 160, 210, 0, 40),
        ];
        let params = LinkHspParameters::even(0.5, false);
        let cutoffs = linkable_cutoffs(&sb, &params);
        let kbp = sb.kbp(0, false).unwrap();

        let single = small_gap_sum_e(
            params.window(),
            1,
            xsum_term(40, kbp.lambda, kbp.log_k),
            280,
            9980,
            4_000_000,
            gap_decay_divisor(0.5, 1),
        );
        link_hsps(&mut hsps, &sb, &info, &params, &cutoffs, 10_000, 20).unwrap();
        assert_eq!(hsps[0].num, 2);
        assert!(hsps[0].evalue < single);
    }

    #[test]
    fn uneven_rule_allows_long_subject_gaps() {
        let (sb, info) = linked_fixture();
        // A 3000-base subject gap exceeds the even window but not the
        // intron allowance.
        let mut hsps = vec![
            Hsp::new(0, 10, 60, 100, 150, 0, 45),
            Hsp::new(0, 70, 120, 3200, 3250, 0, 43),
        ];
        let params = LinkHspParameters::uneven(0.5, false, 4000);
        let cutoffs = linkable_cutoffs(&sb, &params);
        link_hsps(&mut hsps, &sb, &info, &params, &cutoffs, 10_000, 20).unwrap();
        assert_eq!(hsps[0].num, 2);
        assert_eq!(hsps[0].evalue, hsps[1].evalue);
    }

    #[test]
    fn strand_groups_do_not_cross_link() {
        let (sb, info) = linked_fixture();
        // Same query strand but opposite subject frame signs.
        let mut hsps = vec![
            Hsp::new(0, 10, 60, 100, 150, 1, 45),
            Hsp::new(0, 70, 120, 160, 210, -1, 43),
        ];
        let params = LinkHspParameters::even(0.5, false);
        let cutoffs = linkable_cutoffs(&sb, &params);
        link_hsps(&mut hsps, &sb, &info, &params, &cutoffs, 10_000, 20).unwrap();
        assert_eq!(hsps[0].num, 1);
        assert_eq!(hsps[1].num, 1);
    }
}
