//! Search orchestration: the per-subject loop.
//!
//! A [`SearchEngine`] is set up once per query set (lookup table, derived
//! parameters, aligner choice) and then driven over a [`SequenceSource`].
//! Subjects are scanned in parallel with one scratch state per worker;
//! per-subject results are merged behind a mutex and sorted at the end.
//! Translated subjects are scanned one frame buffer at a time, long
//! subjects in overlapping chunks whose coordinates are re-based before
//! the chunk lists merge.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_engine.c

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::core::encoding::{translate_frame, GeneticCode};
use crate::core::gapped::{DpAligner, GappedAligner, GreedyAligner};
use crate::core::hits::{evalue_compare, Hsp, HspList, HspResults};
use crate::core::link_hsps::{calculate_link_cutoffs, link_hsps, LinkHspParameters};
use crate::core::lookup::{
    AaLookupTable, DiscontigLookupTable, NaLookupTable, PhiPattern, RpsLookupTable, Template,
};
use crate::core::parameters::{
    EffectiveLengthsOptions, ExtensionOptions, ExtensionParameters, HitSavingOptions,
    HitSavingParameters, InitialWordOptions, InitialWordParameters, LookupTableOptions,
    SubjectCutoffs, DBSEQ_CHUNK_OVERLAP, MAX_DBSEQ_LEN,
};
use crate::core::score_model::{ScoreBlock, ScoringSystem};
use crate::core::sequence::{QueryInfo, SequenceBlock, SubjectView};
use crate::core::ungapped::{ProfileSide, UngappedExtender, UngappedHsp};
use crate::core::word_finder::{
    DiscontigWordFinder, ExactWordFinder, PhiWordFinder, RpsWordFinder, ScanState,
    TwoHitWordFinder, WordFinder,
};
use crate::error::{EngineError, EngineResult};
use crate::source::{BlastProgram, SequenceSource};
use crate::stats::karlin::evalue_from_raw;
use crate::stats::sum_statistics::defaults as link_defaults;
use crate::stats::{effective_lengths, KarlinBlock};

/// Translation frames of a nucleotide sequence, in processing order:
/// plus strand before minus, offsets ascending within a strand.
const SUBJECT_FRAMES: [i8; 6] = [1, 2, 3, -1, -2, -3];
const NUM_FRAMES: i64 = 6;

/// Option bundle consumed by [`SearchEngine::new`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub lookup: LookupTableOptions,
    pub word: InitialWordOptions,
    pub extension: ExtensionOptions,
    pub hit_saving: HitSavingOptions,
    pub eff_lengths: EffectiveLengthsOptions,
}

/// Seeding strategy, fixed when the engine is built.
pub enum Seeding {
    /// Contiguous nucleotide words.
    Exact,
    /// Protein neighborhood words with the two-hit window rule.
    TwoHit,
    /// Discontiguous nucleotide template words.
    Discontiguous(Template),
    /// PROSITE pattern occurrences on both sequences.
    Pattern(PhiPattern),
    /// Profile-column words; the score block must carry the profile.
    Profile,
}

/// Gapped-extension algorithm, fixed when the engine is built.
#[derive(Debug, Clone, Copy)]
enum AlignerKind {
    DynamicProgramming,
    Greedy { reward: i32, penalty: i32 },
}

/// Per-search derived values shared by all workers.
struct SearchSetup {
    query_info: QueryInfo,
    hit_params: HitSavingParameters,
    link_params: Option<LinkHspParameters>,
    length_adjustment: i64,
    db_length: i64,
    avg_query_length: i32,
}

/// Counters and outcome of one search.
#[derive(Debug)]
pub struct SearchOutcome {
    pub results: HspResults,
    pub subjects_searched: usize,
    pub subjects_skipped: usize,
    /// Raw word hits examined before diagonal filtering.
    pub raw_word_hits: u64,
    pub cancelled: bool,
}

pub struct SearchEngine {
    program: BlastProgram,
    query: SequenceBlock,
    query_info: QueryInfo,
    sb: ScoreBlock,
    finder: Box<dyn WordFinder>,
    aligner: AlignerKind,
    word_params: InitialWordParameters,
    ext_params: ExtensionParameters,
    options: SearchOptions,
    gapped: bool,
    genetic_code: GeneticCode,
    cancel: Arc<AtomicBool>,
}

impl SearchEngine {
    /// Validate options, build the lookup table and derive the shared
    /// parameters. For profile programs the query block spans the
    /// concatenated profile database (one context per profile, sentinel
    /// columns between them) and subjects are the real query sequences.
    pub fn new(
        program: BlastProgram,
        query: SequenceBlock,
        query_info: QueryInfo,
        sb: ScoreBlock,
        seeding: Seeding,
        options: SearchOptions,
        genetic_code: GeneticCode,
    ) -> EngineResult<Self> {
        options.lookup.validate()?;
        options.eff_lengths.validate()?;

        let finder: Box<dyn WordFinder> = match seeding {
            Seeding::Exact => Box::new(ExactWordFinder {
                lut: NaLookupTable::build(&query.data, options.lookup.word_size)?,
            }),
            Seeding::TwoHit => Box::new(TwoHitWordFinder {
                lut: AaLookupTable::build(
                    &query.data,
                    options.lookup.word_size,
                    options.lookup.threshold,
                    &sb,
                )?,
                window: options.word.window_size,
            }),
            Seeding::Discontiguous(template) => Box::new(DiscontigWordFinder {
                lut: DiscontigLookupTable::build(&query.data, template),
            }),
            Seeding::Pattern(pattern) => Box::new(PhiWordFinder::new(pattern, &query.data)),
            Seeding::Profile => {
                if !program.is_rps() {
                    return Err(EngineError::Configuration(
                        "profile seeding requires an RPS program".into(),
                    ));
                }
                Box::new(RpsWordFinder {
                    lut: RpsLookupTable::build(&sb, query.len(), options.lookup.threshold)?,
                })
            }
        };

        let aligner = match &sb.scoring {
            ScoringSystem::NucleotideMatch { reward, penalty } if options.extension.greedy => {
                AlignerKind::Greedy { reward: *reward, penalty: *penalty }
            }
            _ if options.extension.greedy => {
                return Err(EngineError::Configuration(
                    "greedy extension requires match/mismatch nucleotide scoring".into(),
                ));
            }
            _ => AlignerKind::DynamicProgramming,
        };

        let ext_params = ExtensionParameters::new(&options.extension, &sb, &query_info)?;
        let word_params = InitialWordParameters::new(
            &options.word,
            &ext_params,
            program.cutoff_e(),
            options.extension.gapped,
            &sb,
            &query_info,
        )?;

        Ok(Self {
            program,
            query,
            query_info,
            sb,
            finder,
            aligner,
            word_params,
            ext_params,
            gapped: options.extension.gapped,
            options,
            genetic_code,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked at every subject boundary; setting it stops the search
    /// after the subjects already in flight.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The scanned subject is a translated nucleotide sequence. For
    /// profile searches of translated queries this is the real query side.
    fn scans_translated_subject(&self) -> bool {
        self.program.subject_is_translated() || self.program == BlastProgram::Rpstblastn
    }

    fn profile_side(&self) -> ProfileSide {
        if self.program.is_rps() {
            ProfileSide::Query
        } else {
            ProfileSide::None
        }
    }

    /// Fill per-context effective search spaces from the database totals.
    /// Returns the adjusted context table and the shared length adjustment
    /// (the first valid context's value).
    fn effective_query_info(
        &self,
        db_length: i64,
        num_seqs: i64,
    ) -> EngineResult<(QueryInfo, i64)> {
        let mut info = self.query_info.clone();
        let mut shared_adjustment: Option<i64> = None;
        for (ctx, c) in info.contexts.iter_mut().enumerate() {
            if !c.is_valid {
                continue;
            }
            let Some(kbp) = self.sb.kbp(ctx, self.gapped) else {
                c.is_valid = false;
                continue;
            };
            let eff = effective_lengths(c.query_length as i64, db_length, num_seqs, kbp);
            let mut searchsp = eff.eff_searchsp;
            // rpstblastn alone divides its search space by the frame
            // count; the other translated programs do not.
            if self.program == BlastProgram::Rpstblastn {
                searchsp /= NUM_FRAMES;
            }
            c.eff_searchsp = searchsp;
            if shared_adjustment.is_none() {
                shared_adjustment = Some(eff.length_adjustment);
            }
        }
        let adjustment = shared_adjustment.ok_or(EngineError::StatisticsUnavailable {
            first_context: info.first_context,
            last_context: info.last_context,
        })?;
        Ok((info, adjustment))
    }

    fn avg_query_length(&self) -> i32 {
        let total: usize = self.query_info.contexts.iter().map(|c| c.query_length).sum();
        (total / self.query_info.num_contexts().max(1)) as i32
    }

    /// Run the search over every subject in `source`.
    pub fn search(&self, source: &dyn SequenceSource) -> EngineResult<SearchOutcome> {
        let num_subjects = source.num_subjects();
        let db_length = if self.options.eff_lengths.db_length > 0 {
            self.options.eff_lengths.db_length
        } else {
            source.total_length()
        };
        let db_num_seqs = if self.options.eff_lengths.db_num_seqs > 0 {
            self.options.eff_lengths.db_num_seqs
        } else {
            num_subjects as i64
        };

        let (query_info, length_adjustment) = self.effective_query_info(db_length, db_num_seqs)?;
        let avg_subject_length = db_length / db_num_seqs.max(1);
        let hit_params = HitSavingParameters::new(
            &self.options.hit_saving,
            &self.sb,
            self.gapped,
            avg_subject_length,
            &query_info,
        )?;
        let link_params = if hit_params.sum_statistics && !self.gapped {
            let decay = if hit_params.longest_intron > 0 {
                link_defaults::GAP_DECAY_RATE_GAPPED
            } else {
                link_defaults::GAP_DECAY_RATE_UNGAPPED
            };
            Some(if hit_params.longest_intron > 0 {
                LinkHspParameters::uneven(
                    decay,
                    self.scans_translated_subject(),
                    hit_params.longest_intron,
                )
            } else {
                LinkHspParameters::even(decay, self.scans_translated_subject())
            })
        } else {
            None
        };
        let setup = SearchSetup {
            query_info,
            hit_params,
            link_params,
            length_adjustment,
            db_length,
            avg_query_length: self.avg_query_length(),
        };

        info!(
            "scanning {} subjects ({} residues) with {} query contexts",
            num_subjects,
            db_length,
            setup.query_info.num_contexts()
        );

        let prelim = self.make_aligner(self.ext_params.gap_x_dropoff)?;
        let traceback = self.make_aligner(self.ext_params.gap_x_dropoff_final)?;

        let results = Mutex::new(HspResults::default());
        let fatal: Mutex<Option<EngineError>> = Mutex::new(None);
        let skipped = AtomicUsize::new(0);
        let searched = AtomicUsize::new(0);
        let raw_hits = AtomicU64::new(0);
        let window = self.word_params.window_size;
        let query_len = self.query.len();

        (0..num_subjects).into_par_iter().for_each_init(
            || ScanState::new(query_len, MAX_DBSEQ_LEN, window),
            |state, oid| {
                if self.cancel.load(AtomicOrdering::Relaxed) {
                    return;
                }
                if fatal.lock().expect("poisoned error slot").is_some() {
                    return;
                }
                let subject = match source.subject(oid) {
                    Ok(s) => s,
                    Err(EngineError::TransientSubject { oid, reason }) => {
                        warn!("subject {oid} skipped: {reason}");
                        skipped.fetch_add(1, AtomicOrdering::Relaxed);
                        return;
                    }
                    Err(e) => {
                        fatal.lock().expect("poisoned error slot").get_or_insert(e);
                        return;
                    }
                };
                match self.process_subject(
                    oid,
                    &subject.data,
                    &setup,
                    prelim.as_deref(),
                    traceback.as_deref(),
                    state,
                    &raw_hits,
                ) {
                    Ok(list) => {
                        searched.fetch_add(1, AtomicOrdering::Relaxed);
                        results.lock().expect("poisoned result list").push(list);
                    }
                    Err(EngineError::TransientSubject { oid, reason }) => {
                        warn!("subject {oid} skipped: {reason}");
                        skipped.fetch_add(1, AtomicOrdering::Relaxed);
                    }
                    Err(e) => {
                        fatal.lock().expect("poisoned error slot").get_or_insert(e);
                    }
                }
            },
        );

        if let Some(e) = fatal.into_inner().expect("poisoned error slot") {
            return Err(e);
        }

        let mut results = results.into_inner().expect("poisoned result list");
        if self.program.is_rps() {
            results = self.unscramble_profiles(results, source, &setup)?;
        }
        results.sort();

        let outcome = SearchOutcome {
            results,
            subjects_searched: searched.into_inner(),
            subjects_skipped: skipped.into_inner(),
            raw_word_hits: raw_hits.into_inner(),
            cancelled: self.cancel.load(AtomicOrdering::Relaxed),
        };
        debug!(
            "search done: {} subjects, {} skipped, {} raw hits, {} HSPs",
            outcome.subjects_searched,
            outcome.subjects_skipped,
            outcome.raw_word_hits,
            outcome.results.total_hsps()
        );
        Ok(outcome)
    }

    fn make_aligner(&self, x_dropoff: i32) -> EngineResult<Option<Box<dyn GappedAligner + '_>>> {
        if !self.gapped {
            return Ok(None);
        }
        Ok(Some(match self.aligner {
            AlignerKind::DynamicProgramming => {
                Box::new(DpAligner::new(&self.sb, self.profile_side(), x_dropoff))
            }
            AlignerKind::Greedy { reward, penalty } => {
                Box::new(GreedyAligner::new(reward, penalty, x_dropoff)?)
            }
        }))
    }

    /// Frame buffers the scan iterates for one subject, in processing
    /// order. Untranslated subjects pass through as a single frame 0.
    fn subject_frames(&self, data: &[u8]) -> Vec<(Vec<u8>, i8)> {
        if self.scans_translated_subject() {
            SUBJECT_FRAMES
                .iter()
                .map(|&f| (translate_frame(data, f, &self.genetic_code), f))
                .collect()
        } else {
            vec![(data.to_vec(), 0)]
        }
    }

    /// Scan, extend and evaluate one subject. The returned list is Final
    /// for ordinary programs and Merged for profile programs, whose
    /// evaluation waits for the unscramble pass.
    fn process_subject(
        &self,
        oid: usize,
        data: &[u8],
        setup: &SearchSetup,
        prelim: Option<&dyn GappedAligner>,
        traceback: Option<&dyn GappedAligner>,
        state: &mut ScanState,
        raw_hits: &AtomicU64,
    ) -> EngineResult<HspList> {
        let extender = UngappedExtender::new(&self.sb, self.profile_side());
        let mut cutoffs = SubjectCutoffs::default();
        self.word_params.update_for_subject(
            &self.sb,
            &setup.query_info,
            data.len() as i64,
            self.gapped,
            &mut cutoffs,
        )?;

        let mut list = HspList::new(oid);
        for (frame_data, frame) in self.subject_frames(data) {
            let view = SubjectView::whole(&frame_data, frame);
            if view.is_empty() {
                continue;
            }
            let mut start = 0usize;
            loop {
                let chunk = view.window(start, MAX_DBSEQ_LEN);
                state.begin_subject(chunk.len());
                let raw = self.finder.scan(
                    &self.query.data,
                    chunk.residues(),
                    &cutoffs,
                    &extender,
                    state,
                );
                raw_hits.fetch_add(raw as u64, AtomicOrdering::Relaxed);

                let mut chunk_list = HspList::new(oid);
                for hit in &state.hits {
                    if let Some(hsp) = self.extend_hit(
                        hit,
                        chunk.residues(),
                        frame,
                        &setup.query_info,
                        prelim,
                    )? {
                        chunk_list.push(hsp);
                    }
                }
                chunk_list.rebase_subject(chunk.offset);
                list.merge_chunk(chunk_list)?;

                if start + chunk.len() >= view.len() {
                    break;
                }
                start += MAX_DBSEQ_LEN - DBSEQ_CHUNK_OVERLAP;
            }
        }

        list.finish_accumulating()?;
        if self.program.is_rps() || list.is_empty() {
            return Ok(list);
        }

        if let Some(params) = &setup.link_params {
            let (_, kbp) = self.sb.first_valid_kbp(false)?;
            let link_cutoffs = calculate_link_cutoffs(
                params,
                kbp,
                setup.avg_query_length,
                data.len() as i64,
                setup.db_length,
                cutoffs.cutoff_score,
                self.sb.scale_factor,
            );
            link_hsps(
                &mut list.hsps,
                &self.sb,
                &setup.query_info,
                params,
                &link_cutoffs,
                data.len(),
                setup.length_adjustment,
            )?;
            list.mark_evaluated()?;
        } else {
            list.evaluate(&self.sb, &setup.query_info, self.gapped)?;
        }
        list.finalize(setup.hit_params.expect_value, setup.hit_params.culling_limit as i32)?;

        if let Some(aligner) = traceback {
            self.traceback_subject(&mut list, data, setup, aligner)?;
        }
        Ok(list)
    }

    /// Turn one ungapped hit into an [`Hsp`], running the preliminary
    /// gapped extension when the score reaches the gap trigger. Gapped
    /// searches drop hits below the trigger; the ungapped stage already
    /// applied its own cutoff to everything else.
    fn extend_hit(
        &self,
        hit: &UngappedHsp,
        subject: &[u8],
        frame: i8,
        query_info: &QueryInfo,
        prelim: Option<&dyn GappedAligner>,
    ) -> EngineResult<Option<Hsp>> {
        let (mut q_start, mut q_end) = (hit.q_start, hit.q_end);
        let (mut s_start, mut s_end) = (hit.s_start, hit.s_end);
        let mut score = hit.score;

        if let Some(aligner) = prelim {
            if score < self.ext_params.gap_trigger {
                return Ok(None);
            }
            let q_mid = (hit.q_start + hit.q_end) / 2;
            let s_mid = hit.s_start + (q_mid - hit.q_start);
            match aligner.score_only(&self.query.data, subject, q_mid, s_mid) {
                Ok(aln) => {
                    q_start = aln.q_start;
                    q_end = aln.q_end;
                    s_start = aln.s_start;
                    s_end = aln.s_end;
                    score = aln.score;
                }
                Err(EngineError::ResourceExhaustion(reason)) => {
                    debug!("gapped extension skipped: {reason}");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let (ctx, local_start) = query_info.to_context_local(q_start);
        let local_end = local_start + (q_end - q_start);
        Ok(Some(Hsp::new(ctx, local_start, local_end, s_start, s_end, frame, score)))
    }

    /// Traceback over the finalized survivors of one subject, refining
    /// scores and attaching edit scripts. E-values are recomputed from the
    /// traceback scores.
    fn traceback_subject(
        &self,
        list: &mut HspList,
        data: &[u8],
        setup: &SearchSetup,
        aligner: &dyn GappedAligner,
    ) -> EngineResult<()> {
        let mut frames: FxHashMap<i8, Vec<u8>> = FxHashMap::default();
        for hsp in &mut list.hsps {
            let frame_data: &[u8] = if hsp.s_frame == 0 {
                data
            } else {
                frames
                    .entry(hsp.s_frame)
                    .or_insert_with(|| translate_frame(data, hsp.s_frame, &self.genetic_code))
            };
            let ctx = &setup.query_info.contexts[hsp.context];
            let q_mid = ctx.query_offset + (hsp.q_start + hsp.q_end) / 2;
            let s_mid = hsp.s_start + ((hsp.q_start + hsp.q_end) / 2 - hsp.q_start);
            match aligner.with_traceback(&self.query.data, frame_data, q_mid, s_mid) {
                Ok(aln) => {
                    let (new_ctx, local_start) = setup.query_info.to_context_local(aln.q_start);
                    if new_ctx != hsp.context {
                        return Err(EngineError::InternalConsistency(format!(
                            "traceback crossed from context {} to {}",
                            hsp.context, new_ctx
                        )));
                    }
                    hsp.q_start = local_start;
                    hsp.q_end = local_start + (aln.q_end - aln.q_start);
                    hsp.s_start = aln.s_start;
                    hsp.s_end = aln.s_end;
                    hsp.score = aln.score;
                    hsp.edit = aln.edit;
                    if let Some(kbp) = self.sb.kbp(hsp.context, self.gapped) {
                        hsp.evalue =
                            evalue_from_raw(hsp.score, kbp, ctx.eff_searchsp as f64);
                    }
                }
                Err(EngineError::ResourceExhaustion(reason)) => {
                    warn!("traceback skipped for subject {}: {reason}", list.oid);
                }
                Err(e) => return Err(e),
            }
        }
        list.hsps.sort_by(evalue_compare);
        list.best_evalue = list.hsps.first().map(|h| h.evalue).unwrap_or(f64::MAX);
        Ok(())
    }

    /// Rewrite profile-search results into the conventional orientation:
    /// one list per profile, the scanned sequence back on the query side.
    /// Runs after the subject loop, before evaluation and traceback.
    fn unscramble_profiles(
        &self,
        raw: HspResults,
        source: &dyn SequenceSource,
        setup: &SearchSetup,
    ) -> EngineResult<HspResults> {
        // Keyed by profile context; the scanned subject's ordinal id and
        // frame ride along on each HSP.
        let mut per_profile: FxHashMap<usize, HspList> = FxHashMap::default();
        for list in raw.lists {
            for hsp in list.hsps {
                let profile_ctx = hsp.context;
                let entry = per_profile
                    .entry(profile_ctx)
                    .or_insert_with(|| HspList::new(profile_ctx));
                // Swap roles: the profile keeps concatenated coordinates
                // until traceback, the scanned sequence becomes the query.
                let offset = setup.query_info.contexts[profile_ctx].query_offset;
                entry.push(Hsp::new(
                    list.oid,
                    hsp.s_start,
                    hsp.s_end,
                    offset + hsp.q_start,
                    offset + hsp.q_end,
                    hsp.s_frame,
                    hsp.score,
                ));
            }
        }

        let mut out = HspResults::default();
        let mut keys: Vec<usize> = per_profile.keys().copied().collect();
        keys.sort_unstable();
        let zero_subject = vec![0u8; self.query.len()];
        for profile_ctx in keys {
            let mut list = per_profile.remove(&profile_ctx).expect("key just listed");
            list.finish_accumulating()?;
            let kbp = self.sb.kbp(profile_ctx, self.gapped).ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "profile context {profile_ctx} without statistics"
                ))
            })?;
            let searchsp = setup.query_info.contexts[profile_ctx].eff_searchsp;
            for hsp in &mut list.hsps {
                hsp.evalue = evalue_from_raw(hsp.score, kbp, searchsp as f64);
            }
            list.mark_evaluated()?;
            list.finalize(
                setup.hit_params.expect_value,
                setup.hit_params.culling_limit as i32,
            )?;

            if self.gapped {
                self.traceback_profile(&mut list, source, &zero_subject, kbp, searchsp)?;
            }

            // Profile coordinates become profile-local for output.
            let offset = setup.query_info.contexts[profile_ctx].query_offset;
            for hsp in &mut list.hsps {
                hsp.s_start -= offset;
                hsp.s_end -= offset;
            }
            out.push(list);
        }
        Ok(out)
    }

    /// Traceback for one unscrambled profile list. The profile side of the
    /// dynamic program reads scores by column, so the subject buffer only
    /// supplies a length.
    fn traceback_profile(
        &self,
        list: &mut HspList,
        source: &dyn SequenceSource,
        zero_subject: &[u8],
        kbp: &KarlinBlock,
        searchsp: i64,
    ) -> EngineResult<()> {
        let side =
            DpAligner::new(&self.sb, ProfileSide::Subject, self.ext_params.gap_x_dropoff_final);
        let mut sequences: FxHashMap<(usize, i8), Vec<u8>> = FxHashMap::default();
        for hsp in &mut list.hsps {
            let key = (hsp.context, hsp.s_frame);
            if !sequences.contains_key(&key) {
                let subject = source.subject(hsp.context)?;
                let buf = if hsp.s_frame == 0 {
                    subject.data
                } else {
                    translate_frame(&subject.data, hsp.s_frame, &self.genetic_code)
                };
                sequences.insert(key, buf);
            }
            let query_seq = &sequences[&key];
            let q_mid = (hsp.q_start + hsp.q_end) / 2;
            let s_mid = hsp.s_start + (q_mid - hsp.q_start);
            match side.with_traceback(query_seq, zero_subject, q_mid, s_mid) {
                Ok(aln) => {
                    hsp.q_start = aln.q_start;
                    hsp.q_end = aln.q_end;
                    hsp.s_start = aln.s_start;
                    hsp.s_end = aln.s_end;
                    hsp.score = aln.score;
                    hsp.edit = aln.edit;
                    hsp.evalue = evalue_from_raw(hsp.score, kbp, searchsp as f64);
                }
                Err(EngineError::ResourceExhaustion(reason)) => {
                    warn!("profile traceback skipped: {reason}");
                }
                Err(e) => return Err(e),
            }
        }
        list.hsps.sort_by(evalue_compare);
        list.best_evalue = list.hsps.first().map(|h| h.evalue).unwrap_or(f64::MAX);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::encode_nucleotide;
    use crate::core::parameters::defaults;
    use crate::core::sequence::concat_query_contexts;
    use crate::source::InMemorySequenceSource;
    use crate::stats::karlin::BitScore;

    fn blastn_options(word_size: usize) -> SearchOptions {
        SearchOptions {
            lookup: LookupTableOptions { word_size, threshold: 0 },
            word: InitialWordOptions {
                window_size: 0,
                x_dropoff: defaults::UNGAPPED_X_DROPOFF_NUCL,
            },
            extension: ExtensionOptions {
                gap_x_dropoff: defaults::GAP_X_DROPOFF_NUCL,
                gap_x_dropoff_final: defaults::GAP_X_DROPOFF_FINAL_NUCL,
                gap_trigger: defaults::GAP_TRIGGER_NUCL,
                gapped: false,
                greedy: false,
            },
            hit_saving: HitSavingOptions {
                expect_value: 10.0,
                culling_limit: 0,
                longest_intron: 0,
                sum_statistics: false,
            },
            eff_lengths: EffectiveLengthsOptions { db_length: 0, db_num_seqs: 0 },
        }
    }

    fn blastn_engine(query: &[u8], word_size: usize) -> SearchEngine {
        let encoded = encode_nucleotide(query);
        let (block, info) = concat_query_contexts(&[(encoded, 1)]).unwrap();
        let sb = ScoreBlock::nucleotide(1, -3, 0, 0, info.num_contexts()).unwrap();
        SearchEngine::new(
            BlastProgram::Blastn,
            block,
            info,
            sb,
            Seeding::Exact,
            blastn_options(word_size),
            GeneticCode::from_id(1),
        )
        .unwrap()
    }

    fn planted_subject(query: &[u8], at: usize, total: usize) -> Vec<u8> {
        // Background of alternating G/C avoids accidental query matches
        // for A/T-rich queries.
        let mut s: Vec<u8> = (0..total).map(|i| if i % 2 == 0 { b'G' } else { b'C' }).collect();
        s[at..at + query.len()].copy_from_slice(query);
        encode_nucleotide(&s)
    }

    #[test]
    fn planted_match_is_found_once() {
        let query = b"ACGTACGTTGCATGCAACGTACGTTGCATGCA";
        let engine = blastn_engine(query, 16);
        let source = InMemorySequenceSource::new(vec![planted_subject(query, 100, 232)]);
        let outcome = engine.search(&source).unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.subjects_searched, 1);
        assert_eq!(outcome.results.total_hsps(), 1);
        let hsp = &outcome.results.lists[0].hsps[0];
        assert_eq!(hsp.score, 32);
        assert_eq!((hsp.q_start, hsp.q_end), (0, 32));
        assert_eq!((hsp.s_start, hsp.s_end), (100, 132));
        assert!(hsp.evalue < 1e-6);
    }

    #[test]
    fn subject_without_match_yields_no_list() {
        let query = b"ACGTACGTTGCATGCAACGTACGTTGCATGCA";
        let engine = blastn_engine(query, 16);
        let source = InMemorySequenceSource::new(vec![planted_subject(b"A", 0, 300)]);
        let outcome = engine.search(&source).unwrap();
        assert_eq!(outcome.results.total_hsps(), 0);
        assert!(outcome.results.lists.is_empty());
    }

    #[test]
    fn cancellation_stops_at_subject_boundaries() {
        let query = b"ACGTACGTTGCATGCAACGTACGTTGCATGCA";
        let engine = blastn_engine(query, 16);
        engine.cancellation_flag().store(true, AtomicOrdering::Relaxed);
        let source = InMemorySequenceSource::new(vec![planted_subject(query, 100, 232)]);
        let outcome = engine.search(&source).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.subjects_searched, 0);
        assert_eq!(outcome.results.total_hsps(), 0);
    }

    struct FlakySource {
        inner: InMemorySequenceSource,
        bad_oid: usize,
    }

    impl SequenceSource for FlakySource {
        fn num_subjects(&self) -> usize {
            self.inner.num_subjects() + 1
        }
        fn total_length(&self) -> i64 {
            self.inner.total_length()
        }
        fn subject(&self, oid: usize) -> EngineResult<crate::source::SubjectSequence> {
            if oid == self.bad_oid {
                return Err(EngineError::TransientSubject {
                    oid,
                    reason: "simulated fetch failure".into(),
                });
            }
            let mut s = self.inner.subject(oid - usize::from(oid > self.bad_oid))?;
            s.oid = oid;
            Ok(s)
        }
    }

    #[test]
    fn fetch_failure_skips_only_that_subject() {
        let query = b"ACGTACGTTGCATGCAACGTACGTTGCATGCA";
        let engine = blastn_engine(query, 16);
        let source = FlakySource {
            inner: InMemorySequenceSource::new(vec![planted_subject(query, 100, 232)]),
            bad_oid: 0,
        };
        let outcome = engine.search(&source).unwrap();
        assert_eq!(outcome.subjects_skipped, 1);
        assert_eq!(outcome.subjects_searched, 1);
        assert_eq!(outcome.results.total_hsps(), 1);
        assert_eq!(outcome.results.lists[0].oid, 1);
    }

    #[test]
    fn tblastn_finds_protein_in_translated_subject() {
        // Protein query; nucleotide subject carries its exact coding
        // sequence in frame +1.
        let protein = b"MKWVWWALLLLAAWAAAEKWVWWM";
        let encoded = crate::core::encoding::encode_protein(protein);
        let (block, info) = concat_query_contexts(&[(encoded, 0)]).unwrap();
        let sb = ScoreBlock::blosum62(11, 1, info.num_contexts()).unwrap();
        let mut options = blastn_options(3);
        options.lookup.threshold = defaults::WORD_THRESHOLD_BLASTP;
        options.word =
            InitialWordOptions { window_size: defaults::WINDOW_SIZE_PROT, x_dropoff: BitScore(7.0) };
        options.extension.gap_trigger = defaults::GAP_TRIGGER_PROT;
        let engine = SearchEngine::new(
            BlastProgram::Tblastn,
            block,
            info,
            sb,
            Seeding::TwoHit,
            options,
            GeneticCode::from_id(1),
        )
        .unwrap();

        // Codons for the query protein, standard code.
        let coding: String = protein
            .iter()
            .map(|&aa| match aa {
                b'M' => "ATG",
                b'K' => "AAA",
                b'W' => "TGG",
                b'V' => "GTT",
                b'A' => "GCT",
                b'L' => "CTT",
                b'E' => "GAA",
                _ => unreachable!(),
            })
            .collect();
        let mut subject = String::new();
        subject.push_str(&"GC".repeat(15));
        // Pad to keep the insert in frame +1 relative to the buffer start.
        subject.push_str(&coding);
        subject.push_str(&"GC".repeat(15));
        let source =
            InMemorySequenceSource::new(vec![encode_nucleotide(subject.as_bytes())]);

        let outcome = engine.search(&source).unwrap();
        assert_eq!(outcome.subjects_searched, 1);
        assert!(outcome.results.total_hsps() >= 1);
        let best = &outcome.results.lists[0].hsps[0];
        assert_eq!(best.s_frame, 1);
        assert_eq!(best.q_end - best.q_start, protein.len());
    }
}
