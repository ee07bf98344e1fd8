//! Demo driver: FASTA in, tab-separated hits out.
//!
//! All engine semantics live in the library; this binary only reads
//! sequences, builds an engine per query and prints results.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use seedex::core::encoding::{
    encode_nucleotide, encode_protein, protein_to_dna, reverse_complement, GeneticCode,
};
use seedex::core::parameters::{
    defaults, EffectiveLengthsOptions, ExtensionOptions, HitSavingOptions, InitialWordOptions,
    LookupTableOptions,
};
use seedex::core::score_model::ScoreBlock;
use seedex::core::sequence::concat_query_contexts;
use seedex::stats::karlin::bit_score_from_raw;
use seedex::{
    BlastProgram, EngineResult, InMemorySequenceSource, SearchEngine, SearchOptions, Seeding,
};

#[derive(Parser)]
#[command(name = "seedex")]
#[command(version)]
#[command(about = "Seed-and-extend local alignment search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Nucleotide query vs nucleotide subjects
    Blastn(BlastnArgs),
    /// Protein query vs protein subjects
    Blastp(BlastpArgs),
    /// Protein query vs translated nucleotide subjects
    Tblastn(TblastnArgs),
}

#[derive(clap::Args)]
struct CommonArgs {
    #[arg(short, long)]
    query: PathBuf,
    #[arg(short, long)]
    subject: PathBuf,
    #[arg(long, default_value_t = 10.0)]
    evalue: f64,
    #[arg(short = 'n', long, default_value_t = 0)]
    num_threads: usize,
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args)]
struct BlastnArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(short, long, default_value_t = defaults::WORD_SIZE_NUCL)]
    word_size: usize,
    #[arg(long, default_value_t = 1)]
    reward: i32,
    #[arg(long, default_value_t = -2)]
    penalty: i32,
    #[arg(long, default_value_t = 0)]
    gap_open: i32,
    #[arg(long, default_value_t = 0)]
    gap_extend: i32,
    /// Greedy gapped extension instead of full dynamic programming
    #[arg(long)]
    greedy: bool,
    /// Ungapped search
    #[arg(long)]
    ungapped: bool,
}

#[derive(clap::Args)]
struct BlastpArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value_t = defaults::WORD_THRESHOLD_BLASTP)]
    threshold: i32,
    #[arg(long, default_value_t = defaults::GAP_OPEN_PROT)]
    gap_open: i32,
    #[arg(long, default_value_t = defaults::GAP_EXTEND_PROT)]
    gap_extend: i32,
    #[arg(long)]
    ungapped: bool,
}

#[derive(clap::Args)]
struct TblastnArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value_t = defaults::WORD_THRESHOLD_BLASTP)]
    threshold: i32,
    /// NCBI genetic code id for subject translation
    #[arg(long, default_value_t = 1)]
    db_gencode: u8,
    /// Link colinear HSPs with sum statistics (ungapped search)
    #[arg(long)]
    sum_stats: bool,
}

/// One output row, already in plus-strand/query-local coordinates.
struct HitRow {
    query_id: String,
    subject_id: String,
    score: i32,
    bit_score: f64,
    evalue: f64,
    q_start: usize,
    q_end: usize,
    s_start: usize,
    s_end: usize,
    frame: i8,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Blastn(args) => run_blastn(args),
        Commands::Blastp(args) => run_blastp(args),
        Commands::Tblastn(args) => run_tblastn(args),
    }
}

fn init_threads(num_threads: usize) -> Result<()> {
    let threads = if num_threads == 0 { num_cpus::get() } else { num_threads };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("building thread pool")?;
    Ok(())
}

fn read_fasta(path: &PathBuf) -> Result<Vec<(String, Vec<u8>)>> {
    let reader = bio::io::fasta::Reader::from_file(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for rec in reader.records() {
        let rec = rec.context("reading FASTA record")?;
        let id = rec.id().split_whitespace().next().unwrap_or("unknown").to_string();
        records.push((id, rec.seq().to_vec()));
    }
    Ok(records)
}

fn progress(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} queries ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn write_rows(rows: &[HitRow], out: Option<&PathBuf>) -> Result<()> {
    let stdout = io::stdout();
    let mut writer: Box<dyn Write> = if let Some(path) = out {
        Box::new(BufWriter::new(File::create(path)?))
    } else {
        Box::new(BufWriter::new(stdout.lock()))
    };
    for row in rows {
        write_row(&mut writer, row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_row(writer: &mut dyn Write, row: &HitRow) -> Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{:.1}\t{:.2e}\t{}\t{}\t{}\t{}\t{}",
        row.query_id,
        row.subject_id,
        row.score,
        row.bit_score,
        row.evalue,
        row.q_start + 1,
        row.q_end,
        row.s_start + 1,
        row.s_end,
        row.frame,
    )?;
    Ok(())
}

fn base_options(evalue: f64) -> SearchOptions {
    SearchOptions {
        lookup: LookupTableOptions { word_size: defaults::WORD_SIZE_PROT, threshold: 0 },
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
            expect_value: evalue,
            culling_limit: 0,
            longest_intron: 0,
            sum_statistics: false,
        },
        eff_lengths: EffectiveLengthsOptions { db_length: 0, db_num_seqs: 0 },
    }
}

fn run_blastn(args: BlastnArgs) -> Result<()> {
    init_threads(args.common.num_threads)?;
    let queries = read_fasta(&args.common.query)?;
    let subjects = read_fasta(&args.common.subject)?;
    let subject_ids: Vec<String> = subjects.iter().map(|(id, _)| id.clone()).collect();
    let source =
        InMemorySequenceSource::new(subjects.into_iter().map(|(_, s)| encode_nucleotide(&s)).collect());

    let mut options = base_options(args.common.evalue);
    options.lookup.word_size = args.word_size;
    options.extension.gapped = !args.ungapped;
    options.extension.greedy = args.greedy && !args.ungapped;

    let bar = progress(queries.len() as u64);
    let mut rows = Vec::new();
    for (query_id, raw) in &queries {
        let plus = encode_nucleotide(raw);
        let minus = reverse_complement(&plus);
        let qlen = plus.len();
        let (block, info) = concat_query_contexts(&[(plus, 1), (minus, -1)])?;
        let sb = ScoreBlock::nucleotide(
            args.reward,
            args.penalty,
            args.gap_open,
            args.gap_extend,
            info.num_contexts(),
        )?;
        let engine = SearchEngine::new(
            BlastProgram::Blastn,
            block,
            info.clone(),
            sb.clone(),
            Seeding::Exact,
            options.clone(),
            GeneticCode::from_id(1),
        )?;
        let outcome = engine.search(&source)?;
        for list in &outcome.results.lists {
            for hsp in &list.hsps {
                let strand = info.contexts[hsp.context].frame;
                // Minus-strand coordinates map back to the plus strand.
                let (q_start, q_end) = if strand < 0 {
                    (qlen - hsp.q_end, qlen - hsp.q_start)
                } else {
                    (hsp.q_start, hsp.q_end)
                };
                rows.push(HitRow {
                    query_id: query_id.clone(),
                    subject_id: subject_ids[list.oid].clone(),
                    score: hsp.score,
                    bit_score: hit_bits(&sb, hsp.context, !args.ungapped, hsp.score)?,
                    evalue: hsp.evalue,
                    q_start,
                    q_end,
                    s_start: hsp.s_start,
                    s_end: hsp.s_end,
                    frame: strand,
                });
            }
        }
        bar.inc(1);
    }
    bar.finish();
    write_rows(&rows, args.common.out.as_ref())
}

fn run_blastp(args: BlastpArgs) -> Result<()> {
    init_threads(args.common.num_threads)?;
    let queries = read_fasta(&args.common.query)?;
    let subjects = read_fasta(&args.common.subject)?;
    let subject_ids: Vec<String> = subjects.iter().map(|(id, _)| id.clone()).collect();
    let source =
        InMemorySequenceSource::new(subjects.into_iter().map(|(_, s)| encode_protein(&s)).collect());

    let mut options = base_options(args.common.evalue);
    options.lookup = LookupTableOptions {
        word_size: defaults::WORD_SIZE_PROT,
        threshold: args.threshold,
    };
    options.word = InitialWordOptions {
        window_size: defaults::WINDOW_SIZE_PROT,
        x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
    };
    options.extension = ExtensionOptions {
        gap_x_dropoff: defaults::GAP_X_DROPOFF_PROT,
        gap_x_dropoff_final: defaults::GAP_X_DROPOFF_FINAL_PROT,
        gap_trigger: defaults::GAP_TRIGGER_PROT,
        gapped: !args.ungapped,
        greedy: false,
    };

    let bar = progress(queries.len() as u64);
    let mut rows = Vec::new();
    for (query_id, raw) in &queries {
        let (block, info) = concat_query_contexts(&[(encode_protein(raw), 0)])?;
        let sb = ScoreBlock::blosum62(args.gap_open, args.gap_extend, info.num_contexts())?;
        let engine = SearchEngine::new(
            BlastProgram::Blastp,
            block,
            info,
            sb.clone(),
            Seeding::TwoHit,
            options.clone(),
            GeneticCode::from_id(1),
        )?;
        let outcome = engine.search(&source)?;
        for list in &outcome.results.lists {
            for hsp in &list.hsps {
                rows.push(HitRow {
                    query_id: query_id.clone(),
                    subject_id: subject_ids[list.oid].clone(),
                    score: hsp.score,
                    bit_score: hit_bits(&sb, hsp.context, !args.ungapped, hsp.score)?,
                    evalue: hsp.evalue,
                    q_start: hsp.q_start,
                    q_end: hsp.q_end,
                    s_start: hsp.s_start,
                    s_end: hsp.s_end,
                    frame: 0,
                });
            }
        }
        bar.inc(1);
    }
    bar.finish();
    write_rows(&rows, args.common.out.as_ref())
}

fn run_tblastn(args: TblastnArgs) -> Result<()> {
    init_threads(args.common.num_threads)?;
    let queries = read_fasta(&args.common.query)?;
    let subjects = read_fasta(&args.common.subject)?;
    let subject_ids: Vec<String> = subjects.iter().map(|(id, _)| id.clone()).collect();
    let subject_lengths: Vec<usize> = subjects.iter().map(|(_, s)| s.len()).collect();
    let source =
        InMemorySequenceSource::new(subjects.into_iter().map(|(_, s)| encode_nucleotide(&s)).collect());
    let code = GeneticCode::from_id(args.db_gencode);

    let mut options = base_options(args.common.evalue);
    options.lookup = LookupTableOptions {
        word_size: defaults::WORD_SIZE_PROT,
        threshold: args.threshold,
    };
    options.word = InitialWordOptions {
        window_size: defaults::WINDOW_SIZE_PROT,
        x_dropoff: defaults::UNGAPPED_X_DROPOFF_PROT,
    };
    options.extension.gap_trigger = defaults::GAP_TRIGGER_PROT;
    options.hit_saving.sum_statistics = args.sum_stats;

    let bar = progress(queries.len() as u64);
    let mut rows = Vec::new();
    for (query_id, raw) in &queries {
        let (block, info) = concat_query_contexts(&[(encode_protein(raw), 0)])?;
        let sb = ScoreBlock::blosum62(
            defaults::GAP_OPEN_PROT,
            defaults::GAP_EXTEND_PROT,
            info.num_contexts(),
        )?;
        let engine = SearchEngine::new(
            BlastProgram::Tblastn,
            block,
            info,
            sb.clone(),
            Seeding::TwoHit,
            options.clone(),
            code.clone(),
        )?;
        let outcome = engine.search(&source)?;
        for list in &outcome.results.lists {
            let dna_len = subject_lengths[list.oid];
            for hsp in &list.hsps {
                // Subject coordinates are reported on the nucleotide
                // sequence; the frame round-trips through the protein.
                let s_start = protein_to_dna(hsp.s_frame, hsp.s_start, dna_len);
                let s_end = protein_to_dna(hsp.s_frame, hsp.s_end, dna_len);
                let (s_start, s_end) = if s_start <= s_end { (s_start, s_end) } else { (s_end, s_start) };
                rows.push(HitRow {
                    query_id: query_id.clone(),
                    subject_id: subject_ids[list.oid].clone(),
                    score: hsp.score,
                    bit_score: hit_bits(&sb, hsp.context, false, hsp.score)?,
                    evalue: hsp.evalue,
                    q_start: hsp.q_start,
                    q_end: hsp.q_end,
                    s_start,
                    s_end,
                    frame: hsp.s_frame,
                });
            }
        }
        bar.inc(1);
    }
    bar.finish();
    write_rows(&rows, args.common.out.as_ref())
}

fn hit_bits(sb: &ScoreBlock, ctx: usize, gapped: bool, raw: i32) -> EngineResult<f64> {
    let kbp = sb
        .kbp(ctx, gapped)
        .or_else(|| sb.kbp(ctx, false))
        .ok_or(seedex::EngineError::StatisticsUnavailable { first_context: ctx, last_context: ctx })?;
    Ok(bit_score_from_raw(raw, kbp).0)
}
