use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use peakclique::{AlignError, AlignmentConfig, PeakAligner, PeakRecord, SimilarityStorage, WorkerStrategy};

/// Match peaks across chromatography-MS runs by bidirectional best hits.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON array of peak records
    #[arg(short, long)]
    input: PathBuf,

    /// JSON alignment configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file for the alignment summary (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Minimum clique size (default: every run)
    #[arg(long)]
    min_clique_size: Option<usize>,

    #[arg(long)]
    max_bbh_errors: Option<usize>,

    #[arg(long, value_enum)]
    storage: Option<SimilarityStorage>,

    #[arg(long, value_enum)]
    strategy: Option<WorkerStrategy>,

    /// Worker threads for similarity scoring (0 = all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_config(args: &Args) -> Result<AlignmentConfig, AlignError> {
    let mut config = match &args.config {
        Some(path) => AlignmentConfig::from_json_file(path)?,
        None => AlignmentConfig::default(),
    };
    if let Some(n) = args.min_clique_size {
        config.min_clique_size = Some(n);
    }
    if let Some(n) = args.max_bbh_errors {
        config.max_bbh_errors = n;
    }
    if let Some(storage) = args.storage {
        config.storage = storage;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(n) = args.threads {
        config.num_threads = n;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), AlignError> {
    let config = build_config(args)?;
    let records: Vec<PeakRecord> = serde_json::from_reader(BufReader::new(File::open(&args.input)?))?;
    info!("read {} peak records from {}", records.len(), args.input.display());

    let aligner = PeakAligner::new(config);
    debug!("alignment config: {:?}", aligner.config());
    let result = aligner.align(records)?;
    let stats = result.similarity_stats();
    info!("{} similarities kept, {} non-finite dropped", stats.scored, stats.rejected);
    let summary = result.summary();

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &summary)?;
            writer.flush()?;
            info!("wrote {} cliques to {}", summary.cliques.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &summary)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
