use std::{path::PathBuf, process};

use clap::{Parser, ValueEnum, error::ErrorKind};
use stego_detect::{
    DetectionConfig,
    analysis::spam::DEFAULT_CLIP,
    batch::BatchDriver,
    detection::{
        DetectionMethod, Detector,
        classifier::ClassifierDetector,
        lsb::{ChiSquareDetector, DEFAULT_COLOR_THRESHOLD, DEFAULT_GRAYSCALE_THRESHOLD, LsbThresholds},
        model::ModelContext,
    },
    error::{Result, StegoError},
    report::{JsonReport, format_failure, format_outcome, format_summary},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Chi-square test on the LSB plane
    ChiSquare,
    /// SPAM features + support vector classifier
    Classifier,
}

impl From<Method> for DetectionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::ChiSquare => DetectionMethod::ChiSquare,
            Method::Classifier => DetectionMethod::Classifier,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "stego-detect")]
#[command(about = "Detect LSB steganography in still images", long_about = None)]
#[command(version)]
struct Cli {
    /// Image file or directory of images
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Detection method
    #[arg(short, long, value_enum, default_value = "chi-square")]
    method: Method,

    /// Classifier artifact (JSON)
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Scaler artifact (JSON)
    #[arg(long, value_name = "FILE")]
    scaler: Option<PathBuf>,

    /// Canonical resolution images are stretched to
    #[arg(long, value_name = "WxH", default_value = "512x512", value_parser = parse_size)]
    size: (u32, u32),

    /// Chi-square threshold for single-channel images
    #[arg(long, default_value_t = DEFAULT_GRAYSCALE_THRESHOLD)]
    grayscale_threshold: f64,

    /// Chi-square threshold for multi-channel images
    #[arg(long, default_value_t = DEFAULT_COLOR_THRESHOLD)]
    color_threshold: f64,

    /// SPAM clipping bound T
    #[arg(long, default_value_t = DEFAULT_CLIP)]
    clip: u32,

    /// Overwrite each source file with its resized PNG
    #[arg(long)]
    rewrite_source: bool,

    /// Number of worker threads
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Write a JSON report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if w == 0 || h == 0 {
        return Err("dimensions must be non-zero".into());
    }
    Ok((w, h))
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_detector(cli: &Cli, config: &DetectionConfig) -> Result<Box<dyn Detector>> {
    match config.method {
        DetectionMethod::ChiSquare => Ok(Box::new(ChiSquareDetector::new(config)?)),
        DetectionMethod::Classifier => {
            let (Some(model), Some(scaler)) = (&cli.model, &cli.scaler) else {
                return Err(StegoError::ModelUnavailable(
                    "--model and --scaler are required for the classifier method".into(),
                ));
            };
            let models = ModelContext::load(model, scaler)?;
            Ok(Box::new(ClassifierDetector::new(config, models)?))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| StegoError::InvalidParameter(format!("thread pool: {e}")))?;
    }

    let config = DetectionConfig {
        method: cli.method.into(),
        target_size: cli.size,
        thresholds: LsbThresholds {
            grayscale: cli.grayscale_threshold,
            color: cli.color_threshold,
        },
        spam_clip: cli.clip,
        rewrite_source: cli.rewrite_source,
        ..DetectionConfig::default()
    };

    // Artifacts load before any file is touched.
    let detector = build_detector(&cli, &config)?;
    let summary = BatchDriver::new(detector.as_ref())
        .with_parallel(config.parallel)
        .process_path(&cli.path)?;

    for outcome in &summary.outcomes {
        if let Some(line) = format_outcome(outcome) {
            println!("{line}");
        }
        if let Some(line) = format_failure(outcome) {
            eprintln!("{line}");
        }
    }

    if cli.path.is_dir() {
        println!();
        println!("{}", format_summary(&summary));
    }

    if let Some(report_path) = &cli.report {
        JsonReport::new(&summary, &config).write(report_path)?;
    }

    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    init_logging(&cli);

    if !cli.path.exists() {
        eprintln!("Invalid path.");
        process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
