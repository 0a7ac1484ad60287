//! bitpress CLI - Information-preserving precision reduction for gridded datasets.

use bitpress::codec::{CodecConfig, CompressionStats, DatasetCodec};
use bitpress::container;
use bitpress::pipeline::{PrecisionReducer, ReductionConfig, VariableOutcome};
use bitpress::policy::{ClassificationPolicy, VariableClass};
use bitpress::workflow;
use bitpress::AxisReduction;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for compress and decompress.
#[derive(Serialize)]
struct JsonOutput<'a> {
    operation: &'static str,
    input: String,
    output: String,
    original_size: usize,
    compressed_size: usize,
    ratio: f64,
    elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    axis: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a BTreeMap<String, VariableOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    excluded: Option<Vec<&'a str>>,
}

/// JSON output for `info`.
#[derive(Serialize)]
struct InfoOutput<'a> {
    path: String,
    dimensions: &'a BTreeMap<String, usize>,
    variables: Vec<InfoVariable<'a>>,
    attributes: &'a bitpress::Attributes,
}

#[derive(Serialize)]
struct InfoVariable<'a> {
    name: &'a str,
    dtype: String,
    dims: &'a [String],
    shape: &'a [usize],
}

/// Axis reduction for per-position information.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum ReductionArg {
    /// Pool all neighbour pairs along the axis (xbitinfo default)
    Pooled,
    /// Maximum information over axis positions
    Max,
    /// Mean information over axis positions
    Mean,
}

impl From<ReductionArg> for AxisReduction {
    fn from(arg: ReductionArg) -> Self {
        match arg {
            ReductionArg::Pooled => AxisReduction::Pooled,
            ReductionArg::Max => AxisReduction::Max,
            ReductionArg::Mean => AxisReduction::Mean,
        }
    }
}

/// Information-preserving precision reduction and compression for gridded
/// scientific datasets.
///
/// Rounds away mantissa bits that carry no real information, then compresses
/// the result with zstd.
#[derive(Parser, Debug)]
#[command(name = "bitpress")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging; RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Round and compress a dataset
    Compress(CompressArgs),
    /// Decompress an artifact back to a dataset container
    Decompress(DecompressArgs),
    /// Compare an original dataset against a restored one
    Verify(VerifyArgs),
    /// Show bit information and keepbits without writing anything
    Analyze(AnalyzeArgs),
    /// Show dataset container information
    Info(InfoArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

/// Options shared by `compress` and `analyze`.
#[derive(clap::Args, Debug)]
struct ReductionArgs {
    /// Dimension along which neighbouring values are compared
    #[arg(long, default_value = "lon")]
    axis: String,

    /// How per-position information is collapsed along the axis
    #[arg(long, value_enum, default_value = "pooled")]
    reduction: ReductionArg,

    /// Confidence of the bit significance filter, in (0, 1)
    #[arg(long, default_value_t = 0.99)]
    confidence: f64,

    /// Variable to keep exact regardless of its information (repeatable)
    #[arg(long, value_name = "NAME")]
    preserve: Vec<String>,

    /// Extra coordinate variable name (repeatable)
    #[arg(long, value_name = "NAME")]
    coordinate: Vec<String>,

    /// Fixed keepbits for a variable, bypassing estimation (repeatable)
    #[arg(long, value_name = "NAME=BITS", value_parser = parse_keepbits)]
    keepbits: Vec<(String, u32)>,
}

impl ReductionArgs {
    fn reducer(&self, retention_level: f64) -> Result<PrecisionReducer, Box<dyn std::error::Error>> {
        let config = ReductionConfig {
            retention_level,
            axis: self.axis.clone(),
            axis_reduction: self.reduction.into(),
            confidence: self.confidence,
            fixed_keepbits: self.keepbits.iter().cloned().collect(),
        };
        let mut policy = ClassificationPolicy::default().with_preserved(self.preserve.iter().cloned());
        if !self.coordinate.is_empty() {
            policy = policy.with_coordinate_names(self.coordinate.iter().cloned());
        }
        Ok(PrecisionReducer::new(config, policy)?)
    }
}

#[derive(Parser, Debug)]
struct CompressArgs {
    /// Input dataset container (.bpds)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Fraction of information to retain, in (0, 1]
    #[arg(value_name = "RETENTION", allow_negative_numbers = true)]
    retention: f64,

    /// Output artifact path
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Compression level (1-22, default 22)
    #[arg(short, long, default_value = "22", value_parser = clap::value_parser!(i32).range(1..=22))]
    level: i32,

    #[command(flatten)]
    reduction: ReductionArgs,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Show progress spinner
    #[arg(long)]
    progress: bool,
}

#[derive(Parser, Debug)]
struct DecompressArgs {
    /// Compressed artifact path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output dataset container path
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Show progress spinner
    #[arg(long)]
    progress: bool,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Original dataset container
    #[arg(value_name = "ORIGINAL")]
    original: PathBuf,

    /// Restored dataset container
    #[arg(value_name = "RESTORED")]
    restored: PathBuf,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Input dataset container (.bpds)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Fraction of information to retain, in (0, 1]
    #[arg(short, long, default_value_t = 0.99)]
    retention: f64,

    #[command(flatten)]
    reduction: ReductionArgs,

    /// Show per-bit mantissa information
    #[arg(short, long)]
    detailed: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input dataset container (.bpds)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

fn parse_keepbits(s: &str) -> Result<(String, u32), String> {
    let (name, bits) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=BITS, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    let bits = bits
        .parse::<u32>()
        .map_err(|e| format!("invalid keepbits '{}': {}", bits, e))?;
    Ok((name.to_string(), bits))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}

fn print_stats(title: &str, stats: &CompressionStats, elapsed_secs: f64) {
    eprintln!();
    eprintln!("{}:", title);
    eprintln!("  Original size:   {}", format_size(stats.original_size));
    eprintln!("  Compressed size: {}", format_size(stats.compressed_size));
    eprintln!("  Ratio:           {:.2}x", stats.ratio);
    eprintln!("  Time:            {:.3}s", elapsed_secs);
}

fn run_compress(args: CompressArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let reducer = args.reduction.reducer(args.retention)?;
    let codec = DatasetCodec::new(CodecConfig::with_level(args.level));

    if verbose && !args.json {
        eprintln!("Configuration:");
        eprintln!("  Input:      {}", args.input.display());
        eprintln!("  Output:     {}", args.output.display());
        eprintln!("  Retention:  {}", args.retention);
        eprintln!("  Axis:       {}", args.reduction.axis);
        eprintln!("  Reduction:  {:?}", args.reduction.reduction);
        eprintln!("  Level:      {}", args.level);
        if !reducer.policy().preserved().is_empty() {
            eprintln!("  Preserved:  {:?}", reducer.policy().preserved());
        }
        eprintln!();
    }

    let pb = args.progress.then(|| create_spinner("Rounding and compressing..."));
    let start = Instant::now();
    let summary = workflow::compress_file(&args.input, &args.output, &reducer, &codec);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let summary = summary?;
    let elapsed = start.elapsed().as_secs_f64();
    let excluded = summary.reduction.excluded_names();

    if args.json {
        let output = JsonOutput {
            operation: "compress",
            input: args.input.display().to_string(),
            output: args.output.display().to_string(),
            original_size: summary.stats.original_size,
            compressed_size: summary.stats.compressed_size,
            ratio: summary.stats.ratio,
            elapsed_secs: elapsed,
            retention_level: Some(summary.reduction.retention_level),
            axis: Some(&summary.reduction.axis),
            variables: Some(&summary.reduction.variables),
            excluded: Some(excluded),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !excluded.is_empty() {
        println!("Excluded variables: {}", excluded.join(", "));
    }
    if verbose {
        eprintln!("Keepbits:");
        for (name, keepbits) in summary.reduction.rounded() {
            eprintln!("  {:<24} {:>3}", name, keepbits);
        }
        for (name, reason) in summary.reduction.excluded() {
            eprintln!("  {:<24} excluded ({})", name, reason);
        }
    }
    print_stats("Compression Results", &summary.stats, elapsed);
    println!("Compressed file written to: {}", args.output.display());
    Ok(())
}

fn run_decompress(args: DecompressArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let codec = DatasetCodec::default();

    let pb = args.progress.then(|| create_spinner("Decompressing..."));
    let start = Instant::now();
    let stats = workflow::decompress_file(&args.input, &args.output, &codec);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let stats = stats?;
    let elapsed = start.elapsed().as_secs_f64();

    if args.json {
        let output = JsonOutput {
            operation: "decompress",
            input: args.input.display().to_string(),
            output: args.output.display().to_string(),
            original_size: stats.original_size,
            compressed_size: stats.compressed_size,
            ratio: stats.ratio,
            elapsed_secs: elapsed,
            retention_level: None,
            axis: None,
            variables: None,
            excluded: None,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if verbose {
        print_stats("Decompression Results", &stats, elapsed);
    }
    println!("Decompressed file written to: {}", args.output.display());
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.json {
        println!(
            "Opening files:\n - Original: {}\n - Restored: {}\n",
            args.original.display(),
            args.restored.display()
        );
    }
    let report = workflow::verify_files(&args.original, &args.restored)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reducer = args.reduction.reducer(args.retention)?;
    let analysis = workflow::analyze_file(&args.input, &reducer)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("Dataset: {}", args.input.display());
    println!(
        "Retention: {}  Axis: {}  Reduction: {:?}",
        args.retention, args.reduction.axis, args.reduction.reduction
    );
    println!();
    println!("{:<24} {:>10} {:>10} {:>10}  {}", "Name", "Class", "Resolved", "Keepbits", "Outcome");
    println!("{}", "-".repeat(80));

    for (name, var) in &analysis {
        let class = match var.class {
            VariableClass::Coordinate => "coord",
            VariableClass::Preserved => "preserved",
            VariableClass::Data => "data",
        };
        let resolved = var
            .resolved_keepbits
            .map_or_else(|| "-".to_string(), |k| k.to_string());
        let (keepbits, outcome) = match &var.outcome {
            VariableOutcome::Rounded { keepbits, source } => {
                (keepbits.to_string(), format!("rounded ({:?})", source).to_lowercase())
            }
            VariableOutcome::Exempt(reason) => ("-".to_string(), format!("exempt: {}", reason)),
        };
        println!("{:<24} {:>10} {:>10} {:>10}  {}", name, class, resolved, keepbits, outcome);

        if args.detailed {
            if let Some(curve) = &var.curve {
                let bits: Vec<String> = curve
                    .mantissa_positions()
                    .map(|(pos, info)| format!("{}:{:.3}", pos, info))
                    .collect();
                println!("    mantissa information: {}", bits.join(" "));
            }
        }
    }
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = container::read_file(&args.input)?;

    if args.json {
        let output = InfoOutput {
            path: args.input.display().to_string(),
            dimensions: dataset.dimensions(),
            variables: dataset
                .variables()
                .iter()
                .map(|(name, var)| InfoVariable {
                    name,
                    dtype: var.dtype().to_string(),
                    dims: var.dims(),
                    shape: var.shape(),
                })
                .collect(),
            attributes: dataset.attrs(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Dataset file: {}", args.input.display());
    println!("Dimensions:");
    for (name, size) in dataset.dimensions() {
        println!("  {}: {}", name, size);
    }
    println!();
    println!("Variables: {}", dataset.variables().len());
    println!("{:<24} {:>6} {:>24} {:>20}", "Name", "DType", "Dims", "Shape");
    println!("{}", "-".repeat(77));
    for (name, var) in dataset.variables() {
        println!(
            "{:<24} {:>6} {:>24} {:>20}",
            name,
            var.dtype(),
            format!("({})", var.dims().join(", ")),
            format_shape(var.shape())
        );
    }

    if !dataset.attrs().is_empty() {
        println!();
        println!("Attributes:");
        for (key, value) in dataset.attrs() {
            println!("  {}: {}", key, value);
        }
    }
    Ok(())
}

fn run_completions(args: CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "bitpress", &mut io::stdout());
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Compress(args) => run_compress(args, cli.verbose),
        Commands::Decompress(args) => run_decompress(args, cli.verbose),
        Commands::Verify(args) => run_verify(args),
        Commands::Analyze(args) => run_analyze(args),
        Commands::Info(args) => run_info(args),
        Commands::Completions(args) => {
            run_completions(args);
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
