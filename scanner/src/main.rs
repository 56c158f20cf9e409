use clap::Parser;
use std::path::PathBuf;

use bufscan::aggregate::EntryPoint;
use bufscan::config::{AnalysisConfig, StageVariant};
use bufscan::pipeline::{read_file_list, AnalysisInput, Analyzer};
use bufscan::source::IncludeExpander;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, clap::ValueEnum)]
enum Emit {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "bufscan",
    version,
    about = "Reconciles shader buffer layouts with host structs and reports register conflicts"
)]
struct Cli {
    /// File listing shader sources, one path per line
    #[arg(long)]
    shaders: Option<PathBuf>,

    /// File listing host (C++) sources, one path per line
    #[arg(long)]
    host: Option<PathBuf>,

    /// Entry-point JSON: [{ "feature", "stage", "declarations", "unit"? }]
    #[arg(long)]
    entries: Option<PathBuf>,

    /// Analysis config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shader include directory (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Shader define, NAME or NAME=VALUE (repeatable)
    #[arg(short = 'D', long = "define")]
    define: Vec<String>,

    /// Stage pass STAGE[:NAME,NAME=VALUE] (repeatable); replaces the configured sweep
    #[arg(long = "variant")]
    variant: Vec<StageVariant>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Text)]
    emit: Emit,

    /// Exit with status 1 on error conflicts or error diagnostics
    #[arg(long)]
    fail_on_conflict: bool,

    /// Print phases and timing
    #[arg(long)]
    verbose: bool,
}

fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("bufscan: error: {}", msg);
    std::process::exit(2);
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ── Load inputs ──
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path).unwrap_or_else(|e| fatal(e)),
        None => AnalysisConfig::default(),
    };
    if !cli.variant.is_empty() {
        config.variants = cli.variant.clone();
    }
    let shader_files = match &cli.shaders {
        Some(path) => read_file_list(path).unwrap_or_else(|e| fatal(e)),
        None => Vec::new(),
    };
    let host_files = match &cli.host {
        Some(path) => read_file_list(path).unwrap_or_else(|e| fatal(e)),
        None => Vec::new(),
    };
    let entries = cli.entries.as_ref().map(|path| {
        let text = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fatal(format!("{}: {}", path.display(), e)));
        serde_json::from_str::<Vec<EntryPoint>>(&text)
            .unwrap_or_else(|e| fatal(format!("{}: {}", path.display(), e)))
    });

    if cli.verbose {
        eprintln!(
            "bufscan: {} shader files, {} host files",
            shader_files.len(),
            host_files.len()
        );
    }

    let mut expander = IncludeExpander::new();
    for dir in &cli.include {
        expander = expander.include_dir(dir);
    }
    for spec in &cli.define {
        expander = expander.define_spec(spec);
    }

    let input = AnalysisInput {
        shader_files,
        host_files,
        entries,
    };

    // ── Run ──
    let analyzer = Analyzer::new(config).with_shader_preprocessor(Box::new(expander));
    let report = analyzer.run(&input).unwrap_or_else(|e| fatal(e));

    match cli.emit {
        Emit::Text => println!("{}", report.render_text()),
        Emit::Json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => fatal(e),
        },
    }

    if cli.fail_on_conflict && report.has_errors() {
        std::process::exit(1);
    }
}
