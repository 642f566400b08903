use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use refinery_core::{PipelineConfig, Result, UNKNOWN_SOURCE_FILE};
use refinery_pipeline::ExtractionPipeline;

mod input;
mod report;

use report::RunReport;

/// Ground, deduplicate, score and link raw extraction items against the
/// document they were extracted from.
#[derive(Debug, Parser)]
#[command(name = "refinery", version)]
struct Args {
    /// Source document the items were extracted from
    #[arg(long, env = "REFINERY_SOURCE")]
    source: PathBuf,

    /// JSON array of extraction items
    #[arg(long, env = "REFINERY_ITEMS")]
    items: PathBuf,

    /// JSON pipeline configuration; omitted keys keep their defaults
    #[arg(long, env = "REFINERY_CONFIG")]
    config: Option<PathBuf>,

    /// File name stamped on every item (defaults to the source's file name)
    #[arg(long, env = "REFINERY_SOURCE_FILE")]
    source_file: Option<String>,

    /// Also emit the knowledge-graph projection
    #[arg(long, env = "REFINERY_KG")]
    kg: bool,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refinery=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Refinery run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.kg {
        config.kg_injection = true;
    }

    let source_text = fs::read_to_string(&args.source)?;
    let items = input::parse_items(&fs::read_to_string(&args.items)?)?;
    let source_file = args.source_file.clone().or_else(|| {
        args.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    });

    tracing::info!(
        source = %args.source.display(),
        items = items.len(),
        kg = config.kg_injection,
        "Starting refinery run"
    );

    let pipeline = ExtractionPipeline::new(source_text, source_file.clone(), config)?;
    let result = pipeline.process(&items);

    let report = RunReport::new(
        source_file.unwrap_or_else(|| UNKNOWN_SOURCE_FILE.to_string()),
        result,
    );
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            tracing::info!(output = %path.display(), run_id = %report.run_id, "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
