use clap::Parser;
use reassort_mapper::{MapperConfig, MappingPaths, run};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Map reassortment events detected on one tree onto the matching clades of
/// another, differently labeled tree of the same samples.
#[derive(Parser, Debug)]
#[command(name = "reassort-mapper", version, about = "Map reassortment events between phylogenies")]
struct Args {
    /// Reassortment summary JSON keyed by source node label
    summary_json: PathBuf,

    /// Newick tree the summary refers to
    source_tree: PathBuf,

    /// Newick tree to annotate
    target_tree: PathBuf,

    /// Output path for the target tree with every internal node labeled
    labeled_tree: PathBuf,

    /// Output path for the node-data JSON
    node_data: PathBuf,

    /// Optional event table (CSV, or TSV when the path ends in .tsv)
    #[arg(long = "table")]
    table: Option<PathBuf>,

    /// Minimum reassortment probability for an event to be mapped
    #[arg(long = "confidence-threshold", default_value_t = 0.95)]
    confidence_threshold: f64,

    /// Log every resolution step
    #[arg(long = "debug", default_value_t = false)]
    debug: bool,

    /// Quiet mode: only warnings and errors
    #[arg(short = 'q', long = "quiet", default_value_t = false, conflicts_with = "debug")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.debug {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = MapperConfig {
        confidence_threshold: args.confidence_threshold,
        debug: args.debug,
        ..Default::default()
    };
    let paths = MappingPaths {
        summary: args.summary_json,
        source_tree: args.source_tree,
        target_tree: args.target_tree,
        labeled_tree: args.labeled_tree,
        node_data: args.node_data,
        table: args.table,
    };

    let t0 = Instant::now();
    match run(&paths, &config) {
        Ok(mapped) => info!(
            "Mapped {} of {} events onto {} nodes in {:.3}s",
            mapped.stats.mapped(),
            mapped.stats.eligible,
            mapped.report.len(),
            t0.elapsed().as_secs_f64()
        ),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
