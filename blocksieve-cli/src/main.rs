use std::{
    fmt::Write,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use blocksieve_core::{filter::table::TablePolicy, filter_blocks, FilterConfig};
use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod input;
mod output;

use input::{collect_inputs, load_document};
use output::{save_filtered_document, FilterSummary, FilteredDocument};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TablePolicyArg {
    AnySignal,
    RequireBoth,
}

impl From<TablePolicyArg> for TablePolicy {
    fn from(arg: TablePolicyArg) -> Self {
        match arg {
            TablePolicyArg::AnySignal => TablePolicy::AnySignal,
            TablePolicyArg::RequireBoth => TablePolicy::RequireBoth,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Blocksieve - Drop running headers, footers and table text from extracted blocks",
    long_about = "Blocksieve reads block dumps produced by a document extractor and removes the blocks that would pollute a text pipeline: headers and footers repeated across pages, and short table cells."
)]
struct Args {
    /// Block dump files, or directories holding them
    #[arg(required = true, help = "JSON block dumps or directories of dumps")]
    inputs: Vec<PathBuf>,

    /// If not specified, defaults to the current working directory.
    #[arg(
        long,
        env = "BLOCKSIEVE_OUTPUT_DIR",
        help = "Specify the directory to store filtered documents"
    )]
    output_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "BLOCKSIEVE_CONFIG",
        help = "JSON file with filter thresholds"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        help = "How indentation and neighbor signals combine for table detection"
    )]
    table_policy: Option<TablePolicyArg>,

    #[arg(long, help = "Page count of the document (single input only)")]
    num_pages: Option<usize>,

    #[arg(
        long,
        default_value_t = false,
        help = "Write excluded blocks and their reasons next to the kept ones"
    )]
    keep_excluded: bool,

    /// Number of documents filtered in parallel
    #[arg(long, short = 'j', help = "Number of worker threads")]
    jobs: Option<usize>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("blocksieve_cli=info,blocksieve_core=info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<FilterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("can't read config {}", path.display()))?;
            serde_json::from_str::<FilterConfig>(&content)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => FilterConfig::default(),
    };
    if let Some(policy) = args.table_policy {
        config.table.policy = policy.into();
    }
    Ok(config)
}

fn setup_progress_bar(num_docs: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(num_docs as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("#>-"),
    );
    Ok(pb)
}

fn process_file(
    path: &Path,
    args: &Args,
    config: &FilterConfig,
    output_dir: &Path,
) -> anyhow::Result<(PathBuf, FilterSummary)> {
    let doc = load_document(path, args.num_pages)?;

    let start = Instant::now();
    let result = filter_blocks(doc.blocks, doc.num_pages, None, config);
    let duration = start.elapsed();

    let filtered = FilteredDocument::new(&doc.doc_name, &result, args.keep_excluded, duration);
    let file_out = save_filtered_document(&filtered, output_dir)?;
    tracing::info!(
        "filtered {} in {}ms",
        doc.path.display(),
        duration.as_millis()
    );
    Ok((file_out, filtered.summary))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = load_config(&args)?;
    let inputs = collect_inputs(&args.inputs)?;
    if args.num_pages.is_some() && inputs.len() > 1 {
        anyhow::bail!("--num-pages only applies to a single input document");
    }

    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("can't create output dir {}", output_dir.display()))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()?;

    let pb = setup_progress_bar(inputs.len())?;
    let results: Vec<_> = pool.install(|| {
        inputs
            .par_iter()
            .map(|path| {
                let res = process_file(path, &args, &config, &output_dir);
                pb.set_message(input::doc_name(path));
                pb.inc(1);
                (path, res)
            })
            .collect()
    });
    pb.finish_with_message(format!("Filtered {} documents", inputs.len()));

    let mut failures = 0;
    for (path, res) in results {
        match res {
            Ok((file_out, summary)) => println!(
                "{} {}: kept {}, header/footer {}, table {}, malformed {} -> {}",
                "✓".green().bold(),
                path.display(),
                summary.kept,
                summary.header_footer,
                summary.table,
                summary.malformed,
                file_out.display().to_string().cyan().underline()
            ),
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {e:#}", "✗".red().bold(), path.display());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} documents failed", inputs.len());
    }
    Ok(())
}
