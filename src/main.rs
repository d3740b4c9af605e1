//! Entry point for the smn-tools application.
//! Handles CLI parsing, logging setup, and dispatches each subcommand to the library.

use clap::Parser;
use smn_tools::clean::clean_outdir;
use smn_tools::extract::{extract_many, FileExtraction};
use smn_tools::grib::GribFile;
use smn_tools::inspect::{describe_file, summarize_variable};
use smn_tools::merge::{merge_files, MergeMetadata};
use smn_tools::model::VariableGroup;
use smn_tools::parallel::{get_parallel_info, ParallelConfig};
use smn_tools::pipeline::{self, RunConfig};
use smn_tools::process::process_netcdf_files;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, Command, RunArgs};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    ParallelConfig::new(args.threads).setup_global_pool()?;
    get_parallel_info().log();

    match args.command {
        Command::Extract {
            model,
            out_dir,
            groups,
            files,
        } => {
            let groups = VariableGroup::parse_list(&groups);
            let outcomes = extract_many(model, &files, &out_dir, &groups, |path| {
                GribFile::open(path)
            });
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            let extractions: Vec<_> = outcomes
                .iter()
                .filter_map(|o: &FileExtraction| o.result.as_ref().ok())
                .collect();
            let written: usize = extractions.iter().map(|e| e.written.len()).sum();
            let skipped: usize = extractions.iter().map(|e| e.failures.len()).sum();
            tracing::info!(files = files.len(), written, skipped, failed, "extraction finished");
            if failed > 0 {
                return Err(format!("{} of {} files failed to extract", failed, files.len()).into());
            }
            if skipped > 0 {
                return Err(format!("{} variables could not be extracted", skipped).into());
            }
        }
        Command::Process {
            prefix,
            dims,
            files,
        } => {
            let path = process_netcdf_files(&files, &prefix, &dims)?;
            println!("{}", path.display());
        }
        Command::Merge {
            output,
            metadata,
            files,
        } => {
            let metadata = MergeMetadata {
                institution: metadata.institution,
                source: metadata.source,
            };
            let path = merge_files(&files, &output, &metadata)?;
            println!("{}", path.display());
        }
        Command::Clean { dir } => {
            let removed = clean_outdir(&dir)?;
            println!("Removed {} files from {}", removed.len(), dir.display());
        }
        Command::Run(run_args) => {
            let json = run_args.json;
            let config = run_config(run_args)?;
            let summary = pipeline::run(&config)?;
            if json {
                println!("{}", summary.to_json()?);
            } else {
                for path in &summary.merged {
                    println!("{}", path.display());
                }
            }
            if !summary.failures.is_empty() {
                return Err(format!("{} steps failed", summary.failures.len()).into());
            }
        }
        Command::Inspect { file, summary } => {
            println!("{}", describe_file(&file)?);
            if let Some(var) = summary {
                let s = summarize_variable(&file, &var)?;
                println!("\nSummary for {}", s.name);
                println!("  valid: {}, missing: {}", s.valid, s.missing);
                println!("  min: {}, max: {}, mean: {:.2}", s.min, s.max, s.mean);
            }
        }
    }

    Ok(())
}

/// Run file (if any) with command-line overrides applied
fn run_config(args: RunArgs) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => {
            let (Some(root), Some(name), Some(run)) = (&args.data_root, &args.model_name, &args.run)
            else {
                return Err("--data-root, --model-name and --run are required without --config".into());
            };
            RunConfig::new(root, name, run)
        }
    };
    if let Some(root) = args.data_root {
        config.data_root = root;
    }
    if let Some(name) = args.model_name {
        config.model_name = name;
    }
    if let Some(run) = args.run {
        config.run = run;
    }
    if let Some(groups) = args.groups {
        config.groups = groups;
    }
    if args.out_dir.is_some() {
        config.out_dir = args.out_dir;
    }
    config.validate()?;
    Ok(config)
}
