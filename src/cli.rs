//! Defines command-line interface options using `clap` for the smn-tools application.

use clap::{Args as ClapArgs, Parser, Subcommand};
use smn_tools::model::Model;
use std::path::PathBuf;

/// Extract, normalise and merge ETA/WRF forecast variables into NetCDF
#[derive(Parser, Debug)]
#[command(name = "smn-tools", version, about = "ETA/WRF GRIB to CF NetCDF processing")]
pub struct Args {
    /// Number of threads for concurrent extraction. Defaults to number of CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract variable groups from GRIB files into per-lead-time NetCDF files
    Extract {
        /// Model that produced the files (ETA or WRF)
        #[arg(short, long)]
        model: Model,

        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Variable groups, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "tp,level_vars,wind10m,t2m,r2m,ssrd,mslp")]
        groups: Vec<String>,

        /// GRIB files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Rename, clean and concatenate the per-lead-time files of one variable
    Process {
        /// Prefix of the output file, `<prefix>_tmp_<var>.nc`
        #[arg(short, long)]
        prefix: String,

        /// Output dimension names, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "time,lat,lon")]
        dims: Vec<String>,

        /// Per-lead-time files of one variable
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Merge processed variable files into one file
    Merge {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        metadata: MetadataArgs,

        /// Processed variable files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete NetCDF files from a directory
    Clean {
        dir: PathBuf,
    },

    /// Run the whole chain for one forecast run
    Run(RunArgs),

    /// Describe a NetCDF file
    Inspect {
        file: PathBuf,

        /// Also print min/mean/max for this variable
        #[arg(long)]
        summary: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct MetadataArgs {
    /// Value of the `institution` global attribute
    #[arg(long, default_value = "SENAMHI")]
    pub institution: String,

    /// Value of the `source` global attribute, deduced from the output name if absent
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// JSON run file; the flags below override its fields
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding one sub-directory per model
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Model directory name, e.g. PERU_WRF22
    #[arg(long)]
    pub model_name: Option<String>,

    /// Run initialisation time, YYYYMMDDHH
    #[arg(long)]
    pub run: Option<String>,

    /// Variable groups, comma separated
    #[arg(long, value_delimiter = ',')]
    pub groups: Option<Vec<String>>,

    /// Work directory for intermediate files
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let args = Args::parse_from([
            "smn-tools",
            "--threads",
            "4",
            "run",
            "--data-root",
            "/data",
            "--model-name",
            "PERU_ETA22",
            "--run",
            "2025010106",
            "--groups",
            "tp,t2m",
        ]);
        assert_eq!(args.threads, Some(4));
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.groups, Some(vec!["tp".to_string(), "t2m".to_string()]));
                assert_eq!(run.model_name.as_deref(), Some("PERU_ETA22"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn process_dims_default_to_surface() {
        let args = Args::parse_from(["smn-tools", "process", "-p", "sfc", "t2m_003.nc", "t2m_006.nc"]);
        match args.command {
            Command::Process { prefix, dims, files } => {
                assert_eq!(prefix, "sfc");
                assert_eq!(dims, vec!["time", "lat", "lon"]);
                assert_eq!(files.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
