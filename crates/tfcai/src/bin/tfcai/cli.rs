//! tfcai cli interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfcai ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[clap(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the config file
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// YAML config file
    #[clap(long = "config", global(true), env = "TFCAI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Default project for resources that do not name one
    #[clap(long = "project", global(true))]
    pub project: Option<String>,

    /// Ancestry path of --project, e.g. organizations/123/folders/456
    #[clap(long = "ancestry-path", global(true), requires("project"))]
    pub ancestry_path: Option<String>,

    /// Seed the ancestry cache, e.g. folders/456=organizations/123/folders/456
    ///
    /// Can be specified multiple times. A key without prefix is a project id.
    #[clap(long = "ancestry", global(true), value_name = "KEY=PATH")]
    pub ancestry: Vec<String>,

    /// Never call the resource manager, unknown ancestry fails
    #[clap(long = "offline", global(true))]
    pub offline: bool,

    /// Also convert resources without changes
    #[clap(long = "convert-unchanged", global(true))]
    pub convert_unchanged: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a plan into ancestry-annotated assets
    ///
    /// Expects the output of `terraform show -json <planfile>`
    Convert(ConvertCommand),

    /// Resolve the ancestry of one locator
    Ancestry(AncestryCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ConvertCommand {
    /// Plan in JSON format
    pub plan: PathBuf,

    /// Read field expressions from the .tf files in this directory
    /// instead of the plan's configuration
    #[clap(long = "hcl-dir")]
    pub hcl_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct AncestryCommand {
    /// projects/<id>, folders/<id> or organizations/<id>
    pub locator: String,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Parsed change records of a plan
    Changes { plan: PathBuf },
    /// Field expressions found in a plan or a directory of .tf files
    Expressions { source: PathBuf },
    /// Ancestry cache after seeding
    Cache,
}
