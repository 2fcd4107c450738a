mod cli;

use anyhow::Context;
use tfcai::ancestry::registry::Registry;
use tfcai::config::Config;
use tfcai::expression::ExpressionIndex;
use tfcai::locator::Locator;
use tfcai::pipeline::Pipeline;
use tfcai::plan::{ChangeSet, ReadOptions};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFCAI_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = config(&cli.settings).and_then(|config| match cli.command {
        cli::Command::Convert(convert_cli) => convert(&config, convert_cli),
        cli::Command::Ancestry(ancestry_cli) => ancestry(&config, ancestry_cli),
        cli::Command::Dev(dev_cli) => dev(&config, dev_cli),
    });

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

/// Config file with the command line applied on top
fn config(settings: &cli::SettingsArgs) -> anyhow::Result<Config> {
    let mut config = match &settings.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    if settings.project.is_some() {
        config.project = settings.project.clone();
    }
    config.offline |= settings.offline;
    config.convert_unchanged |= settings.convert_unchanged;

    for entry in &settings.ancestry {
        let (key, path) = tfcai::config::parse_seed(entry)?;
        config.seed(key, path);
    }
    if let (Some(project), Some(path)) = (&settings.project, &settings.ancestry_path) {
        config.seed(project.as_str(), path.as_str());
    }

    Ok(config)
}

pub fn convert(config: &Config, cli: cli::ConvertCommand) -> anyhow::Result<()> {
    let options = ReadOptions {
        convert_unchanged: config.convert_unchanged,
    };
    let changes = ChangeSet::from_path(&cli.plan, options)?;

    let expressions = match (&cli.hcl_dir, &changes.configuration) {
        (Some(dir), _) => ExpressionIndex::load_directory(dir)?,
        (None, Some(configuration)) => ExpressionIndex::from_configuration(configuration)?,
        (None, None) => {
            tracing::warn!("plan has no configuration, unknown fields cannot be traced");
            ExpressionIndex::default()
        }
    };

    let pipeline = Pipeline::new(Registry::builtin(), config.resolver());
    let consolidation = pipeline.run(&changes, &expressions)?;

    output(&cli.output, &consolidation)
}

pub fn ancestry(config: &Config, cli: cli::AncestryCommand) -> anyhow::Result<()> {
    let locator = Locator::from_seed_key(&cli.locator)
        .with_context(|| format!("invalid locator {:?}", cli.locator))?;
    let chain = config.resolver().resolve(&locator)?;

    output(&cli.output, &chain)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (tfcai-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(config: &Config, cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Changes { plan } => {
            let options = ReadOptions {
                convert_unchanged: config.convert_unchanged,
            };
            let changes = ChangeSet::from_path(&plan, options)?;
            serde_yaml::to_writer(std::io::stdout(), &changes.changes)?;
        }
        Expressions { source } => {
            let expressions = if source.is_dir() {
                ExpressionIndex::load_directory(&source)?
            } else {
                let changes = ChangeSet::from_path(&source, ReadOptions::default())?;
                let configuration = changes
                    .configuration
                    .context("plan has no configuration")?;
                ExpressionIndex::from_configuration(&configuration)?
            };
            println!("{expressions:#?}");
        }
        Cache => serde_yaml::to_writer(std::io::stdout(), &config.cache().snapshot())?,
    }

    Ok(())
}
