//! The command line interface for gridplan.
use crate::input::load_model;
use crate::log;
use crate::output::{create_output_directory, get_output_dir};
use crate::run::{RunOptions, run, sweep};
use crate::settings::Settings;
use crate::sweep::SweepParameter;
use ::log::{info, warn};
use anyhow::{Context, Result, ensure};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for gridplan.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run and sweep commands
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write additional information to CSV files
    #[arg(long)]
    pub debug_model: bool,
    /// Whether to export each solved network to a folder of CSV files
    #[arg(long)]
    pub export_network: bool,
}

/// Options for the sweep command, which override the model's `[sweep]` section
#[derive(Args, Default)]
pub struct SweepOpts {
    /// The parameter to vary (co2_limit or transmission_cost)
    #[arg(long, value_parser = parse_sweep_parameter)]
    pub parameter: Option<SweepParameter>,
    /// Comma-separated values for the parameter
    #[arg(long, value_delimiter = ',')]
    pub values: Option<Vec<f64>>,
}

/// Parse the name of a sweep parameter from the command line
fn parse_sweep_parameter(name: &str) -> Result<SweepParameter, String> {
    SweepParameter::from_name(name)
        .ok_or_else(|| format!("Unknown sweep parameter '{name}'"))
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Optimise a model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Run a sensitivity sweep for a model.
    Sweep {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// The parameter and its values
        #[command(flatten)]
        sweep_opts: SweepOpts,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example models.
    Example {
        /// The available subcommands for managing example models.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts, None),
            Self::Sweep {
                model_dir,
                sweep_opts,
                opts,
            } => handle_sweep_command(&model_dir, &sweep_opts, &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start gridplan
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ gridplan --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Prepare the output folder and logger for a command which writes results.
///
/// # Returns
///
/// The output folder and the options for writing results
fn prepare_output(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<(PathBuf, RunOptions)> {
    let settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    let debug_model = opts.debug_model || settings.debug_model;
    let allow_overwrite = opts.overwrite || settings.overwrite;
    let export_network = opts.export_network || settings.export_network;

    // Get path to output folder
    let output_path = match &opts.output_dir {
        Some(path) => path.clone(),
        None => get_output_dir(model_path)?,
    };

    let overwrite = create_output_directory(&output_path, allow_overwrite).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    // Initialise program logger
    log::init(Some(&settings.log_level), Some(&output_path))
        .context("Failed to initialise logging.")?;

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let run_opts = RunOptions {
        debug_model,
        export_network,
    };

    Ok((output_path, run_opts))
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let (output_path, run_opts) = prepare_output(model_path, opts, settings)?;

    // Load the model to run
    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    run(&model, &output_path, run_opts)?;
    info!("Optimisation complete!");

    Ok(())
}

/// Handle the `sweep` command.
pub fn handle_sweep_command(
    model_path: &Path,
    sweep_opts: &SweepOpts,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let (output_path, run_opts) = prepare_output(model_path, opts, settings)?;

    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    let parameter = sweep_opts
        .parameter
        .unwrap_or(model.parameters.sweep.parameter);
    let values = sweep_opts
        .values
        .as_deref()
        .unwrap_or(&model.parameters.sweep.values);
    ensure!(!values.is_empty(), "No values given for the sweep");

    let points = sweep(&model, parameter, values, &output_path, run_opts)?;
    let solved = points.iter().filter(|point| point.outcome.is_ok()).count();
    info!("Sweep complete! {solved} of {} points solved", points.len());

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;

    // Load/validate the model
    let model = load_model(model_path).context("Failed to validate model.")?;
    info!(
        "Model validation successful! The network has {} buses, {} generators, {} storage units \
        and {} links.",
        model.network.buses().len(),
        model.network.generators().len(),
        model.network.storage_units().len(),
        model.network.links().len()
    );

    Ok(())
}
