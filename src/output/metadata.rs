//! The `metadata.toml` file, recording what produced a results folder.
use crate::model::Model;
use anyhow::{Context, Result, anyhow};
use chrono::Local;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Information about the program build via `built` crate
mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// The short git hash of the build, marked if the working tree had changes
fn git_revision() -> String {
    match (built_info::GIT_COMMIT_HASH_SHORT, built_info::GIT_DIRTY) {
        (Some(hash), Some(true)) => format!("{hash}-dirty"),
        (Some(hash), _) => hash.into(),
        (None, _) => "unknown".into(),
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    model: ModelMetadata<'a>,
    program: ProgramMetadata,
    platform: PlatformMetadata,
}

/// Which command was run on which model, and when
#[derive(Serialize)]
struct RunMetadata<'a> {
    model_path: &'a Path,
    /// `run` or `sweep`
    command: &'a str,
    started: String,
}

/// The size of the model which was optimised
#[derive(Serialize)]
struct ModelMetadata<'a> {
    topology: &'a str,
    snapshots: usize,
    /// The hours represented by all snapshots together
    horizon_hours: f64,
    buses: usize,
    generators: usize,
    storage_units: usize,
    links: usize,
    technologies: usize,
    /// Scenarios applied to the base network, as given in `model.toml`
    scenarios: Vec<String>,
}

impl<'a> ModelMetadata<'a> {
    fn new(model: &'a Model) -> Self {
        let network = &model.network;
        Self {
            topology: model.parameters.topology.kind(),
            snapshots: model.time_series.len(),
            horizon_hours: model.time_series.total_weight().value(),
            buses: network.buses().len(),
            generators: network.generators().len(),
            storage_units: network.storage_units().len(),
            links: network.links().len(),
            technologies: model.technologies.len(),
            scenarios: model
                .parameters
                .scenario
                .scenarios()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// The build of the program
#[derive(Serialize)]
struct ProgramMetadata {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    is_debug: bool,
    rustc_version: &'static str,
    build_time_utc: &'static str,
    git_commit_hash: String,
}

impl ProgramMetadata {
    fn new() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit_hash: git_revision(),
        }
    }
}

/// The machine the program is running on, from [`PlatformInfo`]
#[derive(Serialize)]
struct PlatformMetadata {
    osname: String,
    sysname: String,
    release: String,
    machine: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            osname: info.osname().to_string_lossy().into(),
            sysname: info.sysname().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
        })
    }
}

/// Write `metadata.toml` to the output folder.
///
/// # Arguments
///
/// * `output_path` - Folder where the file will be saved
/// * `model` - The model being run
/// * `command` - The name of the command being run
pub fn write_metadata(output_path: &Path, model: &Model, command: &str) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata {
            model_path: &model.model_dir,
            command,
            started: Local::now().to_rfc2822(),
        },
        model: ModelMetadata::new(model),
        program: ProgramMetadata::new(),
        platform: PlatformMetadata::new()?,
    };
    let file_path = output_path.join(METADATA_FILE_NAME);
    fs::write(&file_path, toml::to_string(&metadata)?)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    Ok(())
}
