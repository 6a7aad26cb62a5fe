mod cli;

use crate::cli::Arguments;
use kiln::{
    cmake,
    data::Description,
    target::{Generation, TargetDescriptor},
    toolchain::{profile::Platform, Toolchain},
};

use std::{
    env,
    path::PathBuf,
    process::{exit, Command},
};

use anyhow::{bail, Context, Result};
use log::{error, info, LevelFilter};

/// Environment variable overriding the log filter.
const LOG_VARIABLE: &str = "KILN_LOG";

fn main() {
    initialize_logger();
    let arguments = match Arguments::parse_lenient(raw_arguments()) {
        Ok(a) => a,
        Err(e) => e.exit(),
    };

    let platform = match Platform::host() {
        Some(p) => p,
        None => {
            error!("This platform is not supported");
            exit(-1);
        }
    };

    if let Err(e) = run(platform, &arguments) {
        error!("{:#}", e);
        exit(-1);
    }
}

fn initialize_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = env::var(LOG_VARIABLE) {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn run(platform: Platform, arguments: &Arguments) -> Result<()> {
    let selection = cli::select(&arguments.tokens);
    let description = Description::load(&arguments.description)?;
    let toolchain = Toolchain::resolve(platform, &description.toolchain)?;

    if arguments.deps {
        for dependency in &description.dependency {
            cmake::build_dependency(dependency, selection.options.configuration)
                .with_context(|| format!("Failed to build dependency {}", dependency.source_dir))?;
        }
    }

    let mut target =
        TargetDescriptor::from_definition(&description.target, platform, selection.options);
    target.set_description_path(&arguments.description);

    let program = env::current_exe()
        .context("Failed to locate the running executable")?
        .to_string_lossy()
        .into_owned();
    let args: Vec<String> = raw_arguments().skip(1).collect();
    let generation = Generation {
        root: PathBuf::from("."),
        build_file: arguments.output.clone(),
        regenerate_command: cli::regenerate_command(platform, &program, &args),
        generator: Some(program),
    };
    target.generate(&toolchain, &generation, selection.static_analysis)?;

    if arguments.run {
        run_ninja(&arguments.output)?;
    }
    Ok(())
}

fn raw_arguments() -> impl Iterator<Item = String> {
    env::args_os().map(|a| a.to_string_lossy().into_owned())
}

fn run_ninja(build_file: &str) -> Result<()> {
    info!("Running ninja");
    let status = Command::new("ninja")
        .args(&["-f", build_file])
        .status()
        .context("Failed to spawn ninja")?;

    if !status.success() {
        bail!("ninja failed with {}", status);
    }
    Ok(())
}
