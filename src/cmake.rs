//! Contains operations for `cmake`, used to build dependencies before generation.

use crate::{data::DependencyDefinition, toolchain::profile::Configuration};

use std::{
    collections::BTreeMap,
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use log::{debug, info};

/// An abstraction of a CMake project with separate source and binary directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMakeProject {
    source_dir: String,
    binary_dir: String,
    generator: Option<String>,
    configuration: Option<Configuration>,
    variables: BTreeMap<String, String>,
}

impl CMakeProject {
    pub fn new(source_dir: impl Into<String>, binary_dir: impl Into<String>) -> CMakeProject {
        CMakeProject {
            source_dir: source_dir.into(),
            binary_dir: binary_dir.into(),
            generator: None,
            configuration: None,
            variables: BTreeMap::new(),
        }
    }

    /// Creates a project from `[[dependency]]`.
    pub fn from_definition(definition: &DependencyDefinition, configuration: Configuration) -> CMakeProject {
        CMakeProject {
            source_dir: definition.source_dir.clone(),
            binary_dir: definition.binary_dir.clone(),
            generator: definition.generator.clone(),
            configuration: Some(configuration),
            variables: definition.variables.clone(),
        }
    }

    pub fn generator(mut self, generator: impl Into<String>) -> CMakeProject {
        self.generator = Some(generator.into());
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> CMakeProject {
        self.configuration = Some(configuration);
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> CMakeProject {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Arguments of `cmake -S .. -B ..`.
    pub fn configure_arguments(&self) -> Vec<String> {
        let mut args = vec![format!("-S{}", self.source_dir), format!("-B{}", self.binary_dir)];
        if let Some(generator) = &self.generator {
            args.push(format!("-G{}", generator));
        }
        if let Some(configuration) = self.configuration {
            args.push(format!("-DCMAKE_BUILD_TYPE={}", configuration.cmake_name()));
        }
        for (key, value) in &self.variables {
            args.push(format!("-D{}={}", key, value));
        }
        args
    }

    /// Arguments of `cmake --build ..`.
    pub fn build_arguments(&self) -> Vec<String> {
        let mut args = vec!["--build".to_owned(), self.binary_dir.clone()];
        self.push_config(&mut args);
        args
    }

    /// Arguments of `cmake --install .. --prefix ..`.
    pub fn install_arguments(&self, prefix: &str) -> Vec<String> {
        let mut args = vec![
            "--install".to_owned(),
            self.binary_dir.clone(),
            "--prefix".to_owned(),
            prefix.to_owned(),
        ];
        self.push_config(&mut args);
        args
    }

    pub fn configure(&self) -> Result<()> {
        info!("Configuring {}", self.source_dir);
        run(&self.configure_arguments())
    }

    pub fn build(&self) -> Result<()> {
        info!("Building {}", self.binary_dir);
        run(&self.build_arguments())
    }

    pub fn install(&self, prefix: &str) -> Result<()> {
        info!("Installing {} into {}", self.binary_dir, prefix);
        run(&self.install_arguments(prefix))
    }

    fn push_config(&self, args: &mut Vec<String>) {
        if let Some(configuration) = self.configuration {
            args.push("--config".to_owned());
            args.push(configuration.cmake_name().to_owned());
        }
    }
}

/// Configures, builds and installs a dependency.
pub fn build_dependency(definition: &DependencyDefinition, configuration: Configuration) -> Result<()> {
    let project = CMakeProject::from_definition(definition, configuration);
    project.configure()?;
    project.build()?;
    project.install(&definition.install_prefix)?;
    Ok(())
}

fn run(args: &[String]) -> Result<()> {
    debug!("Executing cmake with {:?}", args);
    let status = Command::new("cmake")
        .stdin(Stdio::null())
        .args(args)
        .status()
        .context("Failed to spawn cmake")?;

    if !status.success() {
        bail!("cmake {} failed with {}", args.join(" "), status);
    }
    Ok(())
}
