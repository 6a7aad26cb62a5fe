use super::{
    locator::{Locator, ToolchainLocation},
    profile::{profile_for, Platform, ToolchainProfile},
};
use crate::data::ToolchainSection;

use anyhow::{Context, Result};
use log::info;

/// The toolchain one generation run uses: a profile plus resolved binaries
/// and the directories the platform always needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub profile: &'static ToolchainProfile,
    pub compiler: String,
    pub linker: String,

    /// Appended after every include directory the target declares.
    pub include_directories: Vec<String>,

    /// Appended after every library directory the target declares.
    pub library_directories: Vec<String>,
}

impl Toolchain {
    /// Creates a toolchain that invokes the profile's binaries by name.
    pub fn new(profile: &'static ToolchainProfile) -> Toolchain {
        Toolchain {
            profile,
            compiler: profile.compiler.to_owned(),
            linker: profile.linker.to_owned(),
            include_directories: vec![],
            library_directories: vec![],
        }
    }

    /// Creates a toolchain from discovered MSVC and Windows SDK paths.
    pub fn from_location(profile: &'static ToolchainProfile, location: &ToolchainLocation) -> Toolchain {
        let display = |p: &std::path::PathBuf| p.display().to_string();
        Toolchain {
            profile,
            compiler: display(&location.compiler),
            linker: display(&location.linker),
            include_directories: location.include_directories.iter().map(display).collect(),
            library_directories: location.library_directories.iter().map(display).collect(),
        }
    }

    /// Resolves the toolchain for a platform, locating MSVC where it is not on `PATH`.
    pub fn resolve(platform: Platform, overrides: &ToolchainSection) -> Result<Toolchain> {
        let profile = profile_for(platform);
        let mut toolchain = match platform {
            Platform::Unix => Toolchain::new(profile),
            Platform::Windows => {
                let location = Locator::default()
                    .locate()
                    .context("Failed to locate the MSVC toolchain")?;
                Toolchain::from_location(profile, &location)
            }
        };

        if let Some(compiler) = &overrides.compiler {
            info!("Using compiler {} from the build description", compiler);
            toolchain.compiler = compiler.clone();
        }
        if let Some(linker) = &overrides.linker {
            info!("Using linker {} from the build description", linker);
            toolchain.linker = linker.clone();
        }

        Ok(toolchain)
    }
}
