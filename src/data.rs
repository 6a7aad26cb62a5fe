//! Contains structs for `build.toml`.

use crate::toolchain::profile::Platform;

use std::{collections::BTreeMap, fs::read_to_string, path::Path};

use anyhow::{Context, Result};
use relative_path::RelativePathBuf;
use serde::Deserialize;
use toml::from_str;

/// The whole build description.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Description {
    pub target: TargetDefinition,

    #[serde(default)]
    pub toolchain: ToolchainSection,

    #[serde(default)]
    pub dependency: Vec<DependencyDefinition>,
}

impl Description {
    /// Reads and parses a description file.
    pub fn load(path: impl AsRef<Path>) -> Result<Description> {
        let path = path.as_ref();
        let text = read_to_string(path)
            .with_context(|| format!("Failed to read build description {}", path.display()))?;
        Description::parse(&text)
            .with_context(|| format!("Failed to parse build description {}", path.display()))
    }

    /// Parses description text.
    pub fn parse(text: &str) -> Result<Description> {
        let description = from_str(text)?;
        Ok(description)
    }
}

/// `[target]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetDefinition {
    pub name: String,
    pub sources: Vec<RelativePathBuf>,

    #[serde(default)]
    pub shaders: Vec<RelativePathBuf>,

    #[serde(flatten)]
    pub settings: Settings,

    /// `[target.unix]`
    #[serde(default)]
    pub unix: Settings,

    /// `[target.windows]`
    #[serde(default)]
    pub windows: Settings,
}

impl TargetDefinition {
    /// Returns the settings shared by every platform followed by the platform's own.
    pub fn settings_for(&self, platform: Platform) -> [&Settings; 2] {
        let specific = match platform {
            Platform::Unix => &self.unix,
            Platform::Windows => &self.windows,
        };
        [&self.settings, specific]
    }
}

/// Options that can be given for all platforms or for one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    pub compile_options: Vec<String>,
    pub link_options: Vec<String>,
    pub defines: Vec<String>,
    pub include_directories: Vec<String>,
    pub link_directories: Vec<String>,
    pub link_libraries: Vec<String>,
}

/// `[toolchain]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    pub compiler: Option<String>,
    pub linker: Option<String>,
}

/// `[[dependency]]`, a CMake project built before generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DependencyDefinition {
    pub source_dir: String,
    pub binary_dir: String,
    pub install_prefix: String,
    pub generator: Option<String>,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"
        [target]
        name = "vulkan-scene"
        sources = ["src/main.c", "src/device.c"]
        shaders = ["shaders/scene.vert"]
        include-directories = ["deps/include"]
        link-directories = ["deps/lib"]

        [target.unix]
        link-libraries = ["vulkan"]

        [target.windows]
        link-libraries = ["vulkan-1.lib"]

        [toolchain]
        compiler = "clang"

        [[dependency]]
        source-dir = "deps/Vulkan-Loader"
        binary-dir = "deps/Vulkan-Loader/build"
        install-prefix = "deps/Vulkan-Loader/build/install"
        variables = { UPDATE_DEPS = "true" }
    "#;

    #[test]
    fn parses_full_description() {
        let description = Description::parse(DESCRIPTION).unwrap();
        let target = &description.target;
        assert_eq!(target.name, "vulkan-scene");
        assert_eq!(target.sources.len(), 2);
        assert_eq!(target.sources[1].as_str(), "src/device.c");
        assert_eq!(target.shaders[0].as_str(), "shaders/scene.vert");
        assert_eq!(target.settings.include_directories, vec!["deps/include"]);
        assert_eq!(target.unix.link_libraries, vec!["vulkan"]);
        assert_eq!(target.windows.link_libraries, vec!["vulkan-1.lib"]);
        assert_eq!(description.toolchain.compiler.as_deref(), Some("clang"));
        assert_eq!(description.toolchain.linker, None);

        let dependency = &description.dependency[0];
        assert_eq!(dependency.generator, None);
        assert_eq!(dependency.variables["UPDATE_DEPS"], "true");
    }

    #[test]
    fn platform_settings_follow_common_settings() {
        let description = Description::parse(DESCRIPTION).unwrap();
        let [common, specific] = description.target.settings_for(Platform::Windows);
        assert_eq!(common.link_directories, vec!["deps/lib"]);
        assert_eq!(specific.link_libraries, vec!["vulkan-1.lib"]);
    }

    #[test]
    fn minimal_description_uses_defaults() {
        let description = Description::parse(
            r#"
            [target]
            name = "app"
            sources = ["src/a.c"]
            "#,
        )
        .unwrap();
        assert!(description.target.shaders.is_empty());
        assert!(description.target.unix.link_libraries.is_empty());
        assert!(description.dependency.is_empty());
    }

    #[test]
    fn missing_sources_are_rejected() {
        assert!(Description::parse("[target]\nname = \"app\"\n").is_err());
    }
}
