//! Contains the target descriptor, which turns one executable target into
//! ninja rules and build statements.

use crate::{
    data::TargetDefinition,
    ninja::{escape, BuildFile, Edge, Rule, Writer},
    script,
    toolchain::{
        profile::{Configuration, Platform, ToolchainProfile},
        Toolchain,
    },
};

use std::{
    borrow::Cow,
    collections::HashSet,
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::create_dir_all,
    io::prelude::*,
    path::PathBuf,
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use relative_path::{Component, RelativePath, RelativePathBuf};

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// Directory object files are placed in, mirroring the source tree.
pub const OBJECT_DIRECTORY: &str = "objects";

/// Description file name used when none is given.
pub const DEFAULT_DESCRIPTION: &str = "build.toml";

/// Define added by the `profile` feature.
pub const PROFILING_DEFINE: &str = "ENABLE_PROFILING";

pub const SHADER_COMPILER: &str = "glslc";
pub const SHADER_EXTENSION: &str = ".spv";

/// Represents a target that cannot be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The target has nothing to compile.
    NoSources { target: String },

    /// The source is absolute or leaves the project directory.
    SourceOutsideProject { source: String },
}

impl Display for TargetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TargetError::NoSources { target } => write!(f, "Target \"{}\" has no sources", target),
            TargetError::SourceOutsideProject { source } => write!(
                f,
                "Source {} is outside the project directory",
                source
            ),
        }
    }
}

impl StdError for TargetError {}

/// Represents one command line option, rendered with the profile's syntax
/// only when a command is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionEntry {
    /// Passed through as written
    Flag(String),

    /// Preprocessor definition, `NAME` or `NAME=VALUE`
    Define(String),

    IncludeDir(String),
    LibraryDir(String),
    Library(String),
}

impl OptionEntry {
    /// Renders this entry for a toolchain.
    pub fn render(&self, profile: &ToolchainProfile) -> String {
        match self {
            OptionEntry::Flag(flag) => flag.clone(),
            OptionEntry::Define(define) => format!("{}{}", profile.define_prefix, define),
            OptionEntry::IncludeDir(path) => format!("{}{}", profile.include_prefix, quote(path)),
            OptionEntry::LibraryDir(path) => {
                format!("{}{}", profile.library_directory_prefix, quote(path))
            }
            OptionEntry::Library(name) => format!("{}{}", profile.library_prefix, name),
        }
    }

    /// Position of this kind of entry on the command line.
    fn rank(&self) -> u8 {
        match self {
            OptionEntry::Flag(_) | OptionEntry::Define(_) => 0,
            OptionEntry::IncludeDir(_) => 1,
            OptionEntry::LibraryDir(_) => 2,
            OptionEntry::Library(_) => 3,
        }
    }
}

/// Optional cross-cutting additions to every compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Build with address and undefined behaviour sanitizers
    pub sanitize: bool,

    /// Define `ENABLE_PROFILING`
    pub profiling: bool,
}

/// Everything chosen once per generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub configuration: Configuration,
    pub features: Features,
}

/// Where and how a target is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Directory relative paths are resolved against; ninja runs here.
    pub root: PathBuf,

    /// Build file name, relative to `root`
    pub build_file: String,

    /// Command that reruns the generator with the arguments of this run
    pub regenerate_command: String,

    /// Generator executable; rebuilding it also regenerates the build file.
    pub generator: Option<String>,
}

/// Files a generation run declares as build outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub objects: Vec<String>,
    pub executable: String,
    pub shaders: Vec<String>,
}

impl Artifacts {
    /// Objects, the executable and compiled shaders, in that order.
    pub fn all(&self) -> Vec<String> {
        let mut all = self.objects.clone();
        all.push(self.executable.clone());
        all.extend(self.shaders.iter().cloned());
        all
    }
}

/// The build specification of one executable.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    name: String,
    options: BuildOptions,
    sources: Vec<RelativePathBuf>,
    shaders: Vec<RelativePathBuf>,
    compile_options: Vec<OptionEntry>,
    link_options: Vec<OptionEntry>,
    description_path: String,
}

impl TargetDescriptor {
    pub fn new(name: impl Into<String>, options: BuildOptions) -> TargetDescriptor {
        TargetDescriptor {
            name: name.into(),
            options,
            sources: vec![],
            shaders: vec![],
            compile_options: vec![],
            link_options: vec![],
            description_path: DEFAULT_DESCRIPTION.to_owned(),
        }
    }

    /// Creates a descriptor from `[target]`, taking the common settings
    /// and then the ones for `platform`.
    pub fn from_definition(
        definition: &TargetDefinition,
        platform: Platform,
        options: BuildOptions,
    ) -> TargetDescriptor {
        let mut target = TargetDescriptor::new(&definition.name, options);
        for source in &definition.sources {
            target.add_source(source);
        }
        for shader in &definition.shaders {
            target.add_shader(shader);
        }

        let settings = definition.settings_for(platform);
        for s in &settings {
            target.add_compile_options(&s.compile_options);
            target.add_link_options(&s.link_options);
            for define in &s.defines {
                target.add_define(define);
            }
        }
        for s in &settings {
            target.add_include_dirs(&s.include_directories);
        }
        for s in &settings {
            target.add_library_directories(&s.link_directories);
        }
        for s in &settings {
            target.link_libraries(&s.link_libraries);
        }

        target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &[RelativePathBuf] {
        &self.sources
    }

    pub fn compile_options(&self) -> &[OptionEntry] {
        &self.compile_options
    }

    pub fn link_options(&self) -> &[OptionEntry] {
        &self.link_options
    }

    /// Sets the description file the build file is regenerated from.
    pub fn set_description_path(&mut self, path: impl Into<String>) {
        self.description_path = path.into();
    }

    /// Appends a source file. Duplicates are not removed.
    pub fn add_source(&mut self, path: impl AsRef<RelativePath>) {
        self.sources.push(path.as_ref().to_owned());
    }

    /// Appends a GLSL shader compiled to SPIR-V next to its source.
    pub fn add_shader(&mut self, path: impl AsRef<RelativePath>) {
        self.shaders.push(path.as_ref().to_owned());
    }

    pub fn add_compile_option(&mut self, flag: impl Into<String>) {
        self.compile_options.push(OptionEntry::Flag(flag.into()));
    }

    pub fn add_compile_options(&mut self, flags: &[impl AsRef<str>]) {
        for flag in flags {
            self.add_compile_option(flag.as_ref());
        }
    }

    pub fn add_link_option(&mut self, flag: impl Into<String>) {
        self.link_options.push(OptionEntry::Flag(flag.into()));
    }

    pub fn add_link_options(&mut self, flags: &[impl AsRef<str>]) {
        for flag in flags {
            self.add_link_option(flag.as_ref());
        }
    }

    pub fn add_define(&mut self, define: impl Into<String>) {
        self.compile_options.push(OptionEntry::Define(define.into()));
    }

    pub fn add_include_dir(&mut self, path: impl Into<String>) {
        self.compile_options.push(OptionEntry::IncludeDir(path.into()));
    }

    pub fn add_include_dirs(&mut self, paths: &[impl AsRef<str>]) {
        for path in paths {
            self.add_include_dir(path.as_ref());
        }
    }

    pub fn add_library_directory(&mut self, path: impl Into<String>) {
        self.link_options.push(OptionEntry::LibraryDir(path.into()));
    }

    pub fn add_library_directories(&mut self, paths: &[impl AsRef<str>]) {
        for path in paths {
            self.add_library_directory(path.as_ref());
        }
    }

    pub fn link_library(&mut self, name: impl Into<String>) {
        self.link_options.push(OptionEntry::Library(name.into()));
    }

    pub fn link_libraries(&mut self, names: &[impl AsRef<str>]) {
        for name in names {
            self.link_library(name.as_ref());
        }
    }

    /// Returns the executable file name.
    pub fn output_name(&self, profile: &ToolchainProfile) -> String {
        format!("{}{}", self.name, profile.executable_extension)
    }

    /// Renders every compile option except input and output.
    pub fn compile_flags(&self, toolchain: &Toolchain) -> String {
        let profile = toolchain.profile;
        let mut parts = vec![
            profile.compile_flags.to_owned(),
            profile.flags(self.options.configuration).compile.to_owned(),
        ];
        if self.options.features.sanitize {
            parts.push(profile.sanitize.compile.to_owned());
        }
        if self.options.features.profiling {
            parts.push(OptionEntry::Define(PROFILING_DEFINE.into()).render(profile));
        }
        parts.extend(ordered(&self.compile_options).map(|o| o.render(profile)));
        parts.extend(
            toolchain
                .include_directories
                .iter()
                .map(|d| OptionEntry::IncludeDir(d.clone()).render(profile)),
        );
        collapse(&parts.join(" "))
    }

    /// Renders every link option except input and output.
    pub fn link_flags(&self, toolchain: &Toolchain) -> String {
        let profile = toolchain.profile;
        let mut parts = vec![profile.flags(self.options.configuration).link.to_owned()];
        if self.options.features.sanitize {
            parts.push(profile.sanitize.link.to_owned());
        }
        parts.extend(ordered(&self.link_options).map(|o| o.render(profile)));
        parts.extend(
            toolchain
                .library_directories
                .iter()
                .map(|d| OptionEntry::LibraryDir(d.clone()).render(profile)),
        );
        collapse(&parts.join(" "))
    }

    /// Returns the `cc` rule command.
    pub fn compile_command(&self, toolchain: &Toolchain, run_static_analysis: bool) -> String {
        let profile = toolchain.profile;
        let flags = escape(&self.compile_flags(toolchain));
        let compile = collapse(&format!(
            "{} {} {}",
            escape(&quote(&toolchain.compiler)),
            flags,
            profile.compile_io
        ));
        if !run_static_analysis {
            return compile;
        }

        let analysis = script::analyzer_invocation(profile, "$in", &flags);
        match profile.platform {
            Platform::Unix => format!("{} && {}", analysis, compile),
            Platform::Windows => format!("cmd /c {} && {}", analysis, compile),
        }
    }

    /// Returns the `ln` rule command.
    pub fn link_command(&self, toolchain: &Toolchain) -> String {
        collapse(&format!(
            "{} {} {}",
            escape(&quote(&toolchain.linker)),
            toolchain.profile.link_io,
            escape(&self.link_flags(toolchain))
        ))
    }

    /// Writes the build file and helper scripts.
    ///
    /// The descriptor is not modified, so generating again with the same
    /// inputs writes the same bytes.
    pub fn generate(
        &self,
        toolchain: &Toolchain,
        generation: &Generation,
        run_static_analysis: bool,
    ) -> Result<Artifacts> {
        let profile = toolchain.profile;
        let mut file = BuildFile::open(generation.root.join(&generation.build_file))?;
        debug!("Writing {}", file.path().display());
        let artifacts = self.emit(file.writer(), toolchain, generation, run_static_analysis)?;

        script::generate_clean_script(&generation.root, profile, &artifacts.all())?;
        if run_static_analysis {
            let sources: Vec<String> = self
                .sources
                .iter()
                .map(|s| render_path(&s.normalize(), profile))
                .collect();
            script::generate_lint_script(
                &generation.root,
                profile,
                &sources,
                &self.compile_flags(toolchain),
            )?;
        }

        file.close()?;
        info!(
            "Generated {} ({} objects, {} shaders)",
            artifacts.executable,
            artifacts.objects.len(),
            artifacts.shaders.len()
        );
        Ok(artifacts)
    }

    /// Writes rules and build statements, creating object directories under `generation.root`.
    pub fn emit<W: Write>(
        &self,
        writer: &mut Writer<W>,
        toolchain: &Toolchain,
        generation: &Generation,
        run_static_analysis: bool,
    ) -> Result<Artifacts> {
        if self.sources.is_empty() {
            return Err(TargetError::NoSources {
                target: self.name.clone(),
            }
            .into());
        }
        let profile = toolchain.profile;
        let objects = self
            .sources
            .iter()
            .map(|s| object_path(s, profile))
            .collect::<Result<Vec<_>, TargetError>>()?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.normalize()) {
                warn!("Source {} is listed more than once", source);
            }
        }

        writer.comment(&format!(
            "Generated by kiln from {}, do not edit.",
            self.description_path
        ))?;
        writer.newline()?;

        writer.rule(
            &Rule::new("regenerate", &generation.regenerate_command)
                .description(format!("Regenerating {}", escape(&generation.build_file)))
                .generator(),
        )?;
        let mut regenerate = Edge::new(
            &generation.build_file,
            "regenerate",
            vec![self.description_path.clone()],
        );
        if let Some(generator) = &generation.generator {
            regenerate = regenerate.implicit(vec![generator.clone()]);
        }
        writer.build(&regenerate)?;
        writer.newline()?;

        writer.rule(&Rule::new("cc", self.compile_command(toolchain, run_static_analysis)))?;
        writer.rule(&Rule::new("ln", self.link_command(toolchain)))?;
        if !self.shaders.is_empty() {
            writer.rule(&Rule::new(
                "glsl",
                format!("{} $in -o $out", SHADER_COMPILER),
            ))?;
        }

        let mut object_paths = vec![];
        for (source, object) in self.sources.iter().zip(&objects) {
            if let Some(parent) = object.parent() {
                let directory = parent.to_path(&generation.root);
                create_dir_all(&directory)
                    .with_context(|| format!("Failed to create {}", directory.display()))?;
            }

            let object = render_path(object, profile);
            writer.build(&Edge::new(
                &object,
                "cc",
                vec![render_path(&source.normalize(), profile)],
            ))?;
            object_paths.push(object);
        }

        let mut shader_paths = vec![];
        for shader in &self.shaders {
            let source = render_path(&shader.normalize(), profile);
            let output = format!("{}{}", source, SHADER_EXTENSION);
            writer.build(&Edge::new(&output, "glsl", vec![source]))?;
            shader_paths.push(output);
        }

        let executable = self.output_name(profile);
        writer.build(&Edge::new(&executable, "ln", object_paths.clone()))?;
        debug!("{} links {} objects", executable, object_paths.len());

        Ok(Artifacts {
            objects: object_paths,
            executable,
            shaders: shader_paths,
        })
    }
}

/// Maps a source file to its object file under `objects/`.
///
/// Absolute sources and sources leaving the project are rejected, so distinct
/// normalized sources always get distinct objects.
pub fn object_path(source: &RelativePath, profile: &ToolchainProfile) -> Result<RelativePathBuf, TargetError> {
    let raw = source.as_str();
    let normalized = source.normalize();
    let escapes = match normalized.components().next() {
        Some(Component::ParentDir) | None => true,
        _ => false,
    };
    if escapes || raw.starts_with('/') || raw.starts_with('\\') || raw.contains(':') {
        return Err(TargetError::SourceOutsideProject {
            source: raw.to_owned(),
        });
    }

    Ok(RelativePathBuf::from(format!(
        "{}/{}{}",
        OBJECT_DIRECTORY,
        normalized.as_str(),
        profile.object_extension
    )))
}

/// Renders a relative path with the profile's separator.
pub fn render_path(path: &RelativePath, profile: &ToolchainProfile) -> String {
    if profile.separator == '/' {
        path.as_str().to_owned()
    } else {
        path.as_str().replace('/', &profile.separator.to_string())
    }
}

/// Collapses runs of whitespace into one space.
fn collapse(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Quotes a value containing whitespace.
fn quote(value: &str) -> Cow<'_, str> {
    if value.contains(char::is_whitespace) && !value.starts_with('"') {
        Cow::Owned(format!("\"{}\"", value))
    } else {
        Cow::Borrowed(value)
    }
}

/// Entries grouped by kind, keeping their order within a kind.
fn ordered(entries: &[OptionEntry]) -> impl Iterator<Item = &OptionEntry> {
    let mut sorted: Vec<&OptionEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.rank());
    sorted.into_iter()
}
