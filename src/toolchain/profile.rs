//! Contains per-platform compiler/linker names and option syntax.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Represents a toolchain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// GCC-compatible compiler driver used as both compiler and linker.
    Unix,

    /// MSVC `cl.exe` and `link.exe`.
    Windows,
}

impl Platform {
    /// Returns the toolchain family of the running host,
    /// or `None` when the host is not supported.
    pub fn host() -> Option<Platform> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            None
        } else {
            Some(Platform::Unix)
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Platform::Unix => write!(f, "unix"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// Represents a build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Configuration {
    Debug,
    Release,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration::Debug
    }
}

impl Configuration {
    /// The name CMake uses for this configuration.
    pub fn cmake_name(self) -> &'static str {
        match self {
            Configuration::Debug => "Debug",
            Configuration::Release => "Release",
        }
    }
}

/// Compile and link flags selected by a `Configuration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagBundle {
    pub compile: &'static str,
    pub link: &'static str,
}

/// Constant description of a toolchain family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainProfile {
    pub platform: Platform,

    /// Default compiler binary name
    pub compiler: &'static str,

    /// Default linker binary name
    pub linker: &'static str,

    pub object_extension: &'static str,
    pub executable_extension: &'static str,

    /// Path separator used in generated artifact paths
    pub separator: char,

    /// Warning flags passed to every compilation
    pub compile_flags: &'static str,

    /// Input/output part of the compile command, with `$in` and `$out`
    pub compile_io: &'static str,

    /// Input/output part of the link command, with `$in` and `$out`
    pub link_io: &'static str,

    pub debug: FlagBundle,
    pub release: FlagBundle,

    pub include_prefix: &'static str,
    pub library_directory_prefix: &'static str,
    pub library_prefix: &'static str,
    pub define_prefix: &'static str,

    pub sanitize: FlagBundle,

    /// Extension of generated helper scripts
    pub script_extension: &'static str,

    /// Forceful, non-interactive file removal command
    pub remove_command: &'static str,

    /// Extra clang-tidy arguments needed to understand this toolchain's flags
    pub analyzer_arguments: &'static str,
}

impl ToolchainProfile {
    /// Returns the flag bundle for a configuration.
    pub fn flags(&self, configuration: Configuration) -> FlagBundle {
        match configuration {
            Configuration::Debug => self.debug,
            Configuration::Release => self.release,
        }
    }
}

static UNIX_PROFILE: ToolchainProfile = ToolchainProfile {
    platform: Platform::Unix,
    compiler: "gcc",
    linker: "gcc",
    object_extension: ".o",
    executable_extension: "",
    separator: '/',
    compile_flags: "-Wall -pedantic",
    compile_io: "-c $in -o $out",
    link_io: "$in -o $out",
    debug: FlagBundle {
        compile: "-g3 -Og",
        link: "-g3 -Og",
    },
    release: FlagBundle {
        compile: "-O3",
        link: "-O3",
    },
    include_prefix: "-I",
    library_directory_prefix: "-L",
    library_prefix: "-l",
    define_prefix: "-D",
    sanitize: FlagBundle {
        compile: "-fsanitize=address,undefined",
        link: "-fsanitize=address,undefined",
    },
    script_extension: "",
    remove_command: "rm -f",
    analyzer_arguments: "",
};

static WINDOWS_PROFILE: ToolchainProfile = ToolchainProfile {
    platform: Platform::Windows,
    compiler: "cl",
    linker: "link",
    object_extension: ".obj",
    executable_extension: ".exe",
    separator: '\\',
    compile_flags: "-nologo -W4 -FS",
    compile_io: "-c $in -Fo:$out",
    link_io: "-nologo $in -out:$out",
    debug: FlagBundle {
        compile: "-Zi -Od",
        link: "-debug",
    },
    release: FlagBundle {
        compile: "-O2",
        link: "",
    },
    include_prefix: "-I",
    library_directory_prefix: "-libpath:",
    library_prefix: "",
    define_prefix: "-D",
    sanitize: FlagBundle {
        compile: "-fsanitize=address",
        link: "",
    },
    script_extension: ".ps1",
    remove_command: "Remove-Item -Force -ErrorAction SilentlyContinue",
    analyzer_arguments: "--extra-arg-before=--driver-mode=cl",
};

/// Returns the profile of a toolchain family.
pub fn profile_for(platform: Platform) -> &'static ToolchainProfile {
    match platform {
        Platform::Unix => &UNIX_PROFILE,
        Platform::Windows => &WINDOWS_PROFILE,
    }
}
