//! Contains generators of housekeeping scripts (`clean` and `lint`).

use crate::toolchain::profile::{Platform, ToolchainProfile};

use std::{
    fs::write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;

pub const ANALYZER: &str = "clang-tidy";

/// Curated clang-tidy rule set.
pub const ANALYZER_CHECKS: &str =
    "\"--checks=-*,clang-analyzer-*,bugprone-*,performance-*,portability-*\"";

const SHEBANG: &str = "#!/bin/sh";

/// Returns a clang-tidy command line for `input`, compiled with `flags`.
pub fn analyzer_invocation(profile: &ToolchainProfile, input: &str, flags: &str) -> String {
    analyzer_command(profile, input, flags, "--")
}

fn analyzer_command(profile: &ToolchainProfile, input: &str, flags: &str, separator: &str) -> String {
    [
        ANALYZER,
        input,
        ANALYZER_CHECKS,
        profile.analyzer_arguments,
        separator,
        flags,
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .join(" ")
}

/// Returns the content of a script deleting every artifact.
pub fn clean_script(profile: &ToolchainProfile, artifacts: &[String]) -> String {
    let mut script = header(profile);
    for artifact in artifacts {
        script.push_str(&format!("{} {}\n", profile.remove_command, quote(profile, artifact)));
    }
    script
}

/// Returns the content of a script running the analyzer over every source.
pub fn lint_script(profile: &ToolchainProfile, sources: &[String], flags: &str) -> String {
    // PowerShell swallows a bare `--` instead of passing it on.
    let separator = match profile.platform {
        Platform::Unix => "--",
        Platform::Windows => "'--'",
    };

    let mut script = header(profile);
    for source in sources {
        script.push_str(&analyzer_command(profile, &quote(profile, source), flags, separator));
        script.push('\n');
    }
    script
}

/// Writes `clean` (`clean.ps1` on Windows) into `directory`.
pub fn generate_clean_script(
    directory: &Path,
    profile: &ToolchainProfile,
    artifacts: &[String],
) -> Result<PathBuf> {
    write_script(directory, "clean", profile, &clean_script(profile, artifacts))
}

/// Writes `lint` (`lint.ps1` on Windows) into `directory`.
pub fn generate_lint_script(
    directory: &Path,
    profile: &ToolchainProfile,
    sources: &[String],
    flags: &str,
) -> Result<PathBuf> {
    write_script(directory, "lint", profile, &lint_script(profile, sources, flags))
}

fn header(profile: &ToolchainProfile) -> String {
    match profile.platform {
        Platform::Unix => format!("{}\n", SHEBANG),
        Platform::Windows => String::new(),
    }
}

/// Single-quotes a path so neither shell expands anything in it.
fn quote(profile: &ToolchainProfile, path: &str) -> String {
    let quote_escape = match profile.platform {
        Platform::Unix => "'\\''",
        Platform::Windows => "''",
    };
    format!("'{}'", path.replace('\'', quote_escape))
}

fn write_script(
    directory: &Path,
    name: &str,
    profile: &ToolchainProfile,
    content: &str,
) -> Result<PathBuf> {
    let path = directory.join(format!("{}{}", name, profile.script_extension));
    write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::{
            fs::{metadata, set_permissions},
            os::unix::fs::PermissionsExt,
        };

        if profile.platform == Platform::Unix {
            let mut permissions = metadata(&path)
                .with_context(|| format!("Failed to read permissions of {}", path.display()))?
                .permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            set_permissions(&path, permissions)
                .with_context(|| format!("Failed to make {} executable", path.display()))?;
        }
    }

    info!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::profile::profile_for;

    fn artifacts() -> Vec<String> {
        vec!["objects/a.o".into(), "objects/b.o".into(), "app".into()]
    }

    #[test]
    fn unix_clean_script_removes_each_artifact_in_order() {
        let script = clean_script(profile_for(Platform::Unix), &artifacts());
        assert_eq!(
            script,
            "#!/bin/sh\nrm -f 'objects/a.o'\nrm -f 'objects/b.o'\nrm -f 'app'\n"
        );
    }

    #[test]
    fn windows_clean_script_uses_powershell() {
        let script = clean_script(
            profile_for(Platform::Windows),
            &["objects\\a.obj".to_string(), "my app.exe".to_string()],
        );
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Remove-Item -Force"));
        assert!(lines[0].ends_with(" 'objects\\a.obj'"));
        assert!(lines[1].ends_with(" 'my app.exe'"));
    }

    #[test]
    fn shell_characters_in_paths_are_not_expanded() {
        let artifacts = vec!["objects/a(1).c.o".to_string(), "x$y.o".into(), "it's.o".into()];

        let unix = clean_script(profile_for(Platform::Unix), &artifacts);
        assert_eq!(
            unix,
            "#!/bin/sh\nrm -f 'objects/a(1).c.o'\nrm -f 'x$y.o'\nrm -f 'it'\\''s.o'\n"
        );

        let windows = clean_script(profile_for(Platform::Windows), &artifacts);
        let lines: Vec<_> = windows.lines().collect();
        assert!(lines[1].ends_with(" 'x$y.o'"));
        assert!(lines[2].ends_with(" 'it''s.o'"));
    }

    #[test]
    fn lint_script_has_one_line_per_source() {
        let sources = vec!["src/a.c".to_string(), "src/b.c".to_string()];
        let script = lint_script(profile_for(Platform::Unix), &sources, "-Wall -Ideps");
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        assert_eq!(
            lines[1],
            format!("clang-tidy 'src/a.c' {} -- -Wall -Ideps", ANALYZER_CHECKS)
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn windows_lint_script_passes_driver_mode() {
        let script = lint_script(
            profile_for(Platform::Windows),
            &["src\\a.c".to_string()],
            "-W4",
        );
        assert_eq!(
            script,
            format!(
                "clang-tidy 'src\\a.c' {} --extra-arg-before=--driver-mode=cl '--' -W4\n",
                ANALYZER_CHECKS
            )
        );
    }

    #[test]
    fn scripts_are_written_with_platform_names() {
        let dir = tempfile::tempdir().unwrap();
        let unix = generate_clean_script(dir.path(), profile_for(Platform::Unix), &artifacts()).unwrap();
        let windows =
            generate_clean_script(dir.path(), profile_for(Platform::Windows), &artifacts()).unwrap();

        assert_eq!(unix, dir.path().join("clean"));
        assert_eq!(windows, dir.path().join("clean.ps1"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&unix).unwrap().permissions().mode();
            assert_eq!(mode & 0o100, 0o100);
        }
    }
}
