//! Contains the discovery of an installed MSVC toolchain and Windows SDK.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_dir,
    io::Error as IoError,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use log::{debug, info, warn};

/// Visual Studio editions, in probing order.
const EDITIONS: [&str; 4] = ["BuildTools", "Community", "Professional", "Enterprise"];

/// Subfolders of `Include/<version>` the compiler needs.
const SDK_INCLUDE_FOLDERS: [&str; 4] = ["ucrt", "um", "shared", "winrt"];

/// Subfolders of `Lib/<version>` the linker needs.
const SDK_LIBRARY_FOLDERS: [&str; 2] = ["um", "ucrt"];

/// Represents a failure to discover the toolchain.
#[derive(Debug)]
pub enum LocateError {
    /// None of the Visual Studio roots exist.
    VisualStudioNotFound { probed: Vec<PathBuf> },

    /// The Visual Studio root has no numbered installation.
    NoVisualStudioVersion { directory: PathBuf },

    /// No edition under the installation has the C/C++ tools.
    NoCppWorkload { directory: PathBuf },

    /// `VC/Tools/MSVC` is empty.
    NoMsvcVersion { directory: PathBuf },

    /// None of the Windows SDK roots exist.
    SdkNotFound { probed: Vec<PathBuf> },

    /// `Include` under the SDK root has no version folder.
    NoSdkVersion { directory: PathBuf },

    /// The newest SDK headers have no matching libraries.
    SdkLibrariesMissing { version: String, directory: PathBuf },

    /// Two folders spell the same newest version.
    AmbiguousVersion {
        directory: PathBuf,
        first: String,
        second: String,
    },

    /// A folder every installation has is absent.
    MissingDirectory { path: PathBuf },

    /// A directory could not be listed.
    Io { path: PathBuf, source: IoError },
}

impl Display for LocateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LocateError::VisualStudioNotFound { probed } => write!(
                f,
                "Visual Studio does not seem to be installed, or it is not in a place that could be found (looked in {})",
                probed.iter().map(|p| p.display()).join(", ")
            ),
            LocateError::NoVisualStudioVersion { directory } => write!(
                f,
                "No numbered Visual Studio installation found in {}",
                directory.display()
            ),
            LocateError::NoCppWorkload { directory } => write!(
                f,
                "Either the Visual Studio installation at {} is corrupted, or the C/C++ workload is not installed",
                directory.display()
            ),
            LocateError::NoMsvcVersion { directory } => write!(
                f,
                "MSVC is not installed the way it was expected to be (no version in {})",
                directory.display()
            ),
            LocateError::SdkNotFound { probed } => write!(
                f,
                "Could not find the Windows SDK, maybe it is not installed (looked in {})",
                probed.iter().map(|p| p.display()).join(", ")
            ),
            LocateError::NoSdkVersion { directory } => write!(
                f,
                "The Windows SDK has no headers installed (no version in {})",
                directory.display()
            ),
            LocateError::SdkLibrariesMissing { version, directory } => write!(
                f,
                "Windows SDK {} has headers but no libraries in {}",
                version,
                directory.display()
            ),
            LocateError::AmbiguousVersion {
                directory,
                first,
                second,
            } => write!(
                f,
                "Cannot choose between versions \"{}\" and \"{}\" in {}",
                first,
                second,
                directory.display()
            ),
            LocateError::MissingDirectory { path } => {
                write!(f, "Expected directory {} does not exist", path.display())
            }
            LocateError::Io { path, source } => {
                write!(f, "Failed to list {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for LocateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            LocateError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Represents a dotted numeric version folder name such as `2022` or `10.0.22621.0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u64>);

impl FromStr for Version {
    type Err = ();

    fn from_str(s: &str) -> Result<Version, ()> {
        let components: Result<Vec<u64>, _> = s
            .split('.')
            .map(|c| {
                if c.is_empty() || !c.bytes().all(|b| b.is_ascii_digit()) {
                    Err(())
                } else {
                    c.parse::<u64>().map_err(|_| ())
                }
            })
            .collect();
        components.map(Version)
    }
}

/// Returns the name of the numerically greatest version folder in `directory`.
/// Entries that are not version numbers are skipped.
pub fn latest_version(directory: &Path) -> Result<Option<String>, LocateError> {
    let entries = read_dir(directory).map_err(|source| LocateError::Io {
        path: directory.to_owned(),
        source,
    })?;

    let mut candidates = vec![];
    for entry in entries {
        let entry = entry.map_err(|source| LocateError::Io {
            path: directory.to_owned(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        match name.parse::<Version>() {
            Ok(version) => candidates.push((version, name)),
            Err(()) => debug!("Skipping non-version entry {:?} in {:?}", name, directory),
        }
    }
    candidates.sort();

    let (latest, name) = match candidates.pop() {
        Some(c) => c,
        None => return Ok(None),
    };
    if let Some((runner_up, other)) = candidates.last() {
        if *runner_up == latest {
            return Err(LocateError::AmbiguousVersion {
                directory: directory.to_owned(),
                first: other.clone(),
                second: name,
            });
        }
        warn!(
            "Several versions found in {:?}, using the newest ({})",
            directory, name
        );
    }

    Ok(Some(name))
}

/// Resolved absolute paths of an MSVC toolchain and Windows SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainLocation {
    pub compiler: PathBuf,
    pub linker: PathBuf,

    /// MSVC headers first, then the SDK `ucrt`, `um`, `shared` and `winrt` folders
    pub include_directories: Vec<PathBuf>,

    /// MSVC libraries first, then the SDK `um` and `ucrt` folders
    pub library_directories: Vec<PathBuf>,
}

/// Searches known installation roots for the toolchain.
#[derive(Debug, Clone)]
pub struct Locator {
    pub visual_studio_roots: Vec<PathBuf>,
    pub sdk_roots: Vec<PathBuf>,
}

impl Default for Locator {
    fn default() -> Locator {
        Locator {
            visual_studio_roots: vec![
                PathBuf::from("C:/Program Files/Microsoft Visual Studio"),
                PathBuf::from("C:/Program Files (x86)/Microsoft Visual Studio"),
            ],
            sdk_roots: vec![
                PathBuf::from("C:/Program Files (x86)/Windows Kits/10"),
                PathBuf::from("C:/Program Files/Windows Kits/10"),
            ],
        }
    }
}

impl Locator {
    /// Resolves the newest installed MSVC and Windows SDK.
    pub fn locate(&self) -> Result<ToolchainLocation, LocateError> {
        let msvc = self.find_msvc()?;
        let (sdk_include, sdk_library) = self.find_windows_sdk()?;

        let binaries = require_directory(msvc.join("bin").join("Hostx64").join("x64"))?;

        let mut include_directories = vec![require_directory(msvc.join("include"))?];
        for folder in &SDK_INCLUDE_FOLDERS {
            include_directories.push(require_directory(sdk_include.join(folder))?);
        }

        let mut library_directories = vec![require_directory(msvc.join("lib").join("x64"))?];
        for folder in &SDK_LIBRARY_FOLDERS {
            library_directories.push(require_directory(sdk_library.join(folder).join("x64"))?);
        }

        Ok(ToolchainLocation {
            compiler: binaries.join("cl.exe"),
            linker: binaries.join("link.exe"),
            include_directories,
            library_directories,
        })
    }

    /// Finds `<root>/<version>/<edition>/VC/Tools/MSVC/<msvc version>`.
    fn find_msvc(&self) -> Result<PathBuf, LocateError> {
        let root = first_existing(&self.visual_studio_roots).ok_or_else(|| {
            LocateError::VisualStudioNotFound {
                probed: self.visual_studio_roots.clone(),
            }
        })?;

        let version = latest_version(root)?.ok_or_else(|| LocateError::NoVisualStudioVersion {
            directory: root.to_owned(),
        })?;
        let installation = root.join(version);

        let tools = EDITIONS
            .iter()
            .map(|edition| installation.join(edition).join("VC").join("Tools").join("MSVC"))
            .find(|p| p.is_dir())
            .ok_or_else(|| LocateError::NoCppWorkload {
                directory: installation.clone(),
            })?;

        let msvc_version = latest_version(&tools)?
            .ok_or_else(|| LocateError::NoMsvcVersion {
                directory: tools.clone(),
            })?;
        let msvc = tools.join(msvc_version);

        info!("Found MSVC at {}", msvc.display());
        Ok(msvc)
    }

    /// Finds the `Include/<version>` and `Lib/<version>` folders of the Windows SDK.
    fn find_windows_sdk(&self) -> Result<(PathBuf, PathBuf), LocateError> {
        let root = first_existing(&self.sdk_roots).ok_or_else(|| LocateError::SdkNotFound {
            probed: self.sdk_roots.clone(),
        })?;

        let include_root = require_directory(root.join("Include"))?;
        let version = latest_version(&include_root)?.ok_or_else(|| LocateError::NoSdkVersion {
            directory: include_root.clone(),
        })?;

        let library_root = root.join("Lib");
        let library = library_root.join(&version);
        if !library.is_dir() {
            return Err(LocateError::SdkLibrariesMissing {
                version,
                directory: library_root,
            });
        }

        info!("Found Windows SDK {} at {}", version, root.display());
        Ok((include_root.join(version), library))
    }
}

fn first_existing(candidates: &[PathBuf]) -> Option<&Path> {
    candidates.iter().map(|p| p.as_path()).find(|p| p.is_dir())
}

fn require_directory(path: PathBuf) -> Result<PathBuf, LocateError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(LocateError::MissingDirectory { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::create_dir_all;

    fn make_dirs(root: &Path, relative: &[&str]) {
        for r in relative {
            create_dir_all(root.join(r)).unwrap();
        }
    }

    /// Lays out a complete Visual Studio 2022 + SDK installation under `root`.
    fn fake_installation(root: &Path) -> Locator {
        make_dirs(
            root,
            &[
                "vs/2019/Community/VC/Tools/MSVC/14.29.30133",
                "vs/2022/BuildTools/VC/Tools/MSVC/14.38.33130/bin/Hostx64/x64",
                "vs/2022/BuildTools/VC/Tools/MSVC/14.38.33130/include",
                "vs/2022/BuildTools/VC/Tools/MSVC/14.38.33130/lib/x64",
                "kits/Include/10.0.22621.0/ucrt",
                "kits/Include/10.0.22621.0/um",
                "kits/Include/10.0.22621.0/shared",
                "kits/Include/10.0.22621.0/winrt",
                "kits/Lib/10.0.22621.0/um/x64",
                "kits/Lib/10.0.22621.0/ucrt/x64",
            ],
        );
        Locator {
            visual_studio_roots: vec![root.join("missing"), root.join("vs")],
            sdk_roots: vec![root.join("kits")],
        }
    }

    #[test]
    fn versions_compare_numerically() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["9", "10", "2"]);

        let latest = latest_version(dir.path()).unwrap();
        assert_eq!(latest.as_deref(), Some("10"));
    }

    #[test]
    fn dotted_versions_compare_per_component() {
        let a: Version = "10.0.9200.0".parse().unwrap();
        let b: Version = "10.0.22621.0".parse().unwrap();
        assert!(a < b);
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn non_version_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["Shared", "Installer", "2019"]);
        std::fs::write(dir.path().join("3000"), "not a directory").unwrap();

        let latest = latest_version(dir.path()).unwrap();
        assert_eq!(latest.as_deref(), Some("2019"));
    }

    #[test]
    fn empty_directory_has_no_version() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["Shared"]);

        assert_eq!(latest_version(dir.path()).unwrap(), None);
    }

    #[test]
    fn tied_versions_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["10", "010", "9"]);

        match latest_version(dir.path()) {
            Err(LocateError::AmbiguousVersion { first, second, .. }) => {
                let mut names = vec![first, second];
                names.sort();
                assert_eq!(names, vec!["010".to_string(), "10".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn locates_newest_installation() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_installation(dir.path());

        let location = locator.locate().unwrap();
        let msvc = dir
            .path()
            .join("vs/2022/BuildTools/VC/Tools/MSVC/14.38.33130");
        assert_eq!(location.compiler, msvc.join("bin/Hostx64/x64").join("cl.exe"));
        assert_eq!(location.linker, msvc.join("bin/Hostx64/x64").join("link.exe"));

        let sdk_include = dir.path().join("kits/Include/10.0.22621.0");
        assert_eq!(
            location.include_directories,
            vec![
                msvc.join("include"),
                sdk_include.join("ucrt"),
                sdk_include.join("um"),
                sdk_include.join("shared"),
                sdk_include.join("winrt"),
            ]
        );

        let sdk_library = dir.path().join("kits/Lib/10.0.22621.0");
        assert_eq!(
            location.library_directories,
            vec![
                msvc.join("lib").join("x64"),
                sdk_library.join("um").join("x64"),
                sdk_library.join("ucrt").join("x64"),
            ]
        );
    }

    #[test]
    fn missing_visual_studio_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let locator = Locator {
            visual_studio_roots: vec![dir.path().join("nowhere")],
            sdk_roots: vec![],
        };

        match locator.locate() {
            Err(LocateError::VisualStudioNotFound { probed }) => assert_eq!(probed.len(), 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn installation_without_cpp_tools_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["vs/2022/Community/Common7"]);
        let locator = Locator {
            visual_studio_roots: vec![dir.path().join("vs")],
            sdk_roots: vec![],
        };

        match locator.locate() {
            Err(LocateError::NoCppWorkload { directory }) => {
                assert_eq!(directory, dir.path().join("vs").join("2022"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn visual_studio_without_versions_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["vs/Shared", "vs/Installer"]);
        let locator = Locator {
            visual_studio_roots: vec![dir.path().join("vs")],
            sdk_roots: vec![],
        };

        match locator.locate() {
            Err(LocateError::NoVisualStudioVersion { directory }) => {
                assert_eq!(directory, dir.path().join("vs"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn empty_msvc_folder_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        make_dirs(dir.path(), &["vs/2022/Community/VC/Tools/MSVC"]);
        let locator = Locator {
            visual_studio_roots: vec![dir.path().join("vs")],
            sdk_roots: vec![],
        };

        match locator.locate() {
            Err(LocateError::NoMsvcVersion { directory }) => {
                assert_eq!(directory, dir.path().join("vs/2022/Community/VC/Tools/MSVC"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_sdk_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut locator = fake_installation(dir.path());
        locator.sdk_roots = vec![dir.path().join("no-kits"), dir.path().join("other-kits")];

        match locator.locate() {
            Err(e @ LocateError::SdkNotFound { .. }) => {
                assert!(e.to_string().contains("no-kits"));
                assert!(e.to_string().contains("other-kits"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn sdk_without_header_versions_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut locator = fake_installation(dir.path());
        make_dirs(dir.path(), &["empty-kits/Include/Shared", "empty-kits/Lib"]);
        locator.sdk_roots = vec![dir.path().join("empty-kits")];

        match locator.locate() {
            Err(LocateError::NoSdkVersion { directory }) => {
                assert_eq!(directory, dir.path().join("empty-kits").join("Include"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn each_failure_has_its_own_message() {
        let path = PathBuf::from("somewhere");
        let messages: std::collections::HashSet<String> = vec![
            LocateError::VisualStudioNotFound { probed: vec![path.clone()] },
            LocateError::NoVisualStudioVersion { directory: path.clone() },
            LocateError::NoCppWorkload { directory: path.clone() },
            LocateError::NoMsvcVersion { directory: path.clone() },
            LocateError::SdkNotFound { probed: vec![path.clone()] },
            LocateError::NoSdkVersion { directory: path.clone() },
            LocateError::MissingDirectory { path },
        ]
        .iter()
        .map(|e| e.to_string())
        .collect();
        assert_eq!(messages.len(), 7);
    }

    #[test]
    fn sdk_without_libraries_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_installation(dir.path());
        make_dirs(dir.path(), &["kits/Include/10.0.26100.0/ucrt"]);

        match locator.locate() {
            Err(LocateError::SdkLibrariesMissing { version, .. }) => {
                assert_eq!(version, "10.0.26100.0")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_sdk_folder_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let locator = fake_installation(dir.path());
        std::fs::remove_dir(dir.path().join("kits/Include/10.0.22621.0/winrt")).unwrap();

        match locator.locate() {
            Err(LocateError::MissingDirectory { path }) => {
                assert!(path.ends_with("winrt"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
