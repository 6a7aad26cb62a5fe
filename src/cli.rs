use kiln::{
    ninja::escape,
    target::BuildOptions,
    toolchain::profile::{Configuration, Platform},
};

use clap::Parser;
use itertools::Itertools;
use log::debug;

/// Flags that only drive orchestration and are dropped when regenerating.
const ORCHESTRATION_FLAGS: [&str; 2] = ["--deps", "--run"];

/// Options followed by a separate value.
const VALUE_OPTIONS: [&str; 4] = ["-c", "--description", "-o", "--output"];

/// Options without a value, including the ones clap generates.
const FLAG_OPTIONS: [&str; 6] = ["--deps", "--run", "-h", "--help", "-V", "--version"];

/// Represents CLI arguments.
#[derive(Parser)]
#[clap(author, version, about)]
pub struct Arguments {
    /// Specifies the build description path.
    #[clap(short = 'c', long, default_value = "build.toml")]
    pub description: String,

    /// Specifies the generated build file path.
    #[clap(short, long, default_value = "build.ninja")]
    pub output: String,

    /// Builds every `[[dependency]]` with CMake before generating.
    #[clap(long)]
    pub deps: bool,

    /// Runs ninja after generating.
    #[clap(long)]
    pub run: bool,

    /// `release`, `clang-tidy` (or `lint`), `sanitize` and `profile`.
    /// Anything else is ignored.
    pub tokens: Vec<String>,
}

impl Arguments {
    /// Parses `args` (program name first). Hyphenated words kiln does not
    /// know become tokens instead of usage errors.
    pub fn parse_lenient<I, T>(args: I) -> Result<Arguments, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut args = args.into_iter().map(Into::<String>::into);
        let mut known: Vec<String> = args.next().into_iter().collect();
        let mut stray = vec![];

        while let Some(arg) = args.next() {
            if arg == "--" {
                known.push(arg);
                known.extend(args.by_ref());
            } else if VALUE_OPTIONS.contains(&arg.as_str()) {
                known.push(arg);
                known.extend(args.next());
            } else if !arg.starts_with('-') || arg == "-" || is_known_option(&arg) {
                known.push(arg);
            } else {
                stray.push(arg);
            }
        }

        let mut arguments = Arguments::try_parse_from(known)?;
        arguments.tokens.extend(stray);
        Ok(arguments)
    }
}

fn is_known_option(arg: &str) -> bool {
    if FLAG_OPTIONS.contains(&arg) {
        return true;
    }
    if arg.starts_with("--") {
        return arg.starts_with("--description=") || arg.starts_with("--output=");
    }
    // `-cpath` and `-opath`
    arg.starts_with("-c") || arg.starts_with("-o")
}

/// What the positional tokens select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub options: BuildOptions,
    pub static_analysis: bool,
}

/// Interprets positional tokens.
pub fn select(tokens: &[String]) -> Selection {
    let mut selection = Selection::default();
    for token in tokens {
        match token.as_str() {
            "release" => selection.options.configuration = Configuration::Release,
            "clang-tidy" | "lint" => selection.static_analysis = true,
            "sanitize" => selection.options.features.sanitize = true,
            "profile" => selection.options.features.profiling = true,
            other => debug!("Ignoring unknown token {:?}", other),
        }
    }
    selection
}

/// Returns the ninja command that reruns this program with `args`.
///
/// ninja hands the command to `/bin/sh` on Unix and straight to
/// `CreateProcess` on Windows, so each argument is quoted for that.
pub fn regenerate_command(platform: Platform, program: &str, args: &[String]) -> String {
    let args = args
        .iter()
        .map(|a| a.as_str())
        .filter(|a| !ORCHESTRATION_FLAGS.contains(a));
    std::iter::once(program)
        .chain(args)
        .map(|a| escape(&quote_argument(platform, a)))
        .join(" ")
}

fn quote_argument(platform: Platform, argument: &str) -> String {
    match platform {
        Platform::Unix => {
            let plain = !argument.is_empty()
                && argument
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
            if plain {
                argument.to_owned()
            } else {
                format!("'{}'", argument.replace('\'', "'\\''"))
            }
        }
        Platform::Windows => {
            if argument.is_empty() || argument.contains(|c: char| c.is_whitespace() || c == '"') {
                format!("\"{}\"", argument.replace('"', "\\\""))
            } else {
                argument.to_owned()
            }
        }
    }
}
