//! Contains a writer for `build.ninja` files.

use std::{
    fs::create_dir_all,
    io::{prelude::*, BufWriter, Result as IoResult},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info};
use tempfile::NamedTempFile;

/// Line width the generated files are wrapped at.
pub const DEFAULT_WIDTH: usize = 80;

/// Represents a `rule` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,

    /// Command template, using `$in` and `$out`
    pub command: String,

    pub description: Option<String>,

    /// Marks the rule that rewrites the build file itself.
    pub generator: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Rule {
        Rule {
            name: name.into(),
            command: command.into(),
            description: None,
            generator: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Rule {
        self.description = Some(description.into());
        self
    }

    pub fn generator(mut self) -> Rule {
        self.generator = true;
        self
    }
}

/// Represents a `build` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub outputs: Vec<String>,
    pub rule: String,
    pub inputs: Vec<String>,

    /// Dependencies that are not passed in `$in`
    pub implicit: Vec<String>,
}

impl Edge {
    pub fn new(output: impl Into<String>, rule: impl Into<String>, inputs: Vec<String>) -> Edge {
        Edge {
            outputs: vec![output.into()],
            rule: rule.into(),
            inputs,
            implicit: vec![],
        }
    }

    pub fn implicit(mut self, dependencies: Vec<String>) -> Edge {
        self.implicit = dependencies;
        self
    }
}

/// Escapes a path for use in a `build` line.
pub fn escape_path(path: &str) -> String {
    path.replace('$', "$$").replace(' ', "$ ").replace(':', "$:")
}

/// Escapes arbitrary text for use in a variable or command.
pub fn escape(text: &str) -> String {
    text.replace('$', "$$")
}

/// Serializes rules and build statements.
///
/// Names are not checked for uniqueness; ninja itself rejects
/// a second rule of the same name.
pub struct Writer<W> {
    output: W,
    width: usize,
}

impl<W: Write> Writer<W> {
    /// Creates a writer that wraps lines longer than `width`.
    pub fn new(output: W, width: usize) -> Writer<W> {
        Writer { output, width }
    }

    pub fn newline(&mut self) -> IoResult<()> {
        writeln!(self.output)
    }

    pub fn comment(&mut self, text: &str) -> IoResult<()> {
        for line in text.lines() {
            writeln!(self.output, "# {}", line)?;
        }
        Ok(())
    }

    pub fn variable(&mut self, key: &str, value: &str, indent: usize) -> IoResult<()> {
        self.line(&format!("{} = {}", key, value), indent)
    }

    pub fn rule(&mut self, rule: &Rule) -> IoResult<()> {
        debug!("Declaring rule {}", rule.name);
        self.line(&format!("rule {}", rule.name), 0)?;
        self.variable("command", &rule.command, 1)?;
        if let Some(description) = &rule.description {
            self.variable("description", description, 1)?;
        }
        if rule.generator {
            self.variable("generator", "1", 1)?;
        }
        self.newline()
    }

    pub fn build(&mut self, edge: &Edge) -> IoResult<()> {
        debug!("Declaring build {} ({})", edge.outputs.join(" "), edge.rule);
        let mut text = format!("build {}: {}", escape_all(&edge.outputs), edge.rule);
        if !edge.inputs.is_empty() {
            text.push(' ');
            text.push_str(&escape_all(&edge.inputs));
        }
        if !edge.implicit.is_empty() {
            text.push_str(" | ");
            text.push_str(&escape_all(&edge.implicit));
        }
        self.line(&text, 0)
    }

    /// Consumes the writer and returns the inner output.
    pub fn into_inner(self) -> W {
        self.output
    }

    /// Writes a line, breaking it at unescaped spaces with `$` continuations.
    fn line(&mut self, text: &str, indent: usize) -> IoResult<()> {
        let mut leading = "  ".repeat(indent);
        let mut rest = text;

        while self.width > 0 && leading.len() + rest.len() > self.width {
            // Leaves room for the trailing " $".
            let available = self.width.saturating_sub(leading.len() + 2);
            let split = find_break(rest, available, true).or_else(|| find_break(rest, available, false));
            let split = match split {
                Some(s) => s,
                None => break,
            };

            writeln!(self.output, "{}{} $", leading, &rest[..split])?;
            rest = &rest[split + 1..];
            leading = "  ".repeat(indent + 2);
        }

        writeln!(self.output, "{}{}", leading, rest)
    }
}

fn escape_all(paths: &[String]) -> String {
    paths.iter().map(|p| escape_path(p)).collect::<Vec<_>>().join(" ")
}

/// Finds a space not preceded by an odd number of `$`; the last one before
/// `limit` when `backward`, the first one after it otherwise.
fn find_break(text: &str, limit: usize, backward: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let is_break = |i: usize| {
        if bytes[i] != b' ' || i == 0 {
            return false;
        }
        let dollars = bytes[..i].iter().rev().take_while(|&&b| b == b'$').count();
        dollars % 2 == 0
    };

    if backward {
        (0..limit.min(bytes.len())).rev().find(|&i| is_break(i))
    } else {
        (limit..bytes.len()).find(|&i| is_break(i))
    }
}

/// A build file being written.
///
/// Content goes to a temporary file beside the destination and only replaces
/// the destination in `close`, so a running ninja never reads a partial file.
/// Dropping an unclosed `BuildFile` discards everything written.
pub struct BuildFile {
    path: PathBuf,
    writer: Writer<BufWriter<NamedTempFile>>,
}

impl BuildFile {
    pub fn open(path: impl AsRef<Path>) -> Result<BuildFile> {
        let path = path.as_ref().to_owned();
        let directory = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        };
        create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;

        let file = NamedTempFile::new_in(&directory)
            .with_context(|| format!("Failed to create a temporary file in {}", directory.display()))?;
        Ok(BuildFile {
            path,
            writer: Writer::new(BufWriter::new(file), DEFAULT_WIDTH),
        })
    }

    pub fn writer(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the content and moves it into place.
    pub fn close(self) -> Result<()> {
        let BuildFile { path, writer } = self;
        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        info!("Wrote {}", path.display());
        Ok(())
    }
}
