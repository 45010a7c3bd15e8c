//! Where decoded traces are written.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

pub const DEFAULT_DUMP_BASE: &str = "agxdecode.dump";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    Stderr,
    /// One file per frame, `<base>.<frame:04>`.
    Files(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    /// Print raw bytes next to every decoded object.
    pub verbose: bool,
    pub target: DumpTarget,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            target: DumpTarget::Files(PathBuf::from(DEFAULT_DUMP_BASE)),
        }
    }
}

impl DumpConfig {
    /// Reads `AGXDECODE_VERBOSE` and `AGXDECODE_DUMP_FILE`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let verbose = var("AGXDECODE_VERBOSE").is_some_and(|v| !v.is_empty());
        let base = var("AGXDECODE_DUMP_FILE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DUMP_BASE.into());
        let target = if base == "stderr" {
            DumpTarget::Stderr
        } else {
            DumpTarget::Files(PathBuf::from(base))
        };
        Self { verbose, target }
    }
}

/// Output stream for decoded traces, rotated once per frame.
pub struct DumpSink {
    config: DumpConfig,
    frame: u32,
    out: Option<Box<dyn Write>>,
}

impl DumpSink {
    pub fn new(config: DumpConfig) -> Self {
        Self {
            config,
            frame: 0,
            out: None,
        }
    }

    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// File the current frame goes to, if dumping to files.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.config.target {
            DumpTarget::Stderr => None,
            DumpTarget::Files(base) => {
                let mut name = base.clone().into_os_string();
                name.push(format!(".{:04}", self.frame));
                Some(PathBuf::from(name))
            }
        }
    }

    fn create(&self) -> io::Result<Box<dyn Write>> {
        Ok(match self.path() {
            None => Box::new(io::stderr()),
            Some(path) => {
                info!(path = %path.display(), "dumping command stream");
                Box::new(BufWriter::new(File::create(&path)?))
            }
        })
    }

    fn open(&mut self) -> io::Result<&mut Box<dyn Write>> {
        let out = match self.out.take() {
            Some(out) => out,
            None => self.create()?,
        };
        Ok(self.out.insert(out))
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.open()?.write_all(text.as_bytes())
    }

    /// Closes the current frame's output; the next write starts a new file.
    pub fn next_frame(&mut self) -> io::Result<()> {
        self.close()?;
        self.frame += 1;
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        match self.out.take() {
            Some(mut out) => out.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn config_defaults() {
        assert_eq!(DumpConfig::from_vars(vars(&[])), DumpConfig::default());
        let cfg = DumpConfig::from_vars(vars(&[("AGXDECODE_VERBOSE", "")]));
        assert!(!cfg.verbose);
    }

    #[test]
    fn config_reads_vars() {
        let cfg = DumpConfig::from_vars(vars(&[
            ("AGXDECODE_VERBOSE", "1"),
            ("AGXDECODE_DUMP_FILE", "stderr"),
        ]));
        assert!(cfg.verbose);
        assert_eq!(cfg.target, DumpTarget::Stderr);

        let cfg = DumpConfig::from_vars(vars(&[("AGXDECODE_DUMP_FILE", "/tmp/trace")]));
        assert_eq!(cfg.target, DumpTarget::Files(PathBuf::from("/tmp/trace")));
    }

    #[test]
    fn frames_rotate_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DumpSink::new(DumpConfig {
            verbose: false,
            target: DumpTarget::Files(dir.path().join("trace")),
        });
        assert_eq!(sink.path(), Some(dir.path().join("trace.0000")));

        sink.write_str("first\n").unwrap();
        sink.write_str("more\n").unwrap();
        sink.next_frame().unwrap();
        sink.write_str("second\n").unwrap();
        sink.close().unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("trace.0000")).unwrap(),
            "first\nmore\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("trace.0001")).unwrap(),
            "second\n"
        );
        assert_eq!(sink.frame(), 1);
    }

    #[test]
    fn frame_without_output_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DumpSink::new(DumpConfig {
            verbose: false,
            target: DumpTarget::Files(dir.path().join("idle")),
        });
        sink.next_frame().unwrap();
        assert!(!dir.path().join("idle.0000").exists());
        assert_eq!(sink.frame(), 1);
    }
}
