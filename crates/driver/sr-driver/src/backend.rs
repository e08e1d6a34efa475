//! Artifact emission from textual IR

use crate::config::Target;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// What to produce and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    /// Artifact kind
    pub target: Target,
    /// Optimisation level, 0 to 3
    pub opt_level: u8,
    /// Output path without extension
    pub basename: PathBuf,
}

impl ArtifactRequest {
    /// `basename` with the target's extension
    pub fn output_path(&self) -> PathBuf {
        self.basename.with_extension(self.target.extension())
    }
}

/// A written artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where it was written
    pub path: PathBuf,
    /// What it contains
    pub target: Target,
}

/// Turns module IR into an artifact on disk
pub trait Backend {
    /// Emits the artifact `request` describes
    ///
    /// # Errors
    /// Returns an error if the artifact cannot be produced
    fn emit(&self, ir: &str, request: &ArtifactRequest) -> Result<Artifact>;
}

/// Writes the IR text unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct TextBackend;

impl Backend for TextBackend {
    fn emit(&self, ir: &str, request: &ArtifactRequest) -> Result<Artifact> {
        if request.target != Target::Ir {
            bail!("the text backend only produces IR, not {}", request.target);
        }
        let path = request.output_path();
        std::fs::write(&path, ir)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), bytes = ir.len(), "wrote IR");
        Ok(Artifact {
            path,
            target: Target::Ir,
        })
    }
}

/// Compiles IR with an external `llc`
#[derive(Debug, Clone)]
pub struct LlcBackend {
    program: PathBuf,
}

impl Default for LlcBackend {
    fn default() -> Self {
        Self::new("llc")
    }
}

impl LlcBackend {
    /// Backend running `program` instead of the `llc` on `PATH`
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl Backend for LlcBackend {
    fn emit(&self, ir: &str, request: &ArtifactRequest) -> Result<Artifact> {
        let filetype = match request.target {
            Target::Obj => "obj",
            Target::Asm => "asm",
            Target::Ir => return TextBackend.emit(ir, request),
        };

        let mut input = tempfile::Builder::new()
            .prefix("sere-")
            .suffix(".ll")
            .tempfile()
            .context("Failed to create a scratch IR file")?;
        input
            .write_all(ir.as_bytes())
            .context("Failed to write the scratch IR file")?;

        let path = request.output_path();
        let output = Command::new(&self.program)
            .arg(format!("-O{}", request.opt_level))
            .arg(format!("-filetype={filetype}"))
            .arg("-o")
            .arg(&path)
            .arg(input.path())
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            bail!(
                "{} failed:\n  stdout: {}\n  stderr: {}",
                self.program.display(),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        debug!(path = %path.display(), target = %request.target, "llc finished");
        Ok(Artifact {
            path,
            target: request.target,
        })
    }
}

/// The backend able to produce `target`
pub fn backend_for(target: Target) -> Box<dyn Backend> {
    match target {
        Target::Ir => Box::new(TextBackend),
        Target::Obj | Target::Asm => Box::new(LlcBackend::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path, target: Target) -> ArtifactRequest {
        ArtifactRequest {
            target,
            opt_level: 2,
            basename: dir.join("program"),
        }
    }

    #[test]
    fn test_text_backend_writes_ir() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = TextBackend
            .emit("; ModuleID = 'm'\n", &request(dir.path(), Target::Ir))
            .unwrap();
        assert_eq!(artifact.path, dir.path().join("program.ll"));
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "; ModuleID = 'm'\n"
        );
    }

    #[test]
    fn test_text_backend_rejects_native_targets() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TextBackend.emit("", &request(dir.path(), Target::Obj)).is_err());
    }

    #[test]
    fn test_missing_llc_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LlcBackend::new(dir.path().join("no-such-llc"));
        let error = backend
            .emit("", &request(dir.path(), Target::Asm))
            .unwrap_err();
        assert!(error.to_string().contains("no-such-llc"));
    }

    #[test]
    fn test_output_paths() {
        let request = ArtifactRequest {
            target: Target::Obj,
            opt_level: 0,
            basename: PathBuf::from("out/prog"),
        };
        assert_eq!(request.output_path(), PathBuf::from("out/prog.o"));
    }
}
