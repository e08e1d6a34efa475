//! Compile options from config files and flags

use crate::PipelineArgs;
use anyhow::{Context, Result};
use sr_driver::{CompileOptions, SemanticGate};
use std::path::Path;

/// Options for compiling `source`: an explicit `--config`, else a
/// `sere.toml` beside the source, else defaults; flags override the file
pub fn resolve(source: &Path, pipeline: &PipelineArgs) -> Result<CompileOptions> {
    let mut options = match &pipeline.config {
        Some(path) => CompileOptions::from_file(path)?,
        None => {
            let dir = source.parent().unwrap_or_else(|| Path::new("."));
            CompileOptions::find_in_dir(dir)?.unwrap_or_default()
        }
    };
    options.source_name = source.display().to_string();
    if pipeline.strict {
        options.semantic_gate = SemanticGate::Abort;
    }
    if pipeline.no_verify {
        options.verify = false;
    }
    Ok(options)
}

/// Reads a source file
pub fn read_source(source: &Path) -> Result<String> {
    std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read source file: {}", source.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_driver::{CONFIG_FILE, Target};

    #[test]
    fn test_defaults_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.sr");
        let options = resolve(&source, &PipelineArgs::default()).unwrap();
        assert_eq!(options.source_name, source.display().to_string());
        assert_eq!(options.semantic_gate, SemanticGate::Proceed);
        assert_eq!(options.target, Target::Obj);
    }

    #[test]
    fn test_config_beside_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "module_name = \"demo\"\ntarget = \"ir\"\n",
        )
        .unwrap();
        let options = resolve(&dir.path().join("main.sr"), &PipelineArgs::default()).unwrap();
        assert_eq!(options.module_name, "demo");
        assert_eq!(options.target, Target::Ir);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("custom.toml");
        std::fs::write(&config, "semantic_gate = \"proceed\"\nverify = true\n").unwrap();
        let pipeline = PipelineArgs {
            strict: true,
            config: Some(config),
            no_verify: true,
        };
        let options = resolve(&dir.path().join("main.sr"), &pipeline).unwrap();
        assert_eq!(options.semantic_gate, SemanticGate::Abort);
        assert!(!options.verify);
    }

    #[test]
    fn test_broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "opt_level = \"high\"\n").unwrap();
        assert!(resolve(&dir.path().join("main.sr"), &PipelineArgs::default()).is_err());
    }
}
