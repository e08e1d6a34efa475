//! Compile options and the `sere.toml` file they are loaded from

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// File looked up next to a source file for project options
pub const CONFIG_FILE: &str = "sere.toml";

/// What to do when semantic analysis reports errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticGate {
    /// Report the errors and generate code anyway
    #[default]
    Proceed,
    /// Stop before code generation
    Abort,
}

/// Artifact kind produced by `sere build`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Textual LLVM IR
    Ir,
    /// Native object file
    #[default]
    Obj,
    /// Native assembly
    Asm,
}

impl Target {
    /// File extension of the artifact
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Ir => "ll",
            Self::Obj => "o",
            Self::Asm => "s",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Ir => "ir",
            Self::Obj => "obj",
            Self::Asm => "asm",
        })
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "ir" | "ll" => Ok(Self::Ir),
            "obj" | "o" => Ok(Self::Obj),
            "asm" | "s" => Ok(Self::Asm),
            other => Err(format!("unknown target `{other}`, expected ir, obj or asm")),
        }
    }
}

/// Options for one compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Name of the generated module
    pub module_name: String,

    /// File name used in diagnostics
    pub source_name: String,

    /// Whether semantic errors stop the pipeline
    pub semantic_gate: SemanticGate,

    /// Run the structural verifier on the generated module
    pub verify: bool,

    /// Optimisation level handed to the native backend, 0 to 3
    pub opt_level: u8,

    /// Artifact kind
    pub target: Target,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "__module__".to_string(),
            source_name: "<stdin>".to_string(),
            semantic_gate: SemanticGate::default(),
            verify: true,
            opt_level: 3,
            target: Target::default(),
        }
    }
}

impl CompileOptions {
    /// Parses options from TOML text
    ///
    /// # Errors
    /// Returns an error if the text is not valid TOML, names an unknown key or
    /// sets an out-of-range optimisation level
    pub fn from_toml(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text).context("Failed to parse compile options")?;
        if options.opt_level > 3 {
            bail!("opt_level must be between 0 and 3, got {}", options.opt_level);
        }
        Ok(options)
    }

    /// Loads options from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Loads [`CONFIG_FILE`] from `dir` when present
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn find_in_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert_eq!(options.module_name, "__module__");
        assert_eq!(options.source_name, "<stdin>");
        assert_eq!(options.semantic_gate, SemanticGate::Proceed);
        assert!(options.verify);
        assert_eq!(options.opt_level, 3);
        assert_eq!(options.target, Target::Obj);
        assert_eq!(CompileOptions::from_toml("").unwrap(), options);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let options = CompileOptions::from_toml(
            "module_name = \"demo\"\nsemantic_gate = \"abort\"\ntarget = \"ir\"\nopt_level = 0\n",
        )
        .unwrap();
        assert_eq!(options.module_name, "demo");
        assert_eq!(options.semantic_gate, SemanticGate::Abort);
        assert_eq!(options.target, Target::Ir);
        assert_eq!(options.opt_level, 0);
        assert!(options.verify);
    }

    #[test]
    fn test_rejects_bad_files() {
        assert!(CompileOptions::from_toml("colour = \"red\"\n").is_err());
        assert!(CompileOptions::from_toml("opt_level = 7\n").is_err());
        assert!(CompileOptions::from_toml("target = \"wasm\"\n").is_err());
    }

    #[test]
    fn test_target_names() {
        assert_eq!("asm".parse::<Target>(), Ok(Target::Asm));
        assert_eq!("ll".parse::<Target>(), Ok(Target::Ir));
        assert!("exe".parse::<Target>().is_err());
        assert_eq!(Target::Obj.to_string(), "obj");
        assert_eq!(Target::Asm.extension(), "s");
    }
}
