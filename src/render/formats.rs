//! Output formats: a template paired with its file extension

use std::path::Path;

use crate::{ReplayError, Result};

/// Karate feature template
pub const KARATE_TEMPLATE: &str = include_str!("../../templates/karate.feature.j2");

/// Gatling simulation template
pub const GATLING_TEMPLATE: &str = include_str!("../../templates/gatling.scala.j2");

/// Prefix of every scenario file name
pub const FILE_PREFIX: &str = "replay_scenarios";

/// Template text and extension, selected once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Template source
    pub template: String,
    /// Extension of written files, without the dot
    pub extension: String,
}

impl OutputFormat {
    /// Create a format from template text and extension
    pub fn new(template: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            extension: extension.into(),
        }
    }

    /// Built-in Karate format
    #[must_use]
    pub fn karate() -> Self {
        Self::new(KARATE_TEMPLATE, "feature")
    }

    /// Built-in Gatling format
    #[must_use]
    pub fn gatling() -> Self {
        Self::new(GATLING_TEMPLATE, "scala")
    }

    /// Resolve `karate`, `gatling`, or a path to a custom template
    ///
    /// # Errors
    ///
    /// Returns error if a custom template cannot be read or has no extension
    pub fn resolve(template: &str, extension: Option<&str>) -> Result<Self> {
        match template {
            "karate" => Ok(Self::karate()),
            "gatling" => Ok(Self::gatling()),
            path => {
                let extension = extension.filter(|e| !e.is_empty()).ok_or_else(|| {
                    ReplayError::ConfigError(
                        "A custom template requires an output extension".to_string(),
                    )
                })?;
                let text = std::fs::read_to_string(Path::new(path)).map_err(|e| {
                    ReplayError::ConfigError(format!("Failed to load template {path}: {e}"))
                })?;
                Ok(Self::new(text, extension.trim_start_matches('.')))
            }
        }
    }

    /// File name for the write numbered `counter`
    ///
    /// # Errors
    ///
    /// Returns error if the format has no extension
    pub fn file_name(&self, counter: usize) -> Result<String> {
        if self.extension.is_empty() {
            return Err(ReplayError::ConfigError(
                "File extension is empty, not writing file".to_string(),
            ));
        }
        Ok(format!("{FILE_PREFIX}_{counter}.{}", self.extension))
    }
}
