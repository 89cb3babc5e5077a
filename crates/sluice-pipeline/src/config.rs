//! Pipeline configuration
//!
//! Pipelines are described by a YAML document:
//!
//! ```yaml
//! input: { type: json_lines, path: in.jsonl }
//! pipeline:
//!   max_in_flight: 4
//!   buffer_size: 100
//!   processors:
//!     - mapping: { file: map.yaml }
//! error_policy: route
//! error_output: { type: json_lines, path: errors.jsonl }
//! output: { type: json_lines, path: out.jsonl }
//! ```
//!
//! Relative paths are resolved against the directory of the configuration
//! file. The `route` policy requires an `error_output`.

use serde::{Deserialize, Serialize};
use sluice_query::dsl::MappingDefinition;
use sluice_query::{Mapping, MappingDsl};
use std::path::{Path, PathBuf};

use crate::{Error, ErrorPolicy, Result};

/// Default number of messages processed concurrently
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Default capacity of the channel between the input reader and processing
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub pipeline: ProcessingConfig,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default)]
    pub output: OutputConfig,

    /// Where routed failures are written
    #[serde(default)]
    pub error_output: Option<OutputConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Where messages come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Newline-delimited JSON file
    JsonLines { path: PathBuf },
    /// Newline-delimited JSON on standard input
    #[default]
    Stdin,
    /// Payloads listed in the configuration itself
    Memory {
        #[serde(default)]
        messages: Vec<serde_json::Value>,
    },
}

/// Where processed messages go
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    /// Newline-delimited JSON file
    JsonLines { path: PathBuf },
    /// Newline-delimited JSON on standard output
    #[default]
    Stdout,
    /// Kept in the run report only
    Memory,
}

/// Processing stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Records read ahead of processing
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            processors: Vec::new(),
        }
    }
}

/// A single processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub mapping: MappingSource,
}

/// A mapping given by file or inline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingSource {
    File { file: PathBuf },
    Inline(MappingDefinition),
}

impl PipelineConfig {
    /// Parse a configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::config("<inline>", e.to_string()))?;
        config.validate("<inline>")?;
        Ok(config)
    }

    /// Load a configuration file, resolving relative paths against its
    /// directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io("read config", path.display().to_string(), e.to_string()))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        config.validate(&path.display().to_string())?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    fn validate(&self, origin: &str) -> Result<()> {
        if self.pipeline.max_in_flight == 0 {
            return Err(Error::config(origin, "max_in_flight must be at least 1"));
        }
        if self.pipeline.buffer_size == 0 {
            return Err(Error::config(origin, "buffer_size must be at least 1"));
        }
        if self.error_policy == ErrorPolicy::Route && self.error_output.is_none() {
            return Err(Error::config(
                origin,
                "error_policy 'route' requires an error_output",
            ));
        }
        Ok(())
    }

    /// Resolve a configured path against the configuration directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Compile every processor's mapping, in order
    pub fn load_processors(&self) -> Result<Vec<Mapping>> {
        self.pipeline
            .processors
            .iter()
            .map(|processor| match &processor.mapping {
                MappingSource::File { file } => {
                    let path = self.resolve(file);
                    MappingDsl::parse_file(&path)
                        .map_err(|e| Error::config(path.display().to_string(), e.to_string()))
                }
                MappingSource::Inline(definition) => definition
                    .compile()
                    .map_err(|e| Error::config(definition.name.clone(), e.to_string())),
            })
            .collect()
    }
}
