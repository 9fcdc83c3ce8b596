//! Run configuration.
//!
//! Every field has a documented default, so an empty JSON object (or no
//! config file at all) describes the standard 18S / 4-mer run. Command-line
//! flags are applied on top of whatever the file provides.

use crate::bio::{self, KeywordSet};
use crate::error::{PipelineError, Result};
use crate::io::fasta::DEFAULT_LINE_WIDTH;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Configuration shared by all pipeline modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// K-mer length. Default 4.
    pub k: usize,

    /// Symbols in declaration order; drives vocabulary column order. Default "ATCG".
    pub alphabet: String,

    /// Phrases selecting marker-gene records.
    pub marker_keywords: Vec<String>,

    /// Phrases selecting the taxonomic group; reporting only.
    pub taxon_keywords: Vec<String>,

    /// Stop pulling records after this many. Default: no cap.
    pub max_records: Option<u64>,

    /// Progress callback cadence in records. Default 10,000; 0 disables.
    pub progress_interval: u64,

    /// Residues per line in FASTA output. Default 60; 0 disables wrapping.
    pub line_width: usize,

    /// Table field delimiter. Default ','.
    pub delimiter: char,

    /// Restrict fingerprinting to marker-gene records. Default false.
    pub prefilter: bool,

    /// Worker threads for k-mer counting. Default 1 (sequential).
    pub threads: usize,

    /// Records counted per parallel batch. Default 10,000.
    pub chunk_size: usize,

    /// Descriptions logged at the start of a survey. Default 10.
    pub preview_records: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            k: bio::DEFAULT_K,
            alphabet: bio::DEFAULT_ALPHABET.to_string(),
            marker_keywords: bio::MARKER_GENE_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            taxon_keywords: bio::EUKARYOTIC_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_records: None,
            progress_interval: 10_000,
            line_width: DEFAULT_LINE_WIDTH,
            delimiter: ',',
            prefilter: false,
            threads: 1,
            chunk_size: 10_000,
            preview_records: 10,
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                PipelineError::InvalidParameter(format!(
                    "cannot parse config '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks the parameters that are not covered by vocabulary generation.
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(PipelineError::InvalidParameter(format!(
                "delimiter {:?} must be a single ASCII character other than quote or newline",
                self.delimiter
            )));
        }
        if self.threads == 0 {
            return Err(PipelineError::InvalidParameter(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(PipelineError::InvalidParameter(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    pub fn marker_set(&self) -> KeywordSet {
        KeywordSet::new("marker", self.marker_keywords.iter().cloned())
    }

    pub fn taxon_set(&self) -> KeywordSet {
        KeywordSet::new("taxon", self.taxon_keywords.iter().cloned())
    }
}
