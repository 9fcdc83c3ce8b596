//! Command-line surface: subcommand definitions and their dispatch.
//!
//! Flags given on the command line override the values of `--config`.

use crate::config::PipelineConfig;
use crate::database::downloader::{NCBI_BLAST_DB_URL, NT_ARCHIVE_PREFIX};
use crate::database::{self, HttpArchiveSource, DEFAULT_MERGE_TOOL};
use crate::pipeline::{
    self, generate_report, LogProgress, PipelineDriver, ProgressObserver, RunMode, SilentProgress,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Marker gene extraction and k-mer fingerprinting", long_about = None)]
pub struct Cli {
    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress periodic progress messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download nt database archives into a local directory
    Fetch {
        /// Destination directory
        #[arg(short, long, default_value = "ncbi_nt_database")]
        dest: PathBuf,

        /// Maximum number of archives to download (all if omitted)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Directory URL listing the archives
        #[arg(long, default_value = NCBI_BLAST_DB_URL)]
        base_url: String,

        /// Archive name prefix
        #[arg(long, default_value = NT_ARCHIVE_PREFIX)]
        prefix: String,
    },

    /// Extract downloaded archives and merge them into one FASTA file
    Merge {
        /// Directory holding the downloaded .tar.gz archives
        #[arg(short, long, default_value = "ncbi_nt_database")]
        dir: PathBuf,

        /// Merged FASTA file name, relative to the archive directory
        #[arg(short, long, default_value = "combined_nt.fasta")]
        output: PathBuf,

        /// Merge tool executable
        #[arg(long, default_value = DEFAULT_MERGE_TOOL)]
        tool: String,

        /// Keep archives and extracted database files after merging
        #[arg(long)]
        keep_intermediates: bool,
    },

    /// Count marker gene and taxonomic records without writing output
    Survey {
        /// Input sequence file
        input: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Write marker gene records to a new FASTA file
    Extract {
        /// Input sequence file
        input: PathBuf,

        /// Output FASTA file
        #[arg(short, long)]
        output: PathBuf,

        /// Residues per output line (0 disables wrapping)
        #[arg(long)]
        line_width: Option<usize>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Write a k-mer count table with one row per record
    Fingerprint {
        /// Input sequence file
        input: PathBuf,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,

        /// Only fingerprint records matching the marker keywords
        #[arg(long)]
        prefilter: bool,

        /// Field delimiter (e.g. ',' or '\t')
        #[arg(long)]
        delimiter: Option<char>,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Print the annotation and leading residues of the first records
    Preview {
        /// Input sequence file
        input: PathBuf,

        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

/// Overrides shared by the streaming subcommands.
#[derive(Args, Debug, Default)]
pub struct RunOptions {
    /// K-mer length
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Alphabet in column order
    #[arg(long)]
    pub alphabet: Option<String>,

    /// Marker gene keyword (repeatable; replaces the defaults)
    #[arg(long = "marker-keyword")]
    pub marker_keywords: Vec<String>,

    /// Taxonomic keyword (repeatable; replaces the defaults)
    #[arg(long = "taxon-keyword")]
    pub taxon_keywords: Vec<String>,

    /// Stop after this many input records
    #[arg(long)]
    pub max_records: Option<u64>,

    /// Report progress every N records (0 disables)
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Number of threads used for k-mer counting
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Records counted per parallel batch
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl RunOptions {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(alphabet) = self.alphabet {
            config.alphabet = alphabet;
        }
        if !self.marker_keywords.is_empty() {
            config.marker_keywords = self.marker_keywords;
        }
        if !self.taxon_keywords.is_empty() {
            config.taxon_keywords = self.taxon_keywords;
        }
        if self.max_records.is_some() {
            config.max_records = self.max_records;
        }
        if let Some(interval) = self.progress_interval {
            config.progress_interval = interval;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?),
        None => Ok(PipelineConfig::default()),
    }
}

fn progress_observer(quiet: bool, label: &'static str) -> Box<dyn ProgressObserver> {
    if quiet {
        Box::new(SilentProgress)
    } else {
        Box::new(LogProgress::new(label))
    }
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Fetch {
            dest,
            limit,
            base_url,
            prefix,
        } => {
            let source = HttpArchiveSource::new(&base_url, &prefix)?;
            let paths = database::retrieve_archives(&source, &dest, limit)?;
            println!("Downloaded {} archives into {}", paths.len(), dest.display());
            Ok(())
        }

        Commands::Merge {
            dir,
            output,
            tool,
            keep_intermediates,
        } => {
            let parts = database::extract_archives(&dir)
                .with_context(|| format!("ensure {} contains .tar.gz archives", dir.display()))?;
            let output_path = dir.join(&output);
            database::merge_database(&tool, &parts, &output_path)?;
            if !keep_intermediates {
                database::cleanup_parts(&parts, &output_path)?;
            }
            println!("Merged database saved as: {}", output_path.display());
            Ok(())
        }

        Commands::Survey { input, options } => {
            options.apply(&mut config);
            let mut driver = PipelineDriver::new(config)?;
            let started = Instant::now();
            let mut progress = progress_observer(quiet, "survey");
            let stats = driver
                .run_survey(&input, progress.as_mut())
                .with_context(|| format!("survey stopped ({:?})", driver.state()))?;
            println!("{}", generate_report(RunMode::Survey, &stats, started.elapsed()));
            Ok(())
        }

        Commands::Extract {
            input,
            output,
            line_width,
            options,
        } => {
            options.apply(&mut config);
            if let Some(line_width) = line_width {
                config.line_width = line_width;
            }
            let mut driver = PipelineDriver::new(config)?;
            let started = Instant::now();
            let mut progress = progress_observer(quiet, "extract");
            let stats = driver
                .run_extraction(&input, &output, progress.as_mut())
                .with_context(|| format!("extraction stopped ({:?})", driver.state()))?;
            println!("{}", generate_report(RunMode::Extraction, &stats, started.elapsed()));
            println!("Saved {} sequences to '{}'", stats.rows_written, output.display());
            Ok(())
        }

        Commands::Fingerprint {
            input,
            output,
            prefilter,
            delimiter,
            options,
        } => {
            options.apply(&mut config);
            if prefilter {
                config.prefilter = true;
            }
            if let Some(delimiter) = delimiter {
                config.delimiter = delimiter;
            }
            let mut driver = PipelineDriver::new(config)?;
            info!(
                "Fingerprint table will have {} k-mer columns",
                driver.vocabulary().len()
            );
            let started = Instant::now();
            let mut progress = progress_observer(quiet, "fingerprint");
            let stats = driver
                .run_fingerprint(&input, &output, progress.as_mut())
                .with_context(|| format!("fingerprinting stopped ({:?})", driver.state()))?;
            println!("{}", generate_report(RunMode::Fingerprint, &stats, started.elapsed()));
            println!("Numerical fingerprints saved to: '{}'", output.display());
            Ok(())
        }

        Commands::Preview { input, count } => {
            let records = pipeline::preview(&input, count)?;
            println!(
                "Displaying annotations and sequences for the first {} records...",
                records.len()
            );
            for record in records {
                let shown = &record.residues[..record.residues.len().min(60)];
                println!("{}", "-".repeat(50));
                println!("Annotation: {}", record.description);
                println!("Sequence:   {}...", String::from_utf8_lossy(shown));
            }
            Ok(())
        }
    }
}
