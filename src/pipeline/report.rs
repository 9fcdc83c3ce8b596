//! Run statistics and the human-readable summary printed after a run.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Which pipeline mode produced a set of statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Extraction,
    Fingerprint,
    Survey,
}

/// Per-run counters. Returned by value from every run; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Records pulled from the input stream.
    pub total_records: u64,
    /// Records selected by the mode's filter (every record for an
    /// unfiltered fingerprint run).
    pub matched_records: u64,
    /// Records matching the taxonomic keyword set; 0 when not evaluated.
    pub taxon_records: u64,
    /// Sequence records or table rows written to the output.
    pub rows_written: u64,
}

impl PipelineStats {
    pub fn matched_percent(&self) -> f64 {
        100.0 * self.matched_records as f64 / self.total_records.max(1) as f64
    }

    pub fn taxon_percent(&self) -> f64 {
        100.0 * self.taxon_records as f64 / self.total_records.max(1) as f64
    }
}

/// Formats the end-of-run summary.
pub fn generate_report(mode: RunMode, stats: &PipelineStats, elapsed: Duration) -> String {
    let mut report = String::new();

    let title = match mode {
        RunMode::Extraction => "Marker Gene Extraction",
        RunMode::Fingerprint => "K-mer Fingerprinting",
        RunMode::Survey => "Annotation Survey",
    };
    let _ = writeln!(report, "{} Report", title);
    let _ = writeln!(report, "=================================================");
    let _ = writeln!(report, "  Total records processed: {}", stats.total_records);
    let _ = writeln!(
        report,
        "  Marker gene records: {} ({:.2}%)",
        stats.matched_records,
        stats.matched_percent()
    );
    if mode != RunMode::Fingerprint {
        let _ = writeln!(
            report,
            "  Taxonomic group records: {} ({:.2}%)",
            stats.taxon_records,
            stats.taxon_percent()
        );
    }
    if mode != RunMode::Survey {
        let _ = writeln!(report, "  Records written: {}", stats.rows_written);
    }
    let _ = writeln!(report, "  Processing time: {:.2} seconds", elapsed.as_secs_f64());

    report
}
