//! Pipeline orchestration: stream -> filter -> count -> write.
//!
//! Every run is a single pass over the input. A run owns its input and
//! output handles, flushes whatever it has written before returning (even on
//! error), and hands its counters back by value.

use super::progress::ProgressObserver;
use super::report::PipelineStats;
use crate::bio::{AnnotationFilter, KmerCounter, KmerVocabulary, LinearScan};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::io::{FastaStream, FastaWriter, SequenceRecord, TableWriter};
use crate::utils::parallel::{ParallelConfig, ParallelExecutor};
use log::{debug, error, info, trace};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Index of the marker-gene set in the driver's filter.
const MARKER_SET: usize = 0;
/// Index of the taxonomic set in the driver's filter.
const TAXON_SET: usize = 1;

/// Lifecycle of a run.
///
/// `Idle -> Streaming -> {Filtering, Counting} -> Writing -> Streaming -> ...`
/// ending in `Done` or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Streaming,
    Filtering,
    Counting,
    Writing,
    Done,
    Aborted,
}

/// Runs the extraction, fingerprint and survey modes with one validated
/// configuration.
pub struct PipelineDriver {
    config: PipelineConfig,
    vocabulary: KmerVocabulary,
    filter: AnnotationFilter,
    state: RunState,
}

impl PipelineDriver {
    /// Validates `config` and builds the vocabulary; fails before any input
    /// is touched.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let vocabulary = KmerVocabulary::generate(&config.alphabet, config.k)?;
        let filter = AnnotationFilter::with_matcher(
            vec![config.marker_set(), config.taxon_set()],
            Box::new(LinearScan),
        );
        debug!(
            "Vocabulary ready: k={}, alphabet={}, {} columns",
            config.k,
            config.alphabet,
            vocabulary.len()
        );

        Ok(PipelineDriver {
            config,
            vocabulary,
            filter,
            state: RunState::Idle,
        })
    }

    pub fn vocabulary(&self) -> &KmerVocabulary {
        &self.vocabulary
    }

    /// Terminal state of the most recent run, or `Idle` before the first.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Copies every marker-gene record of `input` to the FASTA file `output`.
    pub fn run_extraction<P: ProgressObserver + ?Sized>(
        &mut self,
        input: &Path,
        output: &Path,
        progress: &mut P,
    ) -> Result<PipelineStats> {
        info!(
            "Extracting marker gene records from {} into {}",
            input.display(),
            output.display()
        );
        let (records, sink) = match open_run_files(input, output) {
            Ok(files) => files,
            Err(e) => return Err(self.abort(RunState::Idle, e)),
        };
        self.run_extraction_stream(records, sink, progress)
    }

    /// Extraction over any record source and sink.
    ///
    /// The taxonomic set is evaluated for reporting only; it never changes
    /// which records are written.
    pub fn run_extraction_stream<I, W, P>(
        &mut self,
        records: I,
        sink: W,
        progress: &mut P,
    ) -> Result<PipelineStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
        W: Write,
        P: ProgressObserver + ?Sized,
    {
        let mut writer = FastaWriter::new(sink, self.config.line_width);
        let mut run = Run::new(&self.config, &self.filter, progress);
        let result = run.extract(records.into_iter(), &mut writer);
        let flushed = writer.flush();
        let stage = run.state;
        self.conclude(stage, result, flushed)
    }

    /// Writes the k-mer fingerprint table of `input` to `output`.
    pub fn run_fingerprint<P: ProgressObserver + ?Sized>(
        &mut self,
        input: &Path,
        output: &Path,
        progress: &mut P,
    ) -> Result<PipelineStats> {
        info!(
            "Fingerprinting {} (k={}, {} columns) into {}",
            input.display(),
            self.config.k,
            self.vocabulary.len(),
            output.display()
        );
        let (records, sink) = match open_run_files(input, output) {
            Ok(files) => files,
            Err(e) => return Err(self.abort(RunState::Idle, e)),
        };
        self.run_fingerprint_stream(records, sink, progress)
    }

    /// Fingerprinting over any record source and sink.
    ///
    /// Rows are written in input order. With `threads > 1` counting runs on a
    /// thread pool in batches of `chunk_size`; the output is byte-identical to
    /// the sequential path.
    pub fn run_fingerprint_stream<I, W, P>(
        &mut self,
        records: I,
        sink: W,
        progress: &mut P,
    ) -> Result<PipelineStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
        W: Write,
        P: ProgressObserver + ?Sized,
    {
        let executor = if self.config.threads > 1 {
            let parallel = ParallelConfig {
                threads: self.config.threads,
                chunk_size: self.config.chunk_size,
            };
            match ParallelExecutor::new(parallel) {
                Ok(executor) => Some(executor),
                Err(e) => return Err(self.abort(RunState::Idle, e)),
            }
        } else {
            None
        };

        let mut table = TableWriter::new(sink, self.config.delimiter_byte());
        let mut run = Run::new(&self.config, &self.filter, progress);
        let result = match &executor {
            Some(executor) => {
                run.fingerprint_parallel(records.into_iter(), &self.vocabulary, executor, &mut table)
            }
            None => run.fingerprint(records.into_iter(), &self.vocabulary, &mut table),
        };
        let flushed = table.flush();
        let stage = run.state;
        self.conclude(stage, result, flushed)
    }

    /// Counts marker-gene and taxonomic records without writing output.
    pub fn run_survey<P: ProgressObserver + ?Sized>(
        &mut self,
        input: &Path,
        progress: &mut P,
    ) -> Result<PipelineStats> {
        info!("Surveying annotations in {}", input.display());
        let records = match FastaStream::from_path(input) {
            Ok(records) => records,
            Err(e) => return Err(self.abort(RunState::Idle, e)),
        };
        self.run_survey_stream(records, progress)
    }

    pub fn run_survey_stream<I, P>(&mut self, records: I, progress: &mut P) -> Result<PipelineStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
        P: ProgressObserver + ?Sized,
    {
        let mut run = Run::new(&self.config, &self.filter, progress);
        let result = run.survey(records.into_iter());
        let stage = run.state;
        self.conclude(stage, result, Ok(()))
    }

    fn conclude(
        &mut self,
        stage: RunState,
        result: Result<PipelineStats>,
        flushed: Result<()>,
    ) -> Result<PipelineStats> {
        match result.and_then(|stats| flushed.map(|()| stats)) {
            Ok(stats) => {
                self.state = RunState::Done;
                debug!("Run finished: {:?}", stats);
                Ok(stats)
            }
            Err(e) => Err(self.abort(stage, e)),
        }
    }

    fn abort(&mut self, stage: RunState, err: PipelineError) -> PipelineError {
        error!("Run aborted while {:?}: {}", stage, err);
        self.state = RunState::Aborted;
        err
    }
}

/// Reads the first `count` records of a sequence file.
pub fn preview(input: &Path, count: usize) -> Result<Vec<SequenceRecord>> {
    FastaStream::from_path(input)?.take(count).collect()
}

/// Opens the input before creating the output, so a missing input never
/// leaves an empty output file behind.
fn open_run_files(input: &Path, output: &Path) -> Result<(FastaStream, BufWriter<File>)> {
    let records = FastaStream::from_path(input)?;
    let file = File::create(output).map_err(|e| {
        PipelineError::Io(io::Error::new(
            e.kind(),
            format!("cannot create '{}': {}", output.display(), e),
        ))
    })?;
    Ok((records, BufWriter::new(file)))
}

/// Mutable state of one run, borrowing the driver's immutable parts.
struct Run<'a, P: ?Sized> {
    config: &'a PipelineConfig,
    filter: &'a AnnotationFilter,
    progress: &'a mut P,
    stats: PipelineStats,
    state: RunState,
}

impl<'a, P: ProgressObserver + ?Sized> Run<'a, P> {
    fn new(config: &'a PipelineConfig, filter: &'a AnnotationFilter, progress: &'a mut P) -> Self {
        Run {
            config,
            filter,
            progress,
            stats: PipelineStats::default(),
            state: RunState::Idle,
        }
    }

    fn enter(&mut self, state: RunState) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Pulls the next record, or `None` once the input or the record cap is
    /// exhausted. Nothing is read past the cap.
    fn next_record<I>(&mut self, records: &mut I) -> Result<Option<SequenceRecord>>
    where
        I: Iterator<Item = Result<SequenceRecord>>,
    {
        if let Some(cap) = self.config.max_records {
            if self.stats.total_records >= cap {
                info!("Reached record limit of {}; stopping", cap);
                return Ok(None);
            }
        }
        self.enter(RunState::Streaming);
        match records.next() {
            Some(record) => {
                let record = record?;
                self.stats.total_records += 1;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn record_done(&mut self) {
        let interval = self.config.progress_interval;
        if interval > 0 && self.stats.total_records % interval == 0 {
            self.progress.on_progress(&self.stats);
        }
    }

    /// Evaluates both keyword sets and tallies them; returns the marker hit.
    fn tally(&mut self, record: &SequenceRecord) -> bool {
        self.enter(RunState::Filtering);
        let membership = self.filter.evaluate(&record.description);
        if membership.get(TAXON_SET) {
            self.stats.taxon_records += 1;
        }
        let marker = membership.get(MARKER_SET);
        if marker {
            self.stats.matched_records += 1;
        }
        marker
    }

    /// Whether a record gets a fingerprint row.
    fn select(&mut self, record: &SequenceRecord) -> bool {
        self.enter(RunState::Filtering);
        let selected =
            !self.config.prefilter || self.filter.matches(MARKER_SET, &record.description);
        if selected {
            self.stats.matched_records += 1;
        }
        selected
    }

    fn extract<I, W>(&mut self, mut records: I, writer: &mut FastaWriter<W>) -> Result<PipelineStats>
    where
        I: Iterator<Item = Result<SequenceRecord>>,
        W: Write,
    {
        while let Some(record) = self.next_record(&mut records)? {
            if self.tally(&record) {
                self.enter(RunState::Writing);
                writer.write_record(&record)?;
                self.stats.rows_written += 1;
            }
            self.record_done();
        }
        Ok(self.stats)
    }

    fn survey<I>(&mut self, mut records: I) -> Result<PipelineStats>
    where
        I: Iterator<Item = Result<SequenceRecord>>,
    {
        while let Some(record) = self.next_record(&mut records)? {
            if self.stats.total_records <= self.config.preview_records as u64 {
                info!("  - Record {}: {}", self.stats.total_records, record.description);
            }
            self.tally(&record);
            self.record_done();
        }
        Ok(self.stats)
    }

    fn fingerprint<I, W>(
        &mut self,
        mut records: I,
        vocabulary: &KmerVocabulary,
        table: &mut TableWriter<W>,
    ) -> Result<PipelineStats>
    where
        I: Iterator<Item = Result<SequenceRecord>>,
        W: Write,
    {
        let counter = KmerCounter::new(vocabulary, self.config.k)?;
        self.enter(RunState::Writing);
        table.write_header(vocabulary)?;

        while let Some(record) = self.next_record(&mut records)? {
            if self.select(&record) {
                self.enter(RunState::Counting);
                let counts = counter.count(&record.residues);
                self.enter(RunState::Writing);
                table.write_row(&record.identifier, &counts)?;
                self.stats.rows_written += 1;
            }
            self.record_done();
        }
        Ok(self.stats)
    }

    fn fingerprint_parallel<I, W>(
        &mut self,
        mut records: I,
        vocabulary: &KmerVocabulary,
        executor: &ParallelExecutor,
        table: &mut TableWriter<W>,
    ) -> Result<PipelineStats>
    where
        I: Iterator<Item = Result<SequenceRecord>>,
        W: Write,
    {
        let counter = KmerCounter::new(vocabulary, self.config.k)?;
        self.enter(RunState::Writing);
        table.write_header(vocabulary)?;

        let mut batch: Vec<SequenceRecord> = Vec::with_capacity(executor.chunk_size());
        let pulled = loop {
            match self.next_record(&mut records) {
                Ok(Some(record)) => {
                    if self.select(&record) {
                        batch.push(record);
                    }
                    if batch.len() >= executor.chunk_size() {
                        self.write_batch(&mut batch, &counter, executor, table)?;
                    }
                    self.record_done();
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        // Records read before a failure are still written, as in the
        // sequential path.
        self.write_batch(&mut batch, &counter, executor, table)?;
        pulled?;
        Ok(self.stats)
    }

    fn write_batch<W: Write>(
        &mut self,
        batch: &mut Vec<SequenceRecord>,
        counter: &KmerCounter<'_>,
        executor: &ParallelExecutor,
        table: &mut TableWriter<W>,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.enter(RunState::Counting);
        let counts = executor.map_ordered(batch.as_slice(), |record| counter.count(&record.residues));

        self.enter(RunState::Writing);
        for (record, row) in batch.iter().zip(&counts) {
            table.write_row(&record.identifier, row)?;
            self.stats.rows_written += 1;
        }
        debug!("Wrote batch of {} rows", batch.len());
        batch.clear();
        Ok(())
    }
}
