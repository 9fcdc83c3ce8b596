//! Streaming FASTA records in and out.
//!
//! Reading leverages the `needletail` crate, which parses record by record
//! and handles gzip/bzip2/xz/zstd compressed input automatically, so
//! arbitrarily large archives never have to fit in memory.

use crate::error::{PipelineError, Result};
use flate2::bufread::MultiGzDecoder;
use needletail::errors::ParseErrorKind;
use needletail::{parse_fastx_reader, FastxReader};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// Residues per line when writing FASTA.
pub const DEFAULT_LINE_WIDTH: usize = 60;

/// One parsed record.
///
/// `description` is the whole header line after `>`, so it embeds the
/// identifier; keyword filters run against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub identifier: String,
    pub description: String,
    pub residues: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(
        identifier: impl Into<String>,
        description: impl Into<String>,
        residues: impl Into<Vec<u8>>,
    ) -> Self {
        SequenceRecord {
            identifier: identifier.into(),
            description: description.into(),
            residues: residues.into(),
        }
    }

    /// Splits a raw header into (identifier, description).
    fn from_header(header: &[u8], residues: Vec<u8>) -> Self {
        let description = String::from_utf8_lossy(header).trim_end().to_string();
        let identifier = description
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        Self::new(identifier, description, residues)
    }

    /// Header text written after `>`.
    pub fn header(&self) -> String {
        if self.description.is_empty() {
            self.identifier.clone()
        } else if self.identifier.is_empty() || self.description.starts_with(&self.identifier) {
            self.description.clone()
        } else {
            format!("{} {}", self.identifier, self.description)
        }
    }
}

/// Leading bytes of a gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Lazy, single-pass stream of [`SequenceRecord`]s.
///
/// Each record is yielded as soon as the next header (or end of input) is
/// seen. After the first error the stream is exhausted.
pub struct FastaStream {
    reader: Option<Box<dyn FastxReader>>,
}

impl FastaStream {
    /// Opens a (possibly compressed) sequence file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::Io(io::Error::new(
                e.kind(),
                format!("cannot open sequence file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Self> {
        Self::open(Box::new(reader), true)
    }

    /// Blank lines before the first record are dropped. Plain FASTA text
    /// (including gzip-compressed text) is handed to the parser through
    /// [`PaddedText`]; anything else goes to needletail untouched.
    fn open(reader: Box<dyn Read + Send>, decode_gzip: bool) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        match skip_blank_lines(&mut reader)? {
            None => Ok(FastaStream { reader: None }),
            Some(b'>') => Self::from_parse(parse_fastx_reader(PaddedText::new(reader))),
            Some(_) if decode_gzip && reader.buffer().starts_with(&GZIP_MAGIC) => {
                Self::open(Box::new(MultiGzDecoder::new(reader)), false)
            }
            Some(_) => Self::from_parse(parse_fastx_reader(reader)),
        }
    }

    fn from_parse(
        parsed: std::result::Result<Box<dyn FastxReader>, needletail::errors::ParseError>,
    ) -> Result<Self> {
        match parsed {
            Ok(reader) => Ok(FastaStream {
                reader: Some(reader),
            }),
            Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => Ok(FastaStream { reader: None }),
            Err(e) => Err(e.into()),
        }
    }
}

impl Iterator for FastaStream {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let parsed = match reader.next()? {
            Ok(record) => Ok(SequenceRecord::from_header(
                record.id(),
                record.seq().into_owned(),
            )),
            Err(e) => Err(e),
        };
        if parsed.is_err() {
            self.reader = None;
        }
        Some(parsed.map_err(PipelineError::from))
    }
}

/// Consumes ASCII whitespace and returns the first byte after it, or `None`
/// when the input holds nothing else.
fn skip_blank_lines<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let (blank, first) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let blank = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            (blank, buf.get(blank).copied())
        };
        reader.consume(blank);
        if first.is_some() {
            return Ok(first);
        }
    }
}

/// FASTA text followed by one extra empty line.
///
/// needletail only closes a record once a line break follows its header, so
/// a header-only record at the very end of the input would otherwise be
/// reported as truncated. An empty residue line contributes no residues.
struct PaddedText<R> {
    inner: R,
    last: Option<u8>,
    tail: &'static [u8],
    exhausted: bool,
}

impl<R: Read> PaddedText<R> {
    fn new(inner: R) -> Self {
        PaddedText {
            inner,
            last: None,
            tail: b"",
            exhausted: false,
        }
    }
}

impl<R: Read> Read for PaddedText<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.exhausted {
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.last = Some(buf[n - 1]);
                return Ok(n);
            }
            self.exhausted = true;
            self.tail = if self.last == Some(b'\n') {
                &b"\n"[..]
            } else {
                &b"\n\n"[..]
            };
        }
        let n = self.tail.len().min(buf.len());
        buf[..n].copy_from_slice(&self.tail[..n]);
        self.tail = &self.tail[n..];
        Ok(n)
    }
}

/// Appends records to a sink in FASTA format.
pub struct FastaWriter<W: Write> {
    sink: W,
    line_width: usize,
}

impl<W: Write> FastaWriter<W> {
    /// `line_width == 0` writes each sequence on a single line.
    pub fn new(sink: W, line_width: usize) -> Self {
        FastaWriter { sink, line_width }
    }

    pub fn write_record(&mut self, record: &SequenceRecord) -> Result<()> {
        writeln!(self.sink, ">{}", record.header())?;
        if record.residues.is_empty() {
            return Ok(());
        }
        let width = if self.line_width == 0 {
            record.residues.len()
        } else {
            self.line_width
        };
        for line in record.residues.chunks(width) {
            self.sink.write_all(line)?;
            self.sink.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{BufWriter, Cursor};
    use tempfile::tempdir;

    fn parse(data: &'static str) -> Result<Vec<SequenceRecord>> {
        FastaStream::from_reader(Cursor::new(data.as_bytes()))?.collect()
    }

    // Sink whose every write fails
    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }
    }

    #[test]
    fn test_parse_multiline_records() {
        let records =
            parse(">seq1 Homo sapiens 18S ribosomal RNA\nACGT\nacgt\n>seq2\nGGGG\n").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "seq1");
        assert_eq!(records[0].description, "seq1 Homo sapiens 18S ribosomal RNA");
        assert_eq!(records[0].residues, b"ACGTacgt");
        assert_eq!(records[1].identifier, "seq2");
        assert_eq!(records[1].description, "seq2");
        assert_eq!(records[1].residues, b"GGGG");
    }

    #[test]
    fn test_residues_before_header_is_malformed() {
        assert!(matches!(
            parse("ACGT\n>seq1\nACGT\n"),
            Err(PipelineError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_header_only_records_have_empty_residues() {
        for data in [">a x\nACGT\n>b\n", ">a x\nACGT\n>b", ">a x\nACGT\n>b\n\n"] {
            let records = parse(data).unwrap();
            assert_eq!(records.len(), 2, "input {:?}", data);
            assert_eq!(records[0].residues, b"ACGT");
            assert_eq!(records[1].identifier, "b");
            assert!(records[1].residues.is_empty());
        }

        let middle = parse(">a desc\n>b\nACGT\n").unwrap();
        assert!(middle[0].residues.is_empty());
        assert_eq!(middle[1].residues, b"ACGT");

        let single = parse(">only\n").unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].identifier, "only");
    }

    #[test]
    fn test_leading_blank_lines_are_skipped() {
        let records = parse("\n\n>a x\nACGT\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "a x");
        assert_eq!(records[0].residues, b"ACGT");

        let crlf = parse("\r\n  \r\n>a x\r\nACGT\r\n").unwrap();
        assert_eq!(crlf[0].identifier, "a");
        assert_eq!(crlf[0].residues, b"ACGT");
    }

    #[test]
    fn test_empty_input_yields_no_records() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n \n").unwrap().is_empty());

        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.fa");
        File::create(&path).unwrap();
        assert_eq!(FastaStream::from_path(&path).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = FastaStream::from_path(dir.path().join("absent.fa"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_gzip_input_is_decoded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.fa.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"\n>a 18S rRNA\nACGT\nAC\n>b\n").unwrap();
        encoder.finish().unwrap();

        let records: Vec<SequenceRecord> = FastaStream::from_path(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].residues, b"ACGTAC");
        assert!(records[1].residues.is_empty());
    }

    #[test]
    fn test_fastq_input_is_accepted() {
        let records = parse("@r1 read one\nACGT\n+\nIIII\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "r1");
        assert_eq!(records[0].residues, b"ACGT");
    }

    #[test]
    fn test_writer_wraps_residues() {
        let record = SequenceRecord::new("id1", "id1 18S rRNA", b"ACGTACGTAC".to_vec());
        let mut out = Vec::new();
        FastaWriter::new(&mut out, 4).write_record(&record).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), ">id1 18S rRNA\nACGT\nACGT\nAC\n");
    }

    #[test]
    fn test_writer_prefixes_identifier_when_missing_from_description() {
        let record = SequenceRecord::new("id1", "some gene", b"AC".to_vec());
        assert_eq!(record.header(), "id1 some gene");

        let bare = SequenceRecord::new("id2", "", b"AC".to_vec());
        assert_eq!(bare.header(), "id2");
    }

    #[test]
    fn test_unwritable_sink_is_io_error() {
        let record = SequenceRecord::new("id1", "id1 18S rRNA", b"ACGT".to_vec());
        let mut writer = FastaWriter::new(ClosedSink, 60);

        match writer.write_record(&record) {
            Err(PipelineError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected Io, got {:?}", other),
        }
        assert!(matches!(writer.flush(), Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_written_records_parse_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.fa");
        let original = vec![
            SequenceRecord::new("a", "a first", b"ACGTACGTACGTACGTACGT".to_vec()),
            SequenceRecord::new("b", "b second", b"TTTT".to_vec()),
            SequenceRecord::new("c", "c empty", Vec::new()),
        ];

        let mut writer = FastaWriter::new(BufWriter::new(File::create(&path).unwrap()), 7);
        for record in &original {
            writer.write_record(record).unwrap();
        }
        writer.flush().unwrap();
        drop(writer);

        let parsed: Vec<SequenceRecord> = FastaStream::from_path(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(parsed, original);
    }
}
