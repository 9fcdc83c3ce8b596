//! Delimited fingerprint table: one `sequence_id` + k-mer header row, then one
//! row of counts per record, in encounter order.

use crate::bio::KmerVocabulary;
use crate::error::{PipelineError, Result};
use std::io::Write;

/// Name of the identifier column.
pub const ID_COLUMN: &str = "sequence_id";

pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
    /// Number of count columns, fixed once the header is written.
    columns: Option<usize>,
    record: csv::ByteRecord,
}

impl<W: Write> TableWriter<W> {
    pub fn new(sink: W, delimiter: u8) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(false)
            .from_writer(sink);
        TableWriter {
            writer,
            columns: None,
            record: csv::ByteRecord::new(),
        }
    }

    /// Writes `sequence_id` followed by every vocabulary entry in order.
    pub fn write_header(&mut self, vocabulary: &KmerVocabulary) -> Result<()> {
        if self.columns.is_some() {
            return Err(PipelineError::Encoding(
                "table header written twice".to_string(),
            ));
        }
        self.record.clear();
        self.record.push_field(ID_COLUMN.as_bytes());
        for kmer in vocabulary.iter() {
            self.record.push_field(kmer.as_bytes());
        }
        self.writer.write_byte_record(&self.record)?;
        self.columns = Some(vocabulary.len());
        Ok(())
    }

    /// Appends one row. The count vector must match the header width.
    pub fn write_row(&mut self, identifier: &str, counts: &[u64]) -> Result<()> {
        let columns = self.columns.ok_or_else(|| {
            PipelineError::Encoding("row written before table header".to_string())
        })?;
        if counts.len() != columns {
            return Err(PipelineError::Encoding(format!(
                "row '{}' has {} count fields, header has {}",
                identifier,
                counts.len(),
                columns
            )));
        }

        self.record.clear();
        self.record.push_field(identifier.as_bytes());
        for count in counts {
            self.record.push_field(count.to_string().as_bytes());
        }
        self.writer.write_byte_record(&self.record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::KmerCounter;
    use std::io;

    fn render(rows: &[(&str, Vec<u64>)], delimiter: u8) -> String {
        let vocab = KmerVocabulary::generate("AC", 2).unwrap();
        let mut out = Vec::new();
        let mut table = TableWriter::new(&mut out, delimiter);
        table.write_header(&vocab).unwrap();
        for (id, counts) in rows {
            table.write_row(id, counts).unwrap();
        }
        table.flush().unwrap();
        drop(table);
        String::from_utf8(out).unwrap()
    }

    // Sink whose every write fails
    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_header_and_rows_in_order() {
        let text = render(&[("s2", vec![1, 0, 0, 2]), ("s1", vec![0, 0, 0, 0])], b',');
        assert_eq!(
            text,
            "sequence_id,AA,AC,CA,CC\ns2,1,0,0,2\ns1,0,0,0,0\n"
        );
    }

    #[test]
    fn test_tab_delimiter() {
        let text = render(&[("s1", vec![12345, 0, 7, 0])], b'\t');
        assert_eq!(text, "sequence_id\tAA\tAC\tCA\tCC\ns1\t12345\t0\t7\t0\n");
    }

    #[test]
    fn test_field_count_mismatch_is_encoding_error() {
        let vocab = KmerVocabulary::generate("AC", 2).unwrap();
        let mut out = Vec::new();
        let mut table = TableWriter::new(&mut out, b',');
        table.write_header(&vocab).unwrap();

        let err = table.write_row("short", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, PipelineError::Encoding(_)));
        assert!(matches!(
            table.write_header(&vocab),
            Err(PipelineError::Encoding(_))
        ));
        table.flush().unwrap();
        drop(table);

        assert_eq!(String::from_utf8(out).unwrap(), "sequence_id,AA,AC,CA,CC\n");
    }

    #[test]
    fn test_row_before_header_is_encoding_error() {
        let mut table = TableWriter::new(Vec::new(), b',');
        assert!(matches!(
            table.write_row("s1", &[0, 0, 0, 0]),
            Err(PipelineError::Encoding(_))
        ));
    }

    #[test]
    fn test_unwritable_sink_is_io_error() {
        let vocab = KmerVocabulary::generate("ATCG", 4).unwrap();
        let mut table = TableWriter::new(ClosedSink, b',');
        let counts = vec![7u64; vocab.len()];

        // Rows are buffered, so the failure surfaces once the buffer spills.
        let err = table
            .write_header(&vocab)
            .err()
            .or_else(|| (0..200).find_map(|i| table.write_row(&format!("r{}", i), &counts).err()))
            .or_else(|| table.flush().err());

        match err {
            Some(PipelineError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_every_row_has_header_width() {
        let vocab = KmerVocabulary::generate("ATCG", 4).unwrap();
        let counter = KmerCounter::new(&vocab, 4).unwrap();
        let mut out = Vec::new();
        let mut table = TableWriter::new(&mut out, b',');
        table.write_header(&vocab).unwrap();
        for i in 0..50 {
            let seq = "ACGTN".repeat(i);
            table
                .write_row(&format!("r{}", i), &counter.count(seq.as_bytes()))
                .unwrap();
        }
        table.flush().unwrap();
        drop(table);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 51);
        assert!(text.lines().all(|line| line.split(',').count() == 257));
    }
}
