//! The read-record data model (spec §3) and the FASTQ parser collaborator
//! (spec §6).
//!
//! The parser's own correctness — malformed-FASTQ rejection, transparent
//! gzip decompression — is an external collaborator out of this crate's
//! scope (spec §1). What *is* in scope is the batch hand-off interface the
//! rest of the core consumes: `read_chunk(n) -> Option<Vec<ReadRecord>>` plus
//! length sampling for the analyser. `FastqParser` here is the minimal,
//! trusted-input implementation needed to run the pipeline end to end; any
//! record it emits is assumed valid (matching sequence/quality length, `id`
//! without a leading `@` or trailing whitespace).

use crate::error::{FqcError, FqcResult};
use std::io::{BufRead, BufReader, Read};

/// A logical FASTQ record: `(id, sequence, quality, read_length)` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Without the leading `@` and without trailing whitespace.
    pub id: String,
    pub sequence: Vec<u8>,
    pub quality: Vec<u8>,
}

impl ReadRecord {
    pub fn read_length(&self) -> usize {
        self.sequence.len()
    }

    /// Trusted-input validation: the one check the core still performs on
    /// every record it is handed, since downstream codecs assume it holds.
    pub fn validate(&self) -> FqcResult<()> {
        if self.sequence.len() != self.quality.len() {
            return Err(FqcError::format(format!(
                "record {:?}: sequence length {} != quality length {}",
                self.id,
                self.sequence.len(),
                self.quality.len()
            )));
        }
        if self.sequence.is_empty() {
            return Err(FqcError::format(format!("record {:?}: zero-length read", self.id)));
        }
        Ok(())
    }
}

/// Streams batches of `ReadRecord` out of a plain-text FASTQ source.
///
/// Decompression of gzipped input is the external parser collaborator's
/// job (spec §1, §6); `FastqParser` only ever sees the decompressed byte
/// stream, which callers arrange (e.g. by wrapping a `flate2::read::MultiGzDecoder`
/// before constructing this type).
pub struct FastqParser<R: Read> {
    lines: std::io::Lines<BufReader<R>>,
}

impl<R: Read> FastqParser<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: BufReader::new(reader).lines() }
    }

    /// Pull the next record, or `None` at a clean EOF.
    fn read_one(&mut self) -> FqcResult<Option<ReadRecord>> {
        let id_line = match self.lines.next() {
            None => return Ok(None),
            Some(line) => line?,
        };
        if id_line.is_empty() {
            return Ok(None);
        }
        let id = id_line
            .strip_prefix('@')
            .ok_or_else(|| FqcError::format(format!("record identifier missing '@': {id_line:?}")))?
            .trim_end()
            .to_string();

        let sequence = self
            .lines
            .next()
            .ok_or_else(|| FqcError::format("truncated record: missing sequence line"))??
            .into_bytes();

        let sep_line = self
            .lines
            .next()
            .ok_or_else(|| FqcError::format("truncated record: missing separator line"))??;
        if !sep_line.starts_with('+') {
            return Err(FqcError::format(format!("separator line missing '+': {sep_line:?}")));
        }

        let quality = self
            .lines
            .next()
            .ok_or_else(|| FqcError::format("truncated record: missing quality line"))??
            .into_bytes();

        let record = ReadRecord { id, sequence, quality };
        record.validate()?;
        Ok(Some(record))
    }

    /// Pull up to `n` records. Returns `None` only when zero records were
    /// available (clean EOF); a short batch at end-of-input still returns
    /// `Some` with fewer than `n` records.
    pub fn read_chunk(&mut self, n: usize) -> FqcResult<Option<Vec<ReadRecord>>> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            match self.read_one()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

/// Length statistics sampled from a batch of records, used by the global
/// analyser's regime classification (spec §4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthStats {
    pub median_length: usize,
    pub max_length: usize,
}

pub fn sample_length_stats(records: &[ReadRecord]) -> LengthStats {
    if records.is_empty() {
        return LengthStats::default();
    }
    let mut lengths: Vec<usize> = records.iter().map(|r| r.read_length()).collect();
    lengths.sort_unstable();
    let max_length = *lengths.last().unwrap();
    let median_length = lengths[lengths.len() / 2];
    LengthStats { median_length, max_length }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_record() {
        let data = b"@r1\nACGT\n+\nIIII\n".to_vec();
        let mut parser = FastqParser::new(&data[..]);
        let batch = parser.read_chunk(10).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "r1");
        assert_eq!(batch[0].sequence, b"ACGT");
        assert_eq!(batch[0].quality, b"IIII");
        assert!(parser.read_chunk(10).unwrap().is_none());
    }

    #[test]
    fn batches_span_exact_and_short_chunks() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend_from_slice(format!("@r{i}\nACGT\n+\nIIII\n").as_bytes());
        }
        let mut parser = FastqParser::new(&data[..]);
        let first = parser.read_chunk(3).unwrap().unwrap();
        assert_eq!(first.len(), 3);
        let second = parser.read_chunk(3).unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert!(parser.read_chunk(3).unwrap().is_none());
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let data = b"@r1\nACGT\n+\nII\n".to_vec();
        let mut parser = FastqParser::new(&data[..]);
        assert!(parser.read_chunk(10).is_err());
    }

    #[test]
    fn length_stats_median_and_max() {
        let records = vec![
            ReadRecord { id: "a".into(), sequence: vec![b'A'; 10], quality: vec![b'I'; 10] },
            ReadRecord { id: "b".into(), sequence: vec![b'A'; 20], quality: vec![b'I'; 20] },
            ReadRecord { id: "c".into(), sequence: vec![b'A'; 30], quality: vec![b'I'; 30] },
        ];
        let stats = sample_length_stats(&records);
        assert_eq!(stats.median_length, 20);
        assert_eq!(stats.max_length, 30);
    }
}
