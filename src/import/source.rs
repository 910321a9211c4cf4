//! Record sources feeding the importers.

use crate::codec::RawRecord;
use crate::error::ImportError;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Sequential producer of raw records.
///
/// Sources are read by a single caller at a time; the concurrent importer
/// gives its source to one reader task.
pub trait RecordSource: Send + 'static {
    /// Read and discard the header line.
    ///
    /// Fails with [`ImportError::MissingHeader`] on empty input.
    fn read_header(&mut self) -> Result<(), ImportError>;

    /// Next data record, or `None` at end of input.
    fn next_record(&mut self) -> Result<Option<RawRecord>, ImportError>;
}

/// CSV file reader.
///
/// Records may have any number of fields; shape checking is left to the
/// codec so that a ragged line is skipped instead of aborting the import.
pub struct CsvSource<R> {
    reader: csv::Reader<R>,
    record: StringRecord,
}

impl<R: Read> CsvSource<R> {
    pub fn new(input: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        Self {
            reader,
            record: StringRecord::new(),
        }
    }
}

impl CsvSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::with_capacity(1 << 20, file)))
    }
}

impl<R: Read + Send + 'static> RecordSource for CsvSource<R> {
    fn read_header(&mut self) -> Result<(), ImportError> {
        if self.reader.read_record(&mut self.record)? {
            log::debug!("skipping header with {} columns", self.record.len());
            Ok(())
        } else {
            Err(ImportError::MissingHeader)
        }
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>, ImportError> {
        if self.reader.read_record(&mut self.record)? {
            Ok(Some(self.record.iter().map(str::to_string).collect()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn header_is_skipped_and_records_follow() {
        let input = "a,b,c\n1,2,3\n4,,\"6,7\"\n";
        let mut source = CsvSource::new(input.as_bytes());

        source.read_header().expect("header");
        assert_eq!(
            source.next_record().expect("read"),
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
        assert_eq!(
            source.next_record().expect("read"),
            Some(vec!["4".to_string(), String::new(), "6,7".to_string()])
        );
        assert_eq!(source.next_record().expect("read"), None);
    }

    #[test]
    fn ragged_rows_are_returned_not_rejected() {
        let input = "a,b,c\n1,2\n1,2,3,4\n";
        let mut source = CsvSource::new(input.as_bytes());

        source.read_header().expect("header");
        assert_eq!(source.next_record().expect("read").map(|r| r.len()), Some(2));
        assert_eq!(source.next_record().expect("read").map(|r| r.len()), Some(4));
    }

    #[test]
    fn empty_input_has_no_header() {
        let mut source = CsvSource::new("".as_bytes());
        assert!(matches!(source.read_header(), Err(ImportError::MissingHeader)));
    }

    #[test]
    fn invalid_utf8_is_a_read_error() {
        let input: &[u8] = b"a,b\n\xff\xfe,1\n";
        let mut source = CsvSource::new(input);

        source.read_header().expect("header");
        assert!(matches!(source.next_record(), Err(ImportError::SourceRead(_))));
    }

    #[test]
    fn opens_files_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "h1,h2").expect("write");
        writeln!(file, "x,y").expect("write");

        let mut source = CsvSource::open(file.path()).expect("open");
        source.read_header().expect("header");
        assert_eq!(
            source.next_record().expect("read"),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CsvSource::open("/definitely/not/here.csv")
            .err()
            .expect("open fails");
        assert!(matches!(err, ImportError::Open { .. }));
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }
}
