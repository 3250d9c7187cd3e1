use super::error::{RestartError, RestartParseErrorKind};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing OSRW restart formats.
///
/// Implementors handle format-specific parsing and serialization of one restart record.
pub trait RestartFile {
    /// The state persisted by this format.
    type Data;

    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads a restart record from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues. No partially
    /// parsed state is returned.
    fn read_from(reader: &mut impl BufRead) -> Result<Self::Data, Self::Error>;

    /// Writes a restart record to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(data: &Self::Data, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads a restart record from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Data, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a restart record to a file path, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(data: &Self::Data, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(data, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Line-oriented `Key value` record reader shared by the restart formats.
pub(crate) struct RecordReader<'a, R: BufRead> {
    reader: &'a mut R,
    line: usize,
    buffer: String,
}

impl<'a, R: BufRead> RecordReader<'a, R> {
    pub(crate) fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            line: 0,
            buffer: String::new(),
        }
    }

    /// Next non-empty line, trimmed, or `None` at end of input.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<&str>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !self.buffer.trim().is_empty() {
                break;
            }
        }
        Ok(Some(self.buffer.trim()))
    }

    /// Reads the next `Key value` record, checking the key. Returns the raw value.
    pub(crate) fn record(&mut self, key: &'static str) -> Result<String, RestartError> {
        let line = self
            .next_line()?
            .ok_or(RestartError::MissingRecord(key))?
            .to_string();
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(found), Some(value)) if found == key => Ok(value.to_string()),
            _ => Err(self.parse_error(RestartParseErrorKind::UnexpectedRecord {
                expected: key,
                found: line.clone(),
            })),
        }
    }

    pub(crate) fn f64_record(&mut self, key: &'static str) -> Result<f64, RestartError> {
        let value = self.record(key)?;
        value
            .parse()
            .map_err(|_| self.parse_error(RestartParseErrorKind::InvalidFloat { value }))
    }

    pub(crate) fn usize_record(&mut self, key: &'static str) -> Result<usize, RestartError> {
        let value = self.record(key)?;
        value
            .parse()
            .map_err(|_| self.parse_error(RestartParseErrorKind::InvalidInt { value }))
    }

    /// Rejects the record just read unless `valid` holds.
    pub(crate) fn ensure(
        &self,
        valid: bool,
        describe: impl FnOnce() -> String,
    ) -> Result<(), RestartError> {
        if valid {
            Ok(())
        } else {
            Err(self.parse_error(RestartParseErrorKind::OutOfRange(describe())))
        }
    }

    pub(crate) fn parse_error(&self, kind: RestartParseErrorKind) -> RestartError {
        RestartError::Parse {
            line: self.line,
            kind,
        }
    }
}
