use crate::errors::{BadElfError, Result};
use std::fs::File;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

/// Reads a file line by line into a reusable buffer, tagging errors with the
/// path.
pub struct BufReader {
    reader: io::BufReader<File>,
    path: PathBuf,
    /// number of lines read so far
    pub line: usize,
}

impl BufReader {
    /// Opens the file from the path into a reader
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| BadElfError::io(&path, e))?;
        let reader = io::BufReader::new(file);
        Ok(Self { reader,
                  path,
                  line: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a line from the buffer reader to mutable string, None at the end
    /// of the file.
    pub fn read_line<'buf>(&mut self,
                           buffer: &'buf mut String)
                           -> Option<Result<&'buf mut String>> {
        buffer.clear();
        match self.reader.read_line(buffer) {
            Ok(0) => None,
            Ok(_) => {
                self.line += 1;
                Some(Ok(buffer))
            }
            Err(e) => Some(Err(BadElfError::io(&self.path, e))),
        }
    }

    /// Reads the next line, failing at the end of the file.
    pub fn expect_line<'buf>(&mut self,
                             buffer: &'buf mut String,
                             what: &str)
                             -> Result<&'buf mut String> {
        let line = self.line + 1;
        match self.read_line(buffer) {
            Some(result) => result,
            None => Err(self.error(format!("file ended at line {} while reading {}",
                                           line,
                                           what))),
        }
    }

    /// A parse error at the current line.
    pub fn error(&self, message: impl Into<String>) -> BadElfError {
        BadElfError::parse(&self.path,
                           format!("line {}: {}", self.line, message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_missing_file() {
        match BufReader::open("/this/file/does/not/exist") {
            Err(BadElfError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/this/file/does/not/exist"))
            }
            _ => panic!("expected an io error"),
        }
    }
}
