use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when reading the contents of a file fails.
#[derive(Debug, thiserror::Error)]
pub enum ReadFileError {
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("failed to read file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReadFileError {
    /// Returns the path of the file that could not be read.
    pub fn path(&self) -> &Path {
        match self {
            ReadFileError::Open(err) => &err.path,
            ReadFileError::Read { path, .. } => path,
        }
    }
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use mount_sentinel::fsutil;
/// let reader = fsutil::open_file_reader("/some/file.txt")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the whole file at `path` and returns the number of bytes read.
///
/// The contents are discarded, only the round trip through the filesystem matters.
///
/// # Errors
///
/// Returns [`ReadFileError::Open`] if the file cannot be opened, and
/// [`ReadFileError::Read`] if reading from it fails.
pub fn read_to_end(path: impl AsRef<Path>) -> Result<usize, ReadFileError> {
    let path = path.as_ref();
    let mut reader = open_file_reader(path)?;
    let mut buf = Vec::with_capacity(64);
    reader
        .read_to_end(&mut buf)
        .map_err(|source| ReadFileError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads a file into a string with surrounding whitespace trimmed.
///
/// # Errors
///
/// Same as [`read_to_end`]; invalid UTF-8 is reported as [`ReadFileError::Read`].
pub fn read_trimmed(path: impl AsRef<Path>) -> Result<String, ReadFileError> {
    let path = path.as_ref();
    let mut reader = open_file_reader(path)?;
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .map_err(|source| ReadFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(contents.trim().to_owned())
}
