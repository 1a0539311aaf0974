//! Flat-file user table.
//!
//! Users live in a CSV file whose first line is always the header
//! `name,phone,email,gender,password`. Rows are only ever appended; lookups
//! scan the whole file in order. The mutex serializes writers and readers
//! inside this process only; a second process appending to the same file is
//! not coordinated with.
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::models::{UserRecord, USER_FIELDS};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub struct RecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes sure the file exists and starts with the header row.
    ///
    /// Returns `true` when the header had to be written. Existing contents
    /// are never truncated.
    pub fn initialize(&self) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let (_, created) = self.open_for_append()?;
        Ok(created)
    }

    /// Appends one row. No uniqueness or format checks are made.
    pub fn append(&self, record: &UserRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let (file, _) = self.open_for_append()?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush().map_err(|source| self.io_error(source))?;

        Ok(())
    }

    /// Returns the first user, in file order, whose email and password both
    /// match exactly.
    pub fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let _guard = self.lock.lock();
        let Some(mut reader) = self.reader()? else {
            return Ok(None);
        };

        for (index, result) in reader.deserialize::<UserRecord>().enumerate() {
            match result {
                Ok(user) => {
                    if user.email == email && user.password == password {
                        return Ok(Some(user));
                    }
                }
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    // +2: one for the header, one for 1-based line numbers
                    warn!("Skipping unreadable row {} in users file: {err}", index + 2);
                }
            }
        }

        Ok(None)
    }

    /// Number of readable data rows, excluding the header.
    pub fn count(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock();
        let Some(mut reader) = self.reader()? else {
            return Ok(0);
        };

        let mut rows = 0usize;
        for result in reader.records() {
            match result {
                Ok(_) => rows += 1,
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(_) => {}
            }
        }

        Ok(rows)
    }

    fn open_for_append(&self) -> Result<(File, bool), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        let is_empty = file
            .metadata()
            .map_err(|source| self.io_error(source))?
            .len()
            == 0;

        if !is_empty {
            return Ok((file, false));
        }

        {
            let mut writer = csv::Writer::from_writer(&file);
            writer.write_record(USER_FIELDS)?;
            writer.flush().map_err(|source| self.io_error(source))?;
        }

        Ok((file, true))
    }

    fn reader(&self) -> Result<Option<csv::Reader<File>>, StoreError> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(csv::Reader::from_reader(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
