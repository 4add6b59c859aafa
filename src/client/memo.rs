use super::{RecordSource, SourceError};
use crate::loader::LoaderError;
use crate::model::Source;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, Error)]
pub enum MemoError {
    #[error("Unable to read record memo {0:?}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Unable to parse record memo {0:?}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Unable to write record memo {0:?}")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Unable to serialize record memo {0:?}")]
    Serialize(PathBuf, #[source] serde_json::Error),

    #[error("Unable to rename record memo: `{0:?}`")]
    Rename(PathBuf, #[source] std::io::Error),
}

/// Raw node responses captured for offline replay.
///
/// A run against a memo is identical to the run against the node it was captured from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecordMemo {
    pub transactions: Vec<Value>,
    pub pays: Vec<Value>,
}

impl RecordMemo {
    /// Fetch both record lists from `source`, on-chain first.
    ///
    /// A failure names the record list that could not be fetched.
    pub fn capture<S>(source: &S) -> Result<Self, LoaderError>
    where
        S: RecordSource + ?Sized,
    {
        let transactions = source
            .list_transactions()
            .map_err(|err| LoaderError::Source(Source::Onchain, err))?;
        let pays = source
            .list_pays()
            .map_err(|err| LoaderError::Source(Source::Lightning, err))?;

        Ok(Self { transactions, pays })
    }

    pub fn load<P>(path: P) -> Result<Self, MemoError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        debug!("Reading record memo from {path:?}");

        let file = File::open(path).map_err(|err| MemoError::Read(path.to_path_buf(), err))?;

        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| MemoError::Parse(path.to_path_buf(), err))
    }

    /// The memo is written to a temporary file beside `path`, then renamed over it.
    pub fn save<P>(&self, path: P) -> Result<(), MemoError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let temp = path.with_extension(TEMP_SUFFIX);
        debug!("Writing temporary record memo to {temp:?}");

        let file = File::create(&temp).map_err(|err| MemoError::Write(temp.clone(), err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| MemoError::Serialize(temp.clone(), err))?;
        writer.flush().map_err(|err| MemoError::Write(temp.clone(), err))?;
        drop(writer);

        debug!("Renaming temporary record memo to {path:?}");
        fs::rename(&temp, path).map_err(|err| MemoError::Rename(path.to_path_buf(), err))
    }
}

impl RecordSource for RecordMemo {
    fn list_transactions(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.transactions.clone())
    }

    fn list_pays(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.pays.clone())
    }
}
