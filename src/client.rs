use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

pub mod core_lightning;
pub mod memo;

/// A node that can be asked for its payment history.
///
/// Records are returned as raw JSON objects in the order the node reports them. Decoding them
/// is left to [`crate::imports`].
///
/// Exists as a trait so that unit tests can mock the node responses.
pub trait RecordSource {
    /// Get every on-chain transfer known to the node (`listtransactions`).
    fn list_transactions(&self) -> Result<Vec<Value>, SourceError>;

    /// Get every Lightning payment known to the node (`listpays`).
    fn list_pays(&self) -> Result<Vec<Value>, SourceError>;
}

/// The record sources available to the binary.
pub enum Client {
    CoreLightning(core_lightning::CoreLightningClient),
    Memo(memo::RecordMemo),
}

impl From<core_lightning::CoreLightningClient> for Client {
    fn from(value: core_lightning::CoreLightningClient) -> Self {
        Self::CoreLightning(value)
    }
}

impl From<memo::RecordMemo> for Client {
    fn from(value: memo::RecordMemo) -> Self {
        Self::Memo(value)
    }
}

impl RecordSource for Client {
    fn list_transactions(&self) -> Result<Vec<Value>, SourceError> {
        match self {
            Self::CoreLightning(core_lightning) => core_lightning.list_transactions(),
            Self::Memo(memo) => memo.list_transactions(),
        }
    }

    fn list_pays(&self) -> Result<Vec<Value>, SourceError> {
        match self {
            Self::CoreLightning(core_lightning) => core_lightning.list_pays(),
            Self::Memo(memo) => memo.list_pays(),
        }
    }
}

/// The node could not provide a record list.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unable to connect to RPC socket {0:?}")]
    Connect(PathBuf, #[source] std::io::Error),

    #[error("RPC socket I/O error")]
    Io(#[from] std::io::Error),

    #[error("RPC JSON error")]
    Json(#[from] serde_json::Error),

    #[error("RPC method `{0}` returned an error: {1}")]
    Response(&'static str, Value),

    #[error("RPC response is missing field `{0}`")]
    MissingField(&'static str),

    #[error("RPC response has wrong type for field `{0}`")]
    WrongFieldType(&'static str),

    #[error("RPC socket closed before a response was received")]
    Closed,

    #[error("Unix domain sockets are not supported on this platform")]
    Unsupported,
}
