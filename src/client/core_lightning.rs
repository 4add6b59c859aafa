//! A Core Lightning JSON-RPC client over the node's Unix domain socket.
//!
//! Request construction ([`CoreLightningRpc`]) and response parsing ([`parse_response`]) are
//! free of I/O. [`CoreLightningClient`] ties them to a socket.

use super::{RecordSource, SourceError};
use serde::Serialize;
use serde_json::Value;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::{sync::Arc, time::Instant};
use tracing::{debug, info, trace};

const VERSION: &str = "2.0"; // JSON RPC version
const LIST_TRANSACTIONS: &str = "listtransactions"; // list_transactions() JSON RPC method
const LIST_PAYS: &str = "listpays"; // list_pays() JSON RPC method

/// JSON RPC request builder for Core Lightning.
#[derive(Clone, Debug, Default)]
pub struct CoreLightningRpc {
    id: Arc<AtomicU64>,
}

/// JSON RPC request body.
#[derive(Clone, Debug, Serialize)]
struct Rpc<'req> {
    jsonrpc: &'req str,
    method: &'req str,
    params: Params,
    id: u64,
}

/// Neither method takes arguments.
#[derive(Clone, Debug, Serialize)]
struct Params {}

impl CoreLightningRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request body for `listtransactions`.
    ///
    /// The response result holds a `transactions` array.
    pub fn list_transactions(&self) -> Result<String, serde_json::Error> {
        self.request(LIST_TRANSACTIONS)
    }

    /// Request body for `listpays`.
    ///
    /// The response result holds a `pays` array.
    pub fn list_pays(&self) -> Result<String, serde_json::Error> {
        self.request(LIST_PAYS)
    }

    fn request(&self, method: &str) -> Result<String, serde_json::Error> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);
        let rpc = Rpc {
            jsonrpc: VERSION,
            method,
            params: Params {},
            id,
        };

        serde_json::to_string(&rpc)
    }
}

/// Extract the record array named `field` from a JSON RPC response to `method`.
pub fn parse_response(
    method: &'static str,
    mut response: Value,
    field: &'static str,
) -> Result<Vec<Value>, SourceError> {
    match response.get_mut("error").map(Value::take) {
        None | Some(Value::Null) => (),
        Some(error) => return Err(SourceError::Response(method, error)),
    }

    let result = response
        .get_mut("result")
        .ok_or(SourceError::MissingField("result"))?;

    match result.get_mut(field).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        Some(_) => Err(SourceError::WrongFieldType(field)),
        None => Err(SourceError::MissingField(field)),
    }
}

/// Send one request body and read back exactly one JSON value.
///
/// The node keeps the connection open after responding, so the reader stops at the end of the
/// first complete value instead of waiting for EOF.
fn exchange<S>(stream: &mut S, body: &str) -> Result<Value, SourceError>
where
    S: Read + Write,
{
    stream.write_all(body.as_bytes())?;
    stream.flush()?;

    let response = serde_json::Deserializer::from_reader(BufReader::new(stream))
        .into_iter::<Value>()
        .next()
        .ok_or(SourceError::Closed)??;

    Ok(response)
}

/// A blocking Core Lightning client. Each call opens a fresh connection.
#[derive(Debug)]
pub struct CoreLightningClient {
    rpc_path: PathBuf,
    rpc: CoreLightningRpc,
}

impl CoreLightningClient {
    /// Create a client for the node listening on `rpc_path`.
    ///
    /// No connection is made until the first request.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use clncount::client::{core_lightning::CoreLightningClient, RecordSource as _};
    /// let client = CoreLightningClient::new("/home/user/.lightning/bitcoin/lightning-rpc");
    /// let pays = client.list_pays();
    /// ```
    pub fn new<P>(rpc_path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            rpc_path: rpc_path.into(),
            rpc: CoreLightningRpc::new(),
        }
    }

    fn call(
        &self,
        method: &'static str,
        body: Result<String, serde_json::Error>,
        field: &'static str,
    ) -> Result<Vec<Value>, SourceError> {
        let body = body?;
        info!("Requesting `{method}` from {:?}", self.rpc_path);
        trace!("{body}");

        let start = Instant::now();
        let mut stream = connect(&self.rpc_path)?;
        let response = exchange(&mut stream, &body)?;
        let records = parse_response(method, response, field)?;
        let dur = start.elapsed();

        info!("`{method}` returned {} records in {dur:?}", records.len());

        Ok(records)
    }
}

impl RecordSource for CoreLightningClient {
    fn list_transactions(&self) -> Result<Vec<Value>, SourceError> {
        self.call(LIST_TRANSACTIONS, self.rpc.list_transactions(), "transactions")
    }

    fn list_pays(&self) -> Result<Vec<Value>, SourceError> {
        self.call(LIST_PAYS, self.rpc.list_pays(), "pays")
    }
}

#[cfg(unix)]
fn connect(path: &Path) -> Result<std::os::unix::net::UnixStream, SourceError> {
    debug!("Connecting to {path:?}");

    std::os::unix::net::UnixStream::connect(path)
        .map_err(|err| SourceError::Connect(path.to_path_buf(), err))
}

#[cfg(not(unix))]
fn connect(path: &Path) -> Result<std::fs::File, SourceError> {
    debug!("Cannot connect to {path:?}");

    Err(SourceError::Unsupported)
}
