//! Every public error type, in one place.

pub use crate::client::{memo::MemoError, SourceError};
pub use crate::imports::{ConvertError, RecordError};
pub use crate::loader::LoaderError;
pub use crate::model::{ConvertAmountError, ExchangeRateError, ExchangeRatesDbError, WorksheetError};
