pub use self::{amount::*, exchange_rate::*, stats::*, transaction::*, worksheet::*};

pub mod amount;
pub mod constants;
pub mod exchange_rate;
mod stats;
pub mod transaction;
pub mod worksheet;
