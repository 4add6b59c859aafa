use crate::model::transaction::Party;

/// The only asset in this domain.
pub const ASSET: &str = "BTC";

/// The user's own Core Lightning node.
pub const NODE: Party = Party::new("CoreLightning", "user");

/// An on-chain counterparty that the node cannot identify.
pub const EXTERNAL: Party = Party::new("external", "unknown");

/// A Lightning counterparty that the node cannot identify.
pub const LIGHTNING_NETWORK: Party = Party::new("LightningNetwork", "unknown");

/// Fiat value of one BTC used when no exchange rate database is given.
pub const DEFAULT_SPOT_PRICE: i64 = 30_000;

/// Default reporting window, counted back from the current time.
pub const DEFAULT_WINDOW_SECONDS: i64 = 365 * 24 * 60 * 60;
