//! Fetch a node's history and turn it into canonical transactions for one time window.

use crate::client::{RecordSource, SourceError};
use crate::imports::{ConvertError, RawRecord, RecordError};
use crate::model::constants::DEFAULT_WINDOW_SECONDS;
use crate::model::{PriceLookup, Source, Stats, Transaction};
use chrono::{DateTime, Utc};
use error_iter::ErrorIter as _;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Invalid time window: start {0} is after end {1}")]
    InvalidWindow(i64, i64),

    #[error("Unable to fetch {0} records")]
    Source(Source, #[source] SourceError),
}

/// An inclusive range of UTC epoch seconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeWindow {
    start: i64,
    end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self, LoaderError> {
        if start > end {
            return Err(LoaderError::InvalidWindow(start, end));
        }

        Ok(Self { start, end })
    }

    /// The year leading up to `now`, inclusive at both ends.
    pub fn last_year(now: DateTime<Utc>) -> Self {
        let end = now.timestamp();

        Self {
            start: end.saturating_sub(DEFAULT_WINDOW_SECONDS),
            end,
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, datetime: DateTime<Utc>) -> bool {
        (self.start..=self.end).contains(&datetime.timestamp())
    }
}

/// Pairs a record source with a price lookup.
pub struct Loader<S, P> {
    source: S,
    prices: P,
}

impl<S, P> Loader<S, P>
where
    S: RecordSource,
    P: PriceLookup,
{
    pub fn new(source: S, prices: P) -> Self {
        Self { source, prices }
    }

    /// Canonical transactions with timestamps in `[start_time, end_time]`.
    ///
    /// On-chain transactions come first, then Lightning transactions, each in the order the
    /// node reported them. Records that cannot be converted are skipped.
    pub fn fetch(&self, start_time: i64, end_time: i64) -> Result<Vec<Transaction>, LoaderError> {
        let window = TimeWindow::new(start_time, end_time)?;

        self.fetch_window(window, &mut Stats::default())
    }

    /// Same as [`Loader::fetch`], counting records in `stats`.
    pub fn fetch_window(
        &self,
        window: TimeWindow,
        stats: &mut Stats,
    ) -> Result<Vec<Transaction>, LoaderError> {
        info!("Fetching on-chain records");
        let onchain = self
            .source
            .list_transactions()
            .map_err(|err| LoaderError::Source(Source::Onchain, err))?;

        info!("Fetching Lightning records");
        let lightning = self
            .source
            .list_pays()
            .map_err(|err| LoaderError::Source(Source::Lightning, err))?;

        info!(
            "Converting {} on-chain and {} Lightning records",
            onchain.len(),
            lightning.len(),
        );

        let mut transactions = Vec::new();
        self.convert_all(&onchain, Source::Onchain, window, stats, &mut transactions);
        self.convert_all(&lightning, Source::Lightning, window, stats, &mut transactions);

        info!(
            "Kept {} transactions between {} and {}",
            transactions.len(),
            window.start,
            window.end,
        );

        Ok(transactions)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn convert_all(
        &self,
        values: &[Value],
        source: Source,
        window: TimeWindow,
        stats: &mut Stats,
        transactions: &mut Vec<Transaction>,
    ) {
        let decode: fn(&Value) -> Result<RawRecord, RecordError> = match source {
            Source::Onchain => RawRecord::onchain,
            Source::Lightning => RawRecord::lightning,
        };

        for (index, value) in values.iter().enumerate() {
            match source {
                Source::Onchain => stats.inc_onchain_records(),
                Source::Lightning => stats.inc_lightning_records(),
            }

            // Records outside the window are never priced.
            let result = decode(value).map_err(ConvertError::from).and_then(|record| {
                if window.contains(record.timestamp()) {
                    record.convert(&self.prices).map(Some)
                } else {
                    trace!("Dropping {source} record {index} at {}", record.timestamp());
                    Ok(None)
                }
            });

            match result {
                Ok(Some(tx)) => {
                    trace!("Keeping {source} record {index} at {}", tx.timestamp());
                    stats.inc_transactions();
                    transactions.push(tx);
                }
                Ok(None) => stats.inc_outside_window(),
                Err(err) => {
                    warn!("Skipping {source} record {index}: {err}");
                    for cause in err.sources().skip(1) {
                        warn!("  Caused by: {cause}");
                    }
                    debug!("{value}");
                    stats.inc_skipped_records();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{memo::RecordMemo, mock::MockSource};
    use crate::model::constants::{EXTERNAL, LIGHTNING_NETWORK, NODE};
    use crate::model::{Direction, ExchangeRateError, FiatAmount, FixedPrice};
    use arbtest::arbtest;
    use serde_json::json;
    use std::cell::Cell;
    use tracing_test::traced_test;

    const FIXTURE_MEMO: &str = "./fixtures/memo/node.json";

    // 2023-01-01 00:00:00 through 2023-01-31 23:59:59
    const JAN_2023: (i64, i64) = (1672531200, 1675209599);

    fn onchain(amount_msat: i64, timestamp: i64) -> Value {
        json!({ "amount_msat": amount_msat, "timestamp": timestamp })
    }

    fn pay(amount_msat: u64, created_at: i64, direction: &str) -> Value {
        json!({
            "amount_msat": amount_msat,
            "created_at": created_at,
            "direction": direction,
            "status": "complete",
        })
    }

    #[test]
    fn test_time_window() {
        let window = TimeWindow::new(10, 20).unwrap();
        assert!(!window.contains(DateTime::from_timestamp(9, 0).unwrap()));
        assert!(window.contains(DateTime::from_timestamp(10, 0).unwrap()));
        assert!(window.contains(DateTime::from_timestamp(20, 0).unwrap()));
        assert!(!window.contains(DateTime::from_timestamp(21, 0).unwrap()));

        // A single second is a valid window.
        assert!(TimeWindow::new(10, 10).is_ok());

        let now = "2024-01-01 00:00:00+0000".parse().unwrap();
        let window = TimeWindow::last_year(now);
        assert_eq!(window.end(), 1704067200);
        assert_eq!(window.start(), 1704067200 - 365 * 24 * 60 * 60);
    }

    #[test]
    #[traced_test]
    fn test_empty_sources() {
        let loader = Loader::new(MockSource::new(vec![], vec![]), FixedPrice::default());
        let txs = loader.fetch(0, i64::MAX).unwrap();

        assert!(txs.is_empty());
        assert_eq!(loader.source().calls.get(), 2);
    }

    #[test]
    #[traced_test]
    fn test_invalid_window_fetches_nothing() {
        let loader = Loader::new(MockSource::new(vec![], vec![]), FixedPrice::default());

        assert!(matches!(
            loader.fetch(20, 10),
            Err(LoaderError::InvalidWindow(20, 10)),
        ));
        assert_eq!(loader.source().calls.get(), 0);
    }

    #[test]
    #[traced_test]
    fn test_scenarios() {
        let source = MockSource::new(
            vec![onchain(250_000_000_000, 1672660800)],
            vec![pay(100_000_000_000, 1672660800, "outgoing")],
        );
        let loader = Loader::new(source, FixedPrice::default());
        let txs = loader.fetch(JAN_2023.0, JAN_2023.1).unwrap();

        assert_eq!(txs.len(), 2);

        assert_eq!(txs[0].crypto_in(), "2.5".parse().unwrap());
        assert!(txs[0].fiat_in().is_zero());
        assert_eq!(txs[0].to().holder, "user");
        assert_eq!(txs[0].spot_price(), "30000".parse().unwrap());

        assert_eq!(txs[1].fiat_in(), "30000".parse().unwrap());
        assert!(txs[1].crypto_in().is_zero());
        assert_eq!(txs[1].from().holder, "user");
    }

    #[test]
    #[traced_test]
    fn test_onchain_before_lightning() {
        // Lightning records are older, but still follow the on-chain block.
        let source = MockSource::new(
            vec![onchain(2_000, 1672700000), onchain(-1_000, 1672600000)],
            vec![pay(3_000, 1672540000, "incoming"), pay(4_000, 1672530000, "x")],
        );
        let loader = Loader::new(source, FixedPrice::default());
        let txs = loader.fetch(0, i64::MAX).unwrap();

        let summary = txs
            .iter()
            .map(|tx| (tx.source(), tx.direction(), tx.timestamp().timestamp()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (Source::Onchain, Direction::Receive, 1672700000),
                (Source::Onchain, Direction::Send, 1672600000),
                (Source::Lightning, Direction::Receive, 1672540000),
                (Source::Lightning, Direction::Receive, 1672530000),
            ],
        );

        // Identical inputs give identical outputs.
        assert_eq!(loader.fetch(0, i64::MAX).unwrap(), txs);
    }

    #[test]
    #[traced_test]
    fn test_window_is_inclusive() {
        let source = MockSource::new(
            vec![
                onchain(1_000, 99),
                onchain(1_000, 100),
                onchain(1_000, 200),
                onchain(1_000, 201),
            ],
            vec![pay(1_000, 100, "incoming"), pay(1_000, 201, "incoming")],
        );
        let loader = Loader::new(source, FixedPrice::default());
        let mut stats = Stats::default();
        let txs = loader
            .fetch_window(TimeWindow::new(100, 200).unwrap(), &mut stats)
            .unwrap();

        let timestamps = txs
            .iter()
            .map(|tx| tx.timestamp().timestamp())
            .collect::<Vec<_>>();
        assert_eq!(timestamps, vec![100, 200, 100]);
        assert_eq!(stats.transactions(), 3);
        assert_eq!(stats.outside_window(), 3);
        assert_eq!(stats.skipped_records(), 0);
    }

    #[test]
    #[traced_test]
    fn test_skip_malformed() {
        let source = MockSource::new(
            vec![
                json!({ "timestamp": 1672660800 }),
                json!({ "amount_msat": 1_000 }),
                json!("not an object"),
                onchain(5_000, 1672660800),
            ],
            vec![
                json!({ "amount_msat": 1_000, "created_at": 1672660800 }),
                pay(7_000, 1672660800, "outgoing"),
            ],
        );
        let loader = Loader::new(source, FixedPrice::default());
        let mut stats = Stats::default();
        let txs = loader
            .fetch_window(TimeWindow::new(JAN_2023.0, JAN_2023.1).unwrap(), &mut stats)
            .unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].from(), EXTERNAL);
        assert_eq!(txs[1].to(), LIGHTNING_NETWORK);
        assert_eq!(stats.skipped_records(), 4);
        assert!(logs_contain("Skipping on-chain record 0"));
        assert!(logs_contain("Skipping Lightning record 0"));
    }

    #[test]
    #[traced_test]
    fn test_price_unavailable_is_skipped() {
        let source = MockSource::new(
            vec![onchain(1_000, 1672660800), onchain(1_000, 1672747200)],
            vec![],
        );
        let prices = |datetime: DateTime<Utc>| -> Result<FiatAmount, ExchangeRateError> {
            if datetime.timestamp() == 1672660800 {
                Err(ExchangeRateError::NotFound(datetime))
            } else {
                Ok("16674.34".parse().unwrap())
            }
        };
        let loader = Loader::new(source, prices);
        let txs = loader.fetch(JAN_2023.0, JAN_2023.1).unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].timestamp().timestamp(), 1672747200);
        assert_eq!(txs[0].spot_price(), "16674.34".parse().unwrap());
    }

    #[test]
    #[traced_test]
    fn test_outside_window_is_not_priced() {
        let lookups = Cell::new(0);
        let prices = |datetime: DateTime<Utc>| -> Result<FiatAmount, ExchangeRateError> {
            lookups.set(lookups.get() + 1);
            if datetime.timestamp() < JAN_2023.0 {
                Err(ExchangeRateError::NotFound(datetime))
            } else {
                Ok("16674.34".parse().unwrap())
            }
        };
        // The database has no rate before the window, so pricing these would fail.
        let source = MockSource::new(
            vec![onchain(1_000, 1640995200), onchain(1_000, 1672660800)],
            vec![pay(1_000, 1640995200, "outgoing")],
        );
        let loader = Loader::new(source, &prices);
        let mut stats = Stats::default();
        let txs = loader
            .fetch_window(TimeWindow::new(JAN_2023.0, JAN_2023.1).unwrap(), &mut stats)
            .unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(lookups.get(), 1);
        assert_eq!(stats.outside_window(), 2);
        assert_eq!(stats.skipped_records(), 0);
        assert!(!logs_contain("Skipping"));
    }

    #[test]
    #[traced_test]
    fn test_price_lookup_once_per_record() {
        let lookups = Cell::new(0);
        let prices = |_: DateTime<Utc>| -> Result<FiatAmount, ExchangeRateError> {
            lookups.set(lookups.get() + 1);
            Ok("30000".parse().unwrap())
        };
        let source = MockSource::new(
            vec![onchain(1_000, 1), onchain(0, 2), json!({})],
            vec![pay(1_000, 3, "outgoing")],
        );
        let loader = Loader::new(source, &prices);
        loader.fetch(0, 10).unwrap();

        assert_eq!(lookups.get(), 2);
    }

    #[test]
    #[traced_test]
    fn test_source_errors() {
        let source = MockSource {
            pays: Some(vec![]),
            ..MockSource::default()
        };
        let loader = Loader::new(source, FixedPrice::default());
        assert!(matches!(
            loader.fetch(0, 10),
            Err(LoaderError::Source(Source::Onchain, SourceError::Closed)),
        ));

        let source = MockSource {
            transactions: Some(vec![onchain(1_000, 1)]),
            ..MockSource::default()
        };
        let loader = Loader::new(source, FixedPrice::default());
        assert!(matches!(
            loader.fetch(0, 10),
            Err(LoaderError::Source(Source::Lightning, SourceError::Closed)),
        ));
    }

    #[test]
    #[traced_test]
    fn test_memo_fixture() {
        let _ = tracing_log::LogTracer::init();

        let memo = RecordMemo::load(FIXTURE_MEMO).unwrap();
        let loader = Loader::new(memo, FixedPrice::default());
        let mut stats = Stats::default();
        let txs = loader
            .fetch_window(TimeWindow::new(JAN_2023.0, JAN_2023.1).unwrap(), &mut stats)
            .unwrap();

        let actual = txs
            .iter()
            .map(|tx| {
                (
                    tx.timestamp().timestamp(),
                    tx.from(),
                    tx.to(),
                    tx.crypto_in().to_string(),
                    tx.fiat_in().to_string(),
                )
            })
            .collect::<Vec<_>>();
        let expected = vec![
            (1672660800, EXTERNAL, NODE, "2.5".to_string(), "0.0000".to_string()),
            (1672747200, NODE, EXTERNAL, "0".to_string(), "15000.0000".to_string()),
            (1672833600, NODE, LIGHTNING_NETWORK, "0".to_string(), "30000.0000".to_string()),
            (1672700000, LIGHTNING_NETWORK, NODE, "0.00005".to_string(), "0.0000".to_string()),
            (1672800000, NODE, LIGHTNING_NETWORK, "0".to_string(), "90.0000".to_string()),
        ];
        similar_asserts::assert_eq!(actual, expected);

        // One on-chain record lacks a timestamp and one payment moved nothing. The failed
        // payment is still converted.
        assert_eq!(stats.skipped_records(), 2);
        assert_eq!(stats.outside_window(), 1);
        assert_eq!(stats.transactions(), 5);
    }

    #[test]
    #[traced_test]
    fn prop_test_window_and_direction() {
        arbtest(|u| {
            let start = u.int_in_range(0..=2_000)?;
            let end = u.int_in_range(start..=2_000)?;

            let in_window = |timestamp: i64| (start..=end).contains(&timestamp);

            let mut transactions = Vec::new();
            let mut expected_onchain = 0;
            for _ in 0..u.int_in_range(0..=20)? {
                let amount: i64 = u.arbitrary()?;
                let timestamp = u.int_in_range(0..=2_000)?;
                if amount != 0 && in_window(timestamp) {
                    expected_onchain += 1;
                }
                transactions.push(onchain(amount, timestamp));
            }

            let mut pays = Vec::new();
            let mut expected_lightning = 0;
            for _ in 0..u.int_in_range(0..=20)? {
                let amount: u64 = u.arbitrary()?;
                let timestamp = u.int_in_range(0..=2_000)?;
                let direction = if u.arbitrary()? { "outgoing" } else { "incoming" };
                if amount != 0 && in_window(timestamp) {
                    expected_lightning += 1;
                }
                pays.push(pay(amount, timestamp, direction));
            }

            let loader = Loader::new(MockSource::new(transactions, pays), FixedPrice::default());
            let txs = loader.fetch(start, end).unwrap();

            assert_eq!(txs.len(), expected_onchain + expected_lightning);
            for (index, tx) in txs.iter().enumerate() {
                let timestamp = tx.timestamp().timestamp();
                assert!((start..=end).contains(&timestamp));
                assert!(tx.crypto_in().is_positive() ^ tx.fiat_in().is_positive());
                assert_eq!(tx.direction() == Direction::Send, tx.from() == NODE);

                let expected_source = if index < expected_onchain {
                    Source::Onchain
                } else {
                    Source::Lightning
                };
                assert_eq!(tx.source(), expected_source);
            }

            Ok(())
        });
    }
}
