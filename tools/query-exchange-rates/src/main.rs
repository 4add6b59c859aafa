#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use clncount::errors::{ExchangeRateError, ExchangeRatesDbError};
use clncount::model::{ExchangeRates, PriceLookup as _};
use error_iter::ErrorIter as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("No dates given")]
    NoDates,

    #[error("Unable to parse date `{0}`")]
    DateTime(String, #[source] chrono::ParseError),

    #[error("Epoch seconds `{0}` are out of range")]
    Timestamp(i64),

    #[error("Unable to load ExchangeRates DataBase")]
    ExchangeRatesDb(#[from] ExchangeRatesDbError),

    #[error("No BTCUSD rate for `{0}`")]
    ExchangeRate(String, #[source] ExchangeRateError),
}

/// Print the BTCUSD rate that clncount would use to price a record at each date.
#[derive(Debug, OnlyArgs)]
#[footer = "Dates are UTC epoch seconds, as reported by Core Lightning,"]
#[footer = "  or datetimes like \"2023-01-02 12:00:00+0000\"."]
struct Args {
    /// Directory of `*-btcusd.ron` files.
    #[long]
    exchange_rates_db: PathBuf,

    /// Dates to look up.
    #[positional]
    dates: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_) | Error::NoDates) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Args = onlyargs::parse()?;
    if args.dates.is_empty() {
        return Err(Error::NoDates);
    }

    let dates = args
        .dates
        .iter()
        .map(|date| parse_date(date))
        .collect::<Result<Vec<_>, _>>()?;
    let exchange_rates_db = ExchangeRates::new(&args.exchange_rates_db)?;

    println!("timestamp\tdate\tBTCUSD");
    for (arg, date) in args.dates.iter().zip(dates) {
        let price = exchange_rates_db
            .price_at(date)
            .map_err(|err| Error::ExchangeRate(arg.clone(), err))?;

        println!("{}\t{date}\t{price}", date.timestamp());
    }

    Ok(())
}

fn parse_date(date: &str) -> Result<DateTime<Utc>, Error> {
    match date.parse::<i64>() {
        Ok(seconds) => DateTime::from_timestamp(seconds, 0).ok_or(Error::Timestamp(seconds)),
        Err(_) => date.parse().map_err(|err| Error::DateTime(date.to_string(), err)),
    }
}
