#![forbid(unsafe_code)]

use chrono::Utc;
use clncount::client::{core_lightning::CoreLightningClient, memo::RecordMemo, Client};
use clncount::errors::{ConvertAmountError, LoaderError, MemoError, WorksheetError};
use clncount::model::constants::DEFAULT_WINDOW_SECONDS;
use clncount::model::{write_worksheet, ExchangeRates, FixedPrice, Prices, Stats, Summary};
use clncount::{Loader, TimeWindow};
use directories::ProjectDirs;
use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use onlyargs::CliError;
use onlyargs_derive::OnlyArgs;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::{env, process::ExitCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

const RECORD_MEMO: &str = "record_memo.json";

#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - LIGHTNING_RPC is the path to the Core Lightning RPC socket,"]
#[footer = "      used when --rpc-path is not given"]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Path to the Core Lightning RPC socket.
    rpc_path: Option<PathBuf>,

    /// Start of the reporting window in UTC epoch seconds, inclusive.
    ///   Default is one year before the end.
    ///
    #[long]
    start: Option<i64>,

    /// End of the reporting window in UTC epoch seconds, inclusive.
    ///   Default is now.
    ///
    #[long]
    end: Option<i64>,

    /// Price every transaction at this BTCUSD rate.
    ///   Ignored when an exchange rates DB is given.
    ///   Default is 30000.
    ///
    #[long]
    spot_price: Option<String>,

    /// Read BTCUSD rates from a directory of `*-btcusd.ron` files.
    #[long]
    exchange_rates_db: Option<PathBuf>,

    /// Replay node records from a memo instead of the RPC socket.
    #[long]
    input_memo: Option<PathBuf>,

    /// Write the node records of this run to a memo.
    ///   Default is the user cache directory.
    ///
    #[long]
    output_memo: Option<PathBuf>,

    /// Write the worksheet CSV to a file.
    #[short('o')]
    output: Option<PathBuf>,

    /// Enable verbose output.
    /// Prints the worksheet CSV to stdout when not written to a file.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("No RPC socket given: use --rpc-path or set LIGHTNING_RPC")]
    RpcPath,

    #[error("Invalid spot price `{0}`")]
    SpotPrice(String, #[source] ConvertAmountError),

    #[error("Unable to load ExchangeRates DataBase")]
    ExchangeRatesDb(#[from] clncount::errors::ExchangeRatesDbError),

    #[error("Record memo error")]
    Memo(#[from] MemoError),

    #[error("Loader error")]
    Loader(#[from] LoaderError),

    #[error("Unable to write worksheet {0:?}")]
    Worksheet(PathBuf, #[source] WorksheetError),

    #[error("Unable to print worksheet")]
    WorksheetStdout(#[source] WorksheetError),

    #[error("Unable to locate user cache directory")]
    CacheDir,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    // Initialize the tracing subscriber for instrumentation.
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    //
    // See: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/struct.EnvFilter.html#directives
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;

    let window = match (args.start, args.end) {
        (None, None) => TimeWindow::last_year(Utc::now()),
        (start, end) => {
            let end = end.unwrap_or_else(|| Utc::now().timestamp());
            let start = start.unwrap_or_else(|| end.saturating_sub(DEFAULT_WINDOW_SECONDS));

            TimeWindow::new(start, end)?
        }
    };

    let prices = get_prices(args.exchange_rates_db, args.spot_price)?;

    // Capture both record lists up front, so a live run can be replayed from its memo.
    let client = match args.input_memo {
        Some(path) => Client::from(RecordMemo::load(path)?),
        None => {
            let rpc_path = args
                .rpc_path
                .or_else(|| env::var_os("LIGHTNING_RPC").map(PathBuf::from))
                .ok_or(Error::RpcPath)?;

            Client::from(CoreLightningClient::new(rpc_path))
        }
    };
    let memo = RecordMemo::capture(&client)?;

    if let Client::CoreLightning(_) = client {
        let path = match args.output_memo {
            Some(path) => path,
            None => record_memo_cache_path()?,
        };
        memo.save(&path)?;
        info!("Node records saved to {path:?}");
    } else if let Some(path) = args.output_memo {
        memo.save(&path)?;
    }

    let mut stats = Stats::default();
    let loader = Loader::new(memo, prices);
    let transactions = loader.fetch_window(window, &mut stats)?;

    if let Some(path) = args.output.as_ref() {
        let file = File::create(path)?;
        write_worksheet(BufWriter::new(file), &transactions)
            .map_err(|err| Error::Worksheet(path.clone(), err))?;

        let path = path.display();
        let underline = "=".repeat(path.to_string().len());
        println!("Worksheet written to {path}");
        println!("========= ======= == {underline}");
        println!();
    } else if args.verbose {
        println!("Worksheet");
        println!("=========");
        println!();
        write_worksheet(std::io::stdout().lock(), &transactions)
            .map_err(Error::WorksheetStdout)?;
        println!();
    }

    println!("Summary");
    println!("=======");
    println!();
    println!("{}", Summary::new(&transactions));
    println!();

    stats.pretty_print();
    std::io::stdout().flush()?;

    Ok(())
}

fn get_prices(
    exchange_rates_db: Option<PathBuf>,
    spot_price: Option<String>,
) -> Result<Prices, Error> {
    match (exchange_rates_db, spot_price) {
        (Some(path), spot_price) => {
            if spot_price.is_some() {
                warn!("Ignoring --spot-price in favor of the exchange rates DB");
            }
            debug!("Loading exchange rates from {path:?}");

            Ok(ExchangeRates::new(path)?.into())
        }
        (None, Some(price)) => {
            let fixed = price.parse().map_err(|err| Error::SpotPrice(price, err))?;

            Ok(FixedPrice::new(fixed).into())
        }
        (None, None) => {
            let fixed = FixedPrice::default();
            warn!("No exchange rates DB given, using a fixed price of {}", fixed.price());

            Ok(fixed.into())
        }
    }
}

/// Find the user's cache directory for clncount and make sure it exists.
fn record_memo_cache_path() -> Result<PathBuf, Error> {
    let project_dir = ProjectDirs::from("", "", "clncount").ok_or(Error::CacheDir)?;
    let cache_dir = project_dir.cache_dir();
    std::fs::create_dir_all(cache_dir)?;

    Ok(cache_dir.join(RECORD_MEMO))
}
