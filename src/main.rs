//! `querywire` binary: run a query and print its rows.
//!
//! Rows are written to stdout as JSON arrays, one per line. Logs go to
//! stderr and are filtered with `RUST_LOG`.

mod cli;

use std::{
    io::{self, Write},
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use futures::TryStreamExt;
use querywire::{Header, QueryClient, QueryError, QueryRequest, Row, RowStream};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, QueryArgs};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("failed to write row: {0}")]
    Output(#[from] io::Error),
    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("querywire: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut builder = QueryClient::builder(cli.server).coalesce_chunks(cli.coalesce);
    if let Some(url) = cli.websocket_server {
        builder = builder.websocket_url(url);
    }
    if let Some(seconds) = cli.connect_timeout {
        builder = builder.connect_timeout(Duration::from_secs(seconds));
    }
    let client = builder.build()?;

    let (args, rows) = match cli.command {
        Command::Pull(args) => {
            let rows = client.pull_query(&request(&args)).await?;
            (args, rows)
        }
        Command::Push(args) => {
            let rows = client.push_query(&request(&args)).await?;
            (args, rows)
        }
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, closing query");
            signal.cancel();
        }
    });

    print_rows(rows.with_cancellation(shutdown), args.header).await
}

fn request(args: &QueryArgs) -> QueryRequest {
    args.properties
        .iter()
        .fold(QueryRequest::new(&args.statement), |request, (key, value)| {
            request.with_property(key, value)
        })
}

async fn print_rows(mut rows: RowStream, header: bool) -> Result<(), CliError> {
    let mut printer = RowPrinter::new(header);
    while let Some(row) = rows.try_next().await? {
        printer.row(&mut io::stdout().lock(), rows.header(), &row)?;
    }
    printer.finish(&mut io::stdout().lock(), rows.header())?;
    tracing::debug!(rows = rows.rows(), "query finished");
    Ok(())
}

/// Writes rows as JSON lines, optionally preceded by the column names.
#[derive(Debug)]
struct RowPrinter {
    header_pending: bool,
}

impl RowPrinter {
    fn new(header: bool) -> Self {
        Self {
            header_pending: header,
        }
    }

    fn row(
        &mut self,
        out: &mut impl Write,
        header: Option<&Header>,
        row: &Row,
    ) -> Result<(), CliError> {
        self.header(out, header)?;
        serde_json::to_writer(&mut *out, row.columns())?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    /// Print the header of a query that produced no rows.
    fn finish(&mut self, out: &mut impl Write, header: Option<&Header>) -> Result<(), CliError> {
        self.header(out, header)?;
        out.flush()?;
        Ok(())
    }

    fn header(&mut self, out: &mut impl Write, header: Option<&Header>) -> Result<(), CliError> {
        let Some(header) = header.filter(|_| self.header_pending) else {
            return Ok(());
        };
        let names: Vec<&str> = header.columns().map(|(name, _)| name).collect();
        serde_json::to_writer(&mut *out, &names)?;
        writeln!(out)?;
        self.header_pending = false;
        Ok(())
    }
}
