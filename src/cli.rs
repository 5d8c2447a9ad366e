//! Command line interface for the `querywire` binary.
//!
//! Kept free of crate imports so the build script can include it to render
//! the manual page.

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `querywire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "querywire",
    version,
    about = "Run pull and push queries and print each row as a JSON line"
)]
pub struct Cli {
    /// HTTP base URL of the query server.
    #[arg(short, long, default_value = "http://localhost:8088", global = true)]
    pub server: String,

    /// WebSocket base URL for push queries; derived from --server if omitted.
    #[arg(long, global = true)]
    pub websocket_server: Option<String>,

    /// Decode pull query bodies as one continuous array.
    #[arg(long, global = true)]
    pub coalesce: bool,

    /// Connection timeout in seconds.
    #[arg(long, value_name = "SECONDS", global = true)]
    pub connect_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Query kinds.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a bounded query over HTTP and exit when it completes.
    Pull(QueryArgs),
    /// Run a continuous query over a WebSocket until interrupted.
    Push(QueryArgs),
}

/// Statement and properties shared by both query kinds.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Statement to run.
    pub statement: String,

    /// Streams property as KEY=VALUE; may be repeated.
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Print the header before the rows.
    #[arg(long)]
    pub header: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("property key is empty in {raw:?}"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
