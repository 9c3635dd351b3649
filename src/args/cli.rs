use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::rate::Rate;

use super::parsers::{
    parse_duration_arg, parse_header, parse_positive_u64, parse_positive_usize, parse_rate,
};
use super::types::{HttpMethod, PositiveU64, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Rate-paced concurrent HTTP requests and a rate-limited reverse proxy."
)]
pub struct CliArgs {
    /// Path to config file (TOML or JSON)
    #[arg(long, short, global = true)]
    pub config: Option<String>,

    /// Enable debug logging (overridden by PACEKEEPER_LOG / RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Send a fixed number of requests through the paced pipeline
    Load(LoadArgs),
    /// Run a rate-limited reverse proxy
    Proxy(ProxyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    /// Target URL
    #[arg(long, short)]
    pub url: Option<String>,

    /// HTTP method to use
    #[arg(long, short = 'X', default_value = "get", ignore_case = true)]
    pub method: HttpMethod,

    /// HTTP header to include (repeatable, "Key: Value")
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body
    #[arg(long, short)]
    pub data: Option<String>,

    /// Number of requests to send
    #[arg(long, short = 'n', default_value = "10", value_parser = parse_positive_u64)]
    pub requests: PositiveU64,

    /// Maximum requests per second (0 = unlimited)
    #[arg(long, short, default_value = "0", value_parser = parse_rate)]
    pub rate: Rate,

    /// Number of concurrent workers
    #[arg(long, short, default_value = "1", value_parser = parse_positive_usize)]
    pub workers: PositiveUsize,

    /// Requests allowed to run ahead of the rate
    #[arg(long, short, default_value_t = 0)]
    pub burst: usize,

    /// Per-request timeout (supports ms/s/m/h)
    #[arg(long, default_value = "10s", value_parser = parse_duration_arg)]
    pub timeout: Duration,
}

#[derive(Debug, Args, Clone)]
pub struct ProxyArgs {
    /// Address to listen on
    #[arg(long, short, default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Maximum forwarded requests per second (0 = unlimited)
    #[arg(long, short, default_value = "0", value_parser = parse_rate)]
    pub rate: Rate,

    /// Upstream URL (repeatable with --multi)
    #[arg(long = "target", short)]
    pub targets: Vec<String>,

    /// Route /<host:port>/... to the matching target
    #[arg(long)]
    pub multi: bool,
}
