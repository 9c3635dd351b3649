use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{CliArgs, Command, LoadArgs, PositiveU64, PositiveUsize, ProxyArgs, parse_header};
use crate::error::{AppError, AppResult, ConfigError};
use crate::rate::Rate;

use super::types::{ConfigFile, ProxyConfig};

/// Applies configuration values to CLI arguments. Values passed on the
/// command line always win.
///
/// # Errors
///
/// Returns an error when a config value is invalid.
pub fn apply_config(args: &mut CliArgs, matches: &ArgMatches, config: &ConfigFile) -> AppResult<()> {
    match (&mut args.command, matches.subcommand()) {
        (Command::Load(load), Some((_, sub_matches))) => apply_load(load, sub_matches, config),
        (Command::Proxy(proxy), Some((_, sub_matches))) => match config.proxy.as_ref() {
            Some(section) => apply_proxy(proxy, sub_matches, section),
            None => Ok(()),
        },
        (Command::Load(_) | Command::Proxy(_), None) => Ok(()),
    }
}

fn apply_load(args: &mut LoadArgs, matches: &ArgMatches, config: &ConfigFile) -> AppResult<()> {
    if !is_cli(matches, "url")
        && let Some(url) = config.url.clone()
    {
        args.url = Some(url);
    }

    if !is_cli(matches, "method")
        && let Some(method) = config.method
    {
        args.method = method;
    }

    if !is_cli(matches, "headers")
        && let Some(headers) = config.headers.as_ref()
    {
        let mut parsed = Vec::with_capacity(headers.len());
        for header in headers {
            parsed.push(
                parse_header(header)
                    .map_err(|err| AppError::config(ConfigError::InvalidHeader { source: err }))?,
            );
        }
        args.headers = parsed;
    }

    if !is_cli(matches, "data")
        && let Some(data) = config.data.clone()
    {
        args.data = Some(data);
    }

    if !is_cli(matches, "requests")
        && let Some(requests) = config.requests
    {
        args.requests = PositiveU64::try_from(requests).map_err(|err| {
            AppError::config(ConfigError::FieldMustBePositive {
                field: "requests".to_owned(),
                source: err,
            })
        })?;
    }

    if !is_cli(matches, "rate")
        && let Some(rate) = config.rate
    {
        args.rate = config_rate(rate)?;
    }

    if !is_cli(matches, "workers")
        && let Some(workers) = config.workers
    {
        args.workers = PositiveUsize::try_from(workers).map_err(|err| {
            AppError::config(ConfigError::FieldMustBePositive {
                field: "workers".to_owned(),
                source: err,
            })
        })?;
    }

    if !is_cli(matches, "burst")
        && let Some(burst) = config.burst
    {
        args.burst = burst;
    }

    if !is_cli(matches, "timeout")
        && let Some(timeout) = config.timeout.as_ref()
    {
        args.timeout = timeout.to_duration().map_err(|err| {
            AppError::config(ConfigError::InvalidField {
                field: "timeout",
                source: Box::new(err),
            })
        })?;
    }

    Ok(())
}

fn apply_proxy(args: &mut ProxyArgs, matches: &ArgMatches, config: &ProxyConfig) -> AppResult<()> {
    if !is_cli(matches, "listen")
        && let Some(listen) = config.listen.clone()
    {
        args.listen = listen;
    }

    if !is_cli(matches, "rate")
        && let Some(rate) = config.rate
    {
        args.rate = config_rate(rate)?;
    }

    if !is_cli(matches, "targets")
        && let Some(targets) = config.targets.clone()
    {
        args.targets = targets;
    }

    if !is_cli(matches, "multi")
        && let Some(multi) = config.multi
    {
        args.multi = multi;
    }

    Ok(())
}

fn config_rate(qps: f64) -> AppResult<Rate> {
    Rate::per_second(qps).map_err(|err| {
        AppError::config(ConfigError::InvalidField {
            field: "rate",
            source: Box::new(AppError::config(err)),
        })
    })
}

fn is_cli(matches: &ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(ValueSource::CommandLine)
}
