use std::time::Duration;

use clap::Parser;

use super::*;
use crate::error::{AppError, AppResult};

#[test]
fn parse_load_defaults() -> AppResult<()> {
    let args = CliArgs::try_parse_from(["pacekeeper", "load", "--url", "http://localhost"])?;
    if args.verbose || args.config.is_some() {
        return Err(AppError::validation("Unexpected global flags"));
    }
    match args.command {
        Command::Load(load) => {
            if load.url.as_deref() != Some("http://localhost") {
                return Err(AppError::validation("Unexpected url"));
            }
            if load.method != HttpMethod::Get || load.requests.get() != 10 {
                return Err(AppError::validation("Unexpected method or request count"));
            }
            if !load.rate.is_unlimited() || load.workers.get() != 1 || load.burst != 0 {
                return Err(AppError::validation("Unexpected pacing defaults"));
            }
            if load.timeout != Duration::from_secs(10) {
                return Err(AppError::validation("Unexpected timeout default"));
            }
            Ok(())
        }
        Command::Proxy(_) => Err(AppError::validation("Expected load subcommand")),
    }
}

#[test]
fn parse_load_options() -> AppResult<()> {
    let args = CliArgs::try_parse_from([
        "pacekeeper",
        "-v",
        "load",
        "-u",
        "http://localhost/x",
        "-X",
        "POST",
        "-H",
        "X-Test: 1",
        "-H",
        "Accept: text/plain",
        "-d",
        "payload",
        "-n",
        "25",
        "--rate",
        "2.5",
        "-w",
        "4",
        "--burst",
        "3",
        "--timeout",
        "500ms",
    ])?;
    if !args.verbose {
        return Err(AppError::validation("Expected --verbose before subcommand"));
    }
    let Command::Load(load) = args.command else {
        return Err(AppError::validation("Expected load subcommand"));
    };
    if load.method != HttpMethod::Post || load.data.as_deref() != Some("payload") {
        return Err(AppError::validation("Unexpected method or body"));
    }
    if load.headers
        != [
            ("X-Test".to_owned(), "1".to_owned()),
            ("Accept".to_owned(), "text/plain".to_owned()),
        ]
    {
        return Err(AppError::validation("Unexpected headers"));
    }
    if load.requests.get() != 25 || load.workers.get() != 4 || load.burst != 3 {
        return Err(AppError::validation("Unexpected counts"));
    }
    if load.rate.interval() != Some(Duration::from_millis(400)) {
        return Err(AppError::validation("Unexpected rate interval"));
    }
    if load.timeout != Duration::from_millis(500) {
        return Err(AppError::validation("Unexpected timeout"));
    }
    Ok(())
}

#[test]
fn parse_proxy_targets() -> AppResult<()> {
    let args = CliArgs::try_parse_from([
        "pacekeeper",
        "proxy",
        "--rate",
        "1",
        "-t",
        "http://a:1",
        "--target",
        "http://b:2",
        "--multi",
        "--config",
        "custom.toml",
    ])?;
    if args.config.as_deref() != Some("custom.toml") {
        return Err(AppError::validation("Expected global --config after subcommand"));
    }
    let Command::Proxy(proxy) = args.command else {
        return Err(AppError::validation("Expected proxy subcommand"));
    };
    if proxy.listen != "127.0.0.1:8080" || !proxy.multi {
        return Err(AppError::validation("Unexpected proxy flags"));
    }
    if proxy.targets != ["http://a:1", "http://b:2"] {
        return Err(AppError::validation("Unexpected targets"));
    }
    if proxy.rate.interval() != Some(Duration::from_secs(1)) {
        return Err(AppError::validation("Unexpected proxy rate"));
    }
    Ok(())
}

#[test]
fn invalid_values_are_rejected() -> AppResult<()> {
    let cases: [&[&str]; 6] = [
        &["pacekeeper", "load", "-n", "0"],
        &["pacekeeper", "load", "-w", "0"],
        &["pacekeeper", "load", "--rate", "-1"],
        &["pacekeeper", "load", "--rate", "fast"],
        &["pacekeeper", "load", "-H", "no-colon"],
        &["pacekeeper", "load", "--timeout", "0s"],
    ];
    for argv in cases {
        if CliArgs::try_parse_from(argv).is_ok() {
            return Err(AppError::validation(format!("Expected {:?} to fail", argv)));
        }
    }
    if CliArgs::try_parse_from(["pacekeeper"]).is_ok() {
        return Err(AppError::validation("Expected a subcommand to be required"));
    }
    Ok(())
}

#[test]
fn parse_duration_units() -> AppResult<()> {
    let cases = [
        ("250ms", Duration::from_millis(250)),
        ("3", Duration::from_secs(3)),
        ("2m", Duration::from_secs(120)),
        ("1h", Duration::from_secs(3_600)),
    ];
    for (input, expected) in cases {
        if parsers::parse_duration_arg(input)? != expected {
            return Err(AppError::validation(format!("Unexpected duration for {}", input)));
        }
    }
    for input in ["", "ms", "5d", "0"] {
        if parsers::parse_duration_arg(input).is_ok() {
            return Err(AppError::validation(format!("Expected '{}' to fail", input)));
        }
    }
    Ok(())
}
