use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use reqwest::{Client, Request};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use pacekeeper::args::{CliArgs, Command, LoadArgs, ProxyArgs};
use pacekeeper::config::{DEFAULT_CONFIG_FILES, apply_config, load_config};
use pacekeeper::error::{AppError, AppResult, HttpError, ValidationError};
use pacekeeper::pipeline::{Pipeline, PipelineConfig, PipelineStats};
use pacekeeper::proxy::{Handler, MultiHostProxy, ProxyServer, SingleHostProxy};
use pacekeeper::shutdown::CancelSignal;

use crate::logger::init_logging;
use crate::shutdown_handlers::setup_signal_shutdown_handler;

pub(crate) fn run() -> AppResult<()> {
    let (mut args, matches) = match parse_args()? {
        Some(parsed) => parsed,
        None => return Ok(()),
    };

    if let Some(config) = load_config(args.config.as_deref())? {
        apply_config(&mut args, &matches, &config)?;
    }

    init_logging(args.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(&args))
}

fn parse_args() -> AppResult<Option<(CliArgs, ArgMatches)>> {
    let mut cmd = CliArgs::command();
    let raw_args: Vec<OsString> = std::env::args_os().collect();

    if should_show_help(&raw_args) {
        cmd.print_help()?;
        println!();
        return Ok(None);
    }

    let matches = cmd.get_matches_from(raw_args);
    let args = CliArgs::from_arg_matches(&matches)?;

    Ok(Some((args, matches)))
}

fn should_show_help(raw_args: &[OsString]) -> bool {
    let treat_as_empty =
        matches!(raw_args, [] | [_]) || matches!(raw_args, [_, second] if second == "--");
    if !treat_as_empty {
        return false;
    }

    !DEFAULT_CONFIG_FILES
        .iter()
        .any(|path| Path::new(path).exists())
}

async fn run_async(args: &CliArgs) -> AppResult<()> {
    match &args.command {
        Command::Load(load) => run_load(load).await,
        Command::Proxy(proxy) => run_proxy(proxy).await,
    }
}

fn request_template(client: &Client, args: &LoadArgs) -> AppResult<Request> {
    let Some(url) = args.url.as_deref() else {
        error!("Missing URL (set --url or provide in config).");
        return Err(AppError::validation(ValidationError::MissingUrl));
    };
    let mut builder = client.request(args.method.as_method(), url);
    for (key, value) in &args.headers {
        builder = builder.header(key, value);
    }
    if let Some(data) = args.data.as_ref() {
        builder = builder.body(data.clone());
    }
    builder
        .build()
        .map_err(|err| AppError::http(HttpError::BuildRequestFailed { source: err }))
}

async fn run_load(args: &LoadArgs) -> AppResult<()> {
    let client = Client::builder()
        .timeout(args.timeout)
        .build()
        .map_err(|err| AppError::http(HttpError::BuildClientFailed { source: err }))?;
    let template = request_template(&client, args)?;

    let config = PipelineConfig::new(args.rate, args.workers.get())?.with_burst(args.burst);
    let mut pipeline = Pipeline::new(config, Arc::new(client));

    let total = args.requests.get();
    let (input_tx, input_rx) = mpsc::channel(config.buffer());
    let mut responses = pipeline.run(input_rx)?;

    let feeder = tokio::spawn(async move {
        for _ in 0..total {
            // Streaming bodies cannot be cloned; the pipeline skips those.
            if input_tx.send(template.try_clone()).await.is_err() {
                break;
            }
        }
    });

    let shutdown = CancelSignal::new();
    let signal_task = setup_signal_shutdown_handler(&shutdown);
    let stop_task = pipeline.stop_handle().map(|stop| {
        let mut listener = shutdown.listener();
        tokio::spawn(async move {
            listener.cancelled().await;
            stop.stop();
        })
    });

    let mut statuses: BTreeMap<u16, u64> = BTreeMap::new();
    while let Some(response) = responses.recv().await {
        let status = response.status().as_u16();
        debug!(status, url = %response.url(), "Response");
        let count = statuses.entry(status).or_default();
        *count = count.saturating_add(1);
    }

    let stats = pipeline.join().await;
    shutdown.fire();
    feeder.abort();
    drop(feeder.await);
    signal_task.await?;
    if let Some(stop_task) = stop_task {
        stop_task.await?;
    }

    print_summary(&stats, &statuses);
    Ok(())
}

fn print_summary(stats: &PipelineStats, statuses: &BTreeMap<u16, u64>) {
    println!("Responses:      {}", stats.succeeded);
    for (status, count) in statuses {
        println!("  {}:            {}", status, count);
    }
    println!("Failed:         {}", stats.failed);
    println!("Skipped:        {}", stats.skipped);
    println!("Elapsed:        {:.3}s", stats.elapsed.as_secs_f64());
    println!("Effective rate: {:.2} req/s", stats.effective_rate());
}

async fn run_proxy(args: &ProxyArgs) -> AppResult<()> {
    if args.targets.is_empty() {
        error!("Missing proxy target (set --target or provide [proxy].targets in config).");
        return Err(AppError::validation(ValidationError::MissingTargets));
    }

    if args.multi {
        let proxy = MultiHostProxy::new(args.rate, &args.targets)?;
        for prefix in proxy.prefixes() {
            info!(%prefix, "Proxy route");
        }
        serve(args, proxy).await
    } else {
        let [target] = args.targets.as_slice() else {
            return Err(AppError::validation(
                ValidationError::SingleHostTargetCount {
                    count: args.targets.len(),
                },
            ));
        };
        let proxy = SingleHostProxy::new(args.rate, target)?;
        info!(%target, "Proxy target");
        serve(args, proxy).await
    }
}

async fn serve<H: Handler>(args: &ProxyArgs, handler: H) -> AppResult<()> {
    let server = ProxyServer::bind(&args.listen).await?;
    info!(rate = %args.rate, "Proxy rate");

    let shutdown = CancelSignal::new();
    let signal_task = setup_signal_shutdown_handler(&shutdown);
    server.serve(Arc::new(handler), shutdown.listener()).await;
    shutdown.fire();
    signal_task.await?;
    Ok(())
}
