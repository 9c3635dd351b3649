mod support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pacekeeper::proxy::{Handler, MultiHostProxy, ProxyServer, SingleHostProxy};
use pacekeeper::rate::{Rate, effective_rate};
use pacekeeper::shutdown::CancelSignal;
use reqwest::Client;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use support::spawn_http_server_or_skip;

struct RunningProxy {
    addr: SocketAddr,
    signal: CancelSignal,
    task: JoinHandle<()>,
}

impl RunningProxy {
    async fn shutdown(self) -> Result<(), String> {
        self.signal.fire();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .map_err(|err| format!("proxy did not stop: {}", err))?
            .map_err(|err| format!("proxy task failed: {}", err))
    }
}

async fn start<H: Handler>(handler: H) -> Result<RunningProxy, String> {
    let server = ProxyServer::bind("127.0.0.1:0")
        .await
        .map_err(|err| err.to_string())?;
    let addr = server.local_addr();
    let signal = CancelSignal::new();
    let listener = signal.listener();
    let task = tokio::spawn(async move { server.serve(Arc::new(handler), listener).await });
    Ok(RunningProxy { addr, signal, task })
}

async fn get_text(client: &Client, url: &str) -> Result<(u16, String), String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| format!("request to {} failed: {}", url, err))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| format!("read body failed: {}", err))?;
    Ok((status, body))
}

fn one_qps() -> Result<Rate, String> {
    Rate::per_second(1.0).map_err(|err| err.to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_host_proxy_forwards_at_one_qps() -> Result<(), String> {
    let Some((upstream, _server)) = spawn_http_server_or_skip()? else {
        return Ok(());
    };
    // The pacer's first slot opens one interval after construction.
    let start_time = Instant::now();
    let proxy = start(SingleHostProxy::new(one_qps()?, &upstream).map_err(|err| err.to_string())?)
        .await?;
    let client = Client::new();

    for index in 0..3 {
        let url = format!("http://{}/item/{}?q=1", proxy.addr, index);
        let (status, body) = get_text(&client, &url).await?;
        if status != 200 || body != format!("GET /item/{}?q=1\n", index) {
            return Err(format!("Unexpected response {}: {:?}", status, body));
        }
    }
    let rate = effective_rate(3, start_time.elapsed());
    if rate > 1.0 || rate < 0.5 {
        return Err(format!("Effective rate outside (0.5, 1.0]: {}", rate));
    }
    proxy.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_host_proxy_routes_by_authority() -> Result<(), String> {
    let Some((first, _first_server)) = spawn_http_server_or_skip()? else {
        return Ok(());
    };
    let Some((second, _second_server)) = spawn_http_server_or_skip()? else {
        return Ok(());
    };
    let start_time = Instant::now();
    let handler = MultiHostProxy::new(one_qps()?, [first.as_str(), second.as_str()])
        .map_err(|err| err.to_string())?;
    let proxy = start(handler).await?;
    let client = Client::new();

    for upstream in [&first, &second] {
        let authority = upstream.trim_start_matches("http://");
        let url = format!("http://{}/{}/hello", proxy.addr, authority);
        let (status, body) = get_text(&client, &url).await?;
        if status != 200 || body != "GET /hello\n" {
            return Err(format!("Unexpected response {}: {:?}", status, body));
        }
    }
    let (status, _body) = get_text(&client, &format!("http://{}/unknown:1/x", proxy.addr)).await?;
    if status != 404 {
        return Err(format!("Expected 404 for unknown route, got {}", status));
    }
    let rate = effective_rate(3, start_time.elapsed());
    if rate > 1.0 {
        return Err(format!("Effective rate too high: {}", rate));
    }
    proxy.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unlimited_proxy_exceeds_one_hundred_per_second() -> Result<(), String> {
    let Some((upstream, _server)) = spawn_http_server_or_skip()? else {
        return Ok(());
    };
    let proxy = start(SingleHostProxy::new(Rate::UNLIMITED, &upstream).map_err(|err| err.to_string())?)
        .await?;
    let client = Client::new();

    let total: u64 = 200;
    let start_time = Instant::now();
    let mut requests = JoinSet::new();
    for index in 0..total {
        let client = client.clone();
        let url = format!("http://{}/n/{}", proxy.addr, index);
        requests.spawn(async move { get_text(&client, &url).await });
    }
    while let Some(joined) = requests.join_next().await {
        let (status, _body) = joined.map_err(|err| format!("request task failed: {}", err))??;
        if status != 200 {
            return Err(format!("Unexpected status {}", status));
        }
    }
    let rate = effective_rate(total, start_time.elapsed());
    if rate <= 100.0 {
        return Err(format!("Unlimited proxy rate too low: {}", rate));
    }
    proxy.shutdown().await
}

#[tokio::test]
async fn proxy_rejects_chunked_request_bodies() -> Result<(), String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let Some((upstream, _server)) = spawn_http_server_or_skip()? else {
        return Ok(());
    };
    let proxy = start(SingleHostProxy::new(Rate::UNLIMITED, &upstream).map_err(|err| err.to_string())?)
        .await?;

    let mut socket = tokio::net::TcpStream::connect(proxy.addr)
        .await
        .map_err(|err| format!("connect failed: {}", err))?;
    socket
        .write_all(b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n")
        .await
        .map_err(|err| format!("write failed: {}", err))?;
    let mut response = String::new();
    socket
        .read_to_string(&mut response)
        .await
        .map_err(|err| format!("read failed: {}", err))?;
    if !response.starts_with("HTTP/1.1 411") {
        return Err(format!("Expected 411, got {:?}", response));
    }
    proxy.shutdown().await
}
