use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod adapters;
mod cli;
mod error;
mod histogram;
mod options;
mod percentiles;
mod runner;
mod servers;
mod weighted;

use cli::{Cli, Command};
use error::CoreResult;
use options::OutputSink;
use runner::PeriodicRunner;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> CoreResult<()> {
    match cli.command {
        Command::Load(args) => run_load(args).await,
        Command::Server(args) => run_server(args).await,
        Command::TcpEcho { bind } => servers::echo_tcp::serve(&bind).await,
        Command::UdpEcho { bind } => servers::echo_udp::serve(&bind).await,
        Command::Redirect { bind, https_port } => {
            let state = Arc::new(servers::redirect::RedirectState { https_port });
            serve_http(&bind, servers::redirect::router(state)).await
        }
        Command::Report { path } => print_report(&path),
        Command::Version => {
            println!("ballistic {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_load(args: cli::LoadArgs) -> CoreResult<()> {
    let target = args.target.clone();
    let factory = cli::factory_for_target(&args)?;

    let raw = args.into_raw_options();
    let options = raw.normalize()?;

    info!(target, qps = options.qps, threads = options.num_threads, "starting run");

    let runner = PeriodicRunner::new(options.clone(), factory);
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling run");
            cancel_for_signal.cancel();
        }
    });

    let result = runner.run(cancel).await?;

    let start_time = chrono::Utc::now();
    result.write(start_time, &options.output)?;

    if !matches!(options.output, OutputSink::Stdout) {
        print_summary(&result);
    }

    Ok(())
}

async fn run_server(args: cli::ServerArgs) -> CoreResult<()> {
    let tunable = Arc::new(servers::TunableConfig::new(200));
    let payload = Arc::new(servers::PayloadBuffer::new());
    let state = Arc::new(servers::echo_http::EchoState { payload, tunable });

    let mut handles = Vec::new();

    let http_port = args.http_port.clone();
    let router = servers::echo_http::router(state);
    handles.push(tokio::spawn(async move { serve_http(&http_port, router).await }));

    if let Some(tcp_port) = args.tcp_port {
        handles.push(tokio::spawn(async move { servers::echo_tcp::serve(&tcp_port).await }));
    }
    if let Some(udp_port) = args.udp_port {
        handles.push(tokio::spawn(async move { servers::echo_udp::serve(&udp_port).await }));
    }
    if let Some(grpc_port) = args.grpc_port {
        handles.push(tokio::spawn(async move { servers::grpc_ping::serve(&grpc_port).await }));
    }

    for spec in args.multi_proxy {
        let (local_addr, targets) = servers::multi_proxy::parse_multi_spec(&spec)?;
        let config = servers::multi_proxy::MultiProxyConfig {
            targets,
            serial: args.multi_serial_mode,
            mirror_origin: args.multi_mirror_origin,
        };
        handles.push(tokio::spawn(async move { servers::multi_proxy::serve(&local_addr, config).await }));
    }

    for spec in args.tcp_proxy {
        let (local_addr, dest_addr) = servers::tcp_proxy::parse_tcp_proxy_spec(&spec)?;
        handles.push(tokio::spawn(async move { servers::tcp_proxy::serve(&local_addr, dest_addr).await }));
    }

    for handle in handles {
        if let Ok(Err(e)) = handle.await {
            error!("server task exited with error: {e}");
        }
    }

    Ok(())
}

async fn serve_http(bind_addr: &str, router: axum::Router) -> CoreResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| error::CoreError::Setup(format!("http bind {bind_addr}: {e}")))?;
    info!(bind_addr, "http server listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| error::CoreError::Setup(format!("http serve: {e}")))
}

fn print_report(path: &std::path::Path) -> CoreResult<()> {
    let contents = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_summary(result: &runner::result::RunnerResult) {
    eprintln!(
        "count={} errors={} actual_qps={:.2} duration={:.3}s",
        result.total_count, result.error_count, result.actual_qps, result.actual_duration
    );
    for pv in &result.distribution.percentiles {
        eprintln!("  p{:<6} {:.6}s", pv.percentile, pv.value);
    }
}
