//! Thin CLI front-end. Builds a `RawOptions`/`RunnerOptions` and hands it to
//! the core — the CLI itself carries no runtime state (Design Notes §9).
//! This is deliberately not an exhaustive reproduction of every historical
//! flag; spec.md §1 names the full CLI surface as an external concern.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::adapters::grpc::{GrpcAdapterConfig, GrpcAdapterFactory, GrpcMode};
use crate::adapters::http::{HttpAdapterConfig, HttpAdapterFactory};
use crate::adapters::tcp::{TcpAdapterConfig, TcpAdapterFactory};
use crate::adapters::udp::{UdpAdapterConfig, UdpAdapterFactory};
use crate::adapters::AdapterFactory;
use crate::error::{CoreError, CoreResult};
use crate::options::{AbortOn, OutputSink, RawOptions};
use crate::percentiles::DEFAULT_PERCENTILES;

#[derive(Parser, Debug)]
#[command(name = "ballistic", version, about = "Periodic load generator and latency histogram engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a measurement against an http(s)://, tcp://, or udp:// target.
    Load(LoadArgs),
    /// Host the echo/redirect/proxy servers.
    Server(ServerArgs),
    /// Start a standalone TCP echo server.
    TcpEcho { #[arg(long, default_value = "0.0.0.0:8078")] bind: String },
    /// Start a standalone UDP echo server.
    UdpEcho { #[arg(long, default_value = "0.0.0.0:8078")] bind: String },
    /// Start a standalone HTTPS redirector.
    Redirect {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, default_value_t = 8443)]
        https_port: u16,
    },
    /// Print a previously-saved result file's summary.
    Report { path: std::path::PathBuf },
    /// Print the version and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct LoadArgs {
    /// Target: http(s)://host/path, tcp://host:port, udp://host:port, or
    /// (with `-grpc`) a bare host:port.
    pub target: String,

    /// Treat `target` as a bare `host:port` and run the gRPC adapter.
    #[arg(long)]
    pub grpc: bool,
    /// Number of round-robin gRPC stream handles per worker.
    #[arg(short = 's', long = "streams", default_value_t = 1)]
    pub streams: usize,
    /// Exercise the ping RPC. This is the default gRPC mode; `-health`
    /// switches to the standard health-check probe instead (spec.md §4.3).
    #[arg(long)]
    pub ping: bool,
    #[arg(long)]
    pub health: bool,
    #[arg(long = "healthservice", default_value = "")]
    pub health_service: String,

    #[arg(long, default_value_t = 0.0)]
    pub qps: f64,
    #[arg(short = 'c', long = "concurrency", default_value_t = 1)]
    pub num_threads: u32,
    /// Duration in seconds; 0 defers to `-n`, negative runs until cancelled.
    #[arg(short = 't', long = "duration", default_value_t = 0.0)]
    pub duration: f64,
    #[arg(short = 'n', long = "requests", default_value_t = 0)]
    pub exactly: u64,
    #[arg(short = 'p', long = "percentiles", default_value = DEFAULT_PERCENTILES)]
    pub percentiles: String,
    #[arg(long, default_value_t = 0.001)]
    pub resolution: f64,
    #[arg(long, default_value_t = 0.0)]
    pub offset: f64,
    #[arg(long)]
    pub jitter: bool,
    #[arg(long, default_value = "")]
    pub labels: String,
    /// JSON output path, or `-` for stdout.
    #[arg(long)]
    pub json: Option<String>,
    /// HTTP code to abort on, or -1 for any socket/timeout error.
    #[arg(long = "abort-on")]
    pub abort_on: Option<i64>,
    #[arg(long = "allow-initial-errors")]
    pub allow_initial_errors: bool,
    #[arg(long, default_value_t = 5.0)]
    pub timeout_secs: f64,
}

#[derive(Parser, Debug)]
pub struct ServerArgs {
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub http_port: String,
    #[arg(long)]
    pub tcp_port: Option<String>,
    #[arg(long)]
    pub udp_port: Option<String>,
    #[arg(long)]
    pub grpc_port: Option<String>,
    /// Repeatable `"localAddr destURL1 destURL2 ..."` fan-out proxy spec.
    #[arg(short = 'M', long = "multi-proxy")]
    pub multi_proxy: Vec<String>,
    #[arg(long = "multi-serial-mode")]
    pub multi_serial_mode: bool,
    #[arg(long = "multi-mirror-origin")]
    pub multi_mirror_origin: bool,
    /// Repeatable `"localAddr destHost:destPort"` single-destination proxy spec.
    #[arg(short = 'P', long = "tcp-proxy")]
    pub tcp_proxy: Vec<String>,
}

/// Converts the CLI's `target` URL/address into an `AdapterFactory`, per
/// spec.md §6's scheme table (including `host:port` with `-grpc` for the
/// gRPC runner, which carries no URL scheme of its own).
pub fn factory_for_target(args: &LoadArgs) -> CoreResult<Arc<dyn AdapterFactory>> {
    let target = args.target.as_str();
    let timeout = std::time::Duration::from_secs_f64(args.timeout_secs.max(0.001));

    if args.grpc {
        if args.ping && args.health {
            return Err(CoreError::Usage("-ping and -health are mutually exclusive".into()));
        }
        let mode = if args.health {
            GrpcMode::Health { service_name: args.health_service.clone() }
        } else {
            GrpcMode::Ping
        };
        return Ok(Arc::new(GrpcAdapterFactory {
            config: GrpcAdapterConfig {
                target: target.to_string(),
                streams: args.streams.max(1),
                mode,
                payload_size: 64,
            },
        }));
    }

    if let Some(rest) = target.strip_prefix("tcp://") {
        return Ok(Arc::new(TcpAdapterFactory {
            config: TcpAdapterConfig {
                addr: rest.to_string(),
                payload: b"ping".to_vec(),
                timeout,
            },
        }));
    }
    if let Some(rest) = target.strip_prefix("udp://") {
        return Ok(Arc::new(UdpAdapterFactory {
            config: UdpAdapterConfig {
                addr: rest.to_string(),
                payload: b"ping".to_vec(),
                udp_timeout: timeout,
            },
        }));
    }
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(Arc::new(HttpAdapterFactory {
            config: HttpAdapterConfig {
                url: target.to_string(),
                method: reqwest::Method::GET,
                body: None,
                headers: Vec::new(),
                keep_alive: true,
                discard_body: true,
                timeout,
                accept_status: None,
            },
        }));
    }

    Err(CoreError::Usage(format!(
        "unrecognized target scheme in {target:?}; expected http(s)://, tcp://, udp://, or -grpc with host:port"
    )))
}

pub fn parse_abort_on(raw: Option<i64>) -> Option<AbortOn> {
    match raw {
        None => None,
        Some(-1) => Some(AbortOn::SocketError),
        Some(code) if (100..=599).contains(&code) => Some(AbortOn::HttpStatus(code as u16)),
        Some(_) => None,
    }
}

impl LoadArgs {
    pub fn into_raw_options(self) -> RawOptions {
        let output = match self.json.as_deref() {
            None => OutputSink::None,
            Some("-") => OutputSink::Stdout,
            Some(path) => OutputSink::File(path.into()),
        };

        RawOptions {
            qps: self.qps,
            num_threads: self.num_threads,
            duration: self.duration,
            exactly: self.exactly,
            percentiles: self.percentiles,
            resolution: self.resolution,
            offset: self.offset,
            jitter: self.jitter,
            run_id: uuid::Uuid::new_v4().to_string(),
            labels: self.labels,
            output,
            abort_on: parse_abort_on(self.abort_on),
            allow_initial_errors: self.allow_initial_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(target: &str) -> LoadArgs {
        LoadArgs {
            target: target.to_string(),
            grpc: false,
            streams: 1,
            ping: false,
            health: false,
            health_service: String::new(),
            qps: 0.0,
            num_threads: 1,
            duration: 0.0,
            exactly: 0,
            percentiles: DEFAULT_PERCENTILES.to_string(),
            resolution: 0.001,
            offset: 0.0,
            jitter: false,
            labels: String::new(),
            json: None,
            abort_on: None,
            allow_initial_errors: false,
            timeout_secs: 1.0,
        }
    }

    #[test]
    fn dispatches_tcp_scheme() {
        factory_for_target(&base_args("tcp://localhost:9999")).unwrap();
    }

    #[test]
    fn dispatches_udp_scheme() {
        factory_for_target(&base_args("udp://localhost:9999")).unwrap();
    }

    #[test]
    fn dispatches_http_scheme() {
        factory_for_target(&base_args("http://localhost:9999/echo")).unwrap();
    }

    #[test]
    fn dispatches_grpc_target() {
        let mut args = base_args("localhost:9999");
        args.grpc = true;
        factory_for_target(&args).unwrap();
    }

    #[test]
    fn grpc_health_mode_uses_service_name() {
        let mut args = base_args("localhost:9999");
        args.grpc = true;
        args.health = true;
        args.health_service = "ballistic.ping.PingServer".into();
        factory_for_target(&args).unwrap();
    }

    #[test]
    fn grpc_rejects_ping_and_health_together() {
        let mut args = base_args("localhost:9999");
        args.grpc = true;
        args.ping = true;
        args.health = true;
        assert!(matches!(factory_for_target(&args), Err(CoreError::Usage(_))));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(factory_for_target(&base_args("ftp://localhost")).is_err());
    }

    #[test]
    fn abort_on_negative_one_means_socket_error() {
        assert_eq!(parse_abort_on(Some(-1)), Some(AbortOn::SocketError));
    }

    #[test]
    fn abort_on_status_code() {
        assert_eq!(parse_abort_on(Some(503)), Some(AbortOn::HttpStatus(503)));
    }
}
