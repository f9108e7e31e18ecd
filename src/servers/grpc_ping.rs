//! gRPC echo service hosted by the `server` subcommand: answers the ping
//! RPC the gRPC call adapter exercises, and reports serving over the
//! standard health-check service so the adapter's health-probe mode has a
//! real target to validate against.

use tonic::{Request, Response, Status};

use crate::adapters::grpc::pb::ping_server_server::{PingServer, PingServerServer};
use crate::adapters::grpc::pb::PingMessage;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Default)]
pub struct PingService;

#[tonic::async_trait]
impl PingServer for PingService {
    async fn ping(&self, request: Request<PingMessage>) -> Result<Response<PingMessage>, Status> {
        let mut reply = request.into_inner();
        reply.seq += 1;
        Ok(Response::new(reply))
    }
}

/// Serves the ping RPC and the standard `grpc.health.v1.Health` service
/// (reported as always `SERVING`) on `bind_addr` until the process exits.
pub async fn serve(bind_addr: &str) -> CoreResult<()> {
    let addr = bind_addr
        .parse()
        .map_err(|e| CoreError::Setup(format!("grpc bind address {bind_addr:?}: {e}")))?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<PingServerServer<PingService>>()
        .await;

    tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(PingServerServer::new(PingService))
        .serve(addr)
        .await
        .map_err(|e| CoreError::Setup(format!("grpc serve {bind_addr}: {e}")))
}
