//! Client-side access to a peer's remote bootstrap service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tabletcopy_consensus::{HostPort, NodeId};
use tabletcopy_transport::{
    Opcode, Result as TransportResult, RpcClient, RpcClientConfig, TcpTransport, TcpTransportConfig,
};

use crate::config::CopyClientConfig;
use crate::messages::{
    decode, encode, BeginSessionRequest, BeginSessionResponse, EndSessionRequest, EndSessionResponse,
    FetchDataRequest, FetchDataResponse,
};

/// Calls of the remote bootstrap service.
///
/// Failures are returned as transport errors; service errors arrive as
/// [`TransportError::Remote`](tabletcopy_transport::TransportError::Remote)
/// and are reclassified by the caller.
#[async_trait]
pub trait RemoteBootstrapProxy: Send + Sync {
    /// Opens a session.
    async fn begin_session(&self, req: BeginSessionRequest) -> TransportResult<BeginSessionResponse>;

    /// Fetches one chunk.
    async fn fetch_data(&self, req: FetchDataRequest) -> TransportResult<FetchDataResponse>;

    /// Closes a session.
    async fn end_session(&self, req: EndSessionRequest) -> TransportResult<EndSessionResponse>;
}

/// Resolves a peer to a proxy.
#[async_trait]
pub trait ProxyFactory: Send + Sync {
    /// Returns a proxy talking to `uuid` at `addr`.
    async fn new_proxy(&self, uuid: &NodeId, addr: &HostPort) -> TransportResult<Arc<dyn RemoteBootstrapProxy>>;
}

/// Proxy over a framed TCP connection.
pub struct TcpRemoteBootstrapProxy {
    client: RpcClient,
}

impl TcpRemoteBootstrapProxy {
    /// Wraps an established RPC client.
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteBootstrapProxy for TcpRemoteBootstrapProxy {
    async fn begin_session(&self, req: BeginSessionRequest) -> TransportResult<BeginSessionResponse> {
        let payload = self.client.call(Opcode::BeginSession, encode(&req)?).await?;
        decode(&payload)
    }

    async fn fetch_data(&self, req: FetchDataRequest) -> TransportResult<FetchDataResponse> {
        let payload = self.client.call(Opcode::FetchData, encode(&req)?).await?;
        decode(&payload)
    }

    async fn end_session(&self, req: EndSessionRequest) -> TransportResult<EndSessionResponse> {
        let payload = self.client.call(Opcode::EndSession, encode(&req)?).await?;
        decode(&payload)
    }
}

/// Dials peers over TCP.
#[derive(Debug, Clone)]
pub struct TcpProxyFactory {
    transport: TcpTransport,
    rpc_config: RpcClientConfig,
}

impl TcpProxyFactory {
    /// Builds a factory using the timeouts of `config`.
    pub fn new(config: &CopyClientConfig) -> Self {
        Self {
            transport: TcpTransport::new(TcpTransportConfig {
                connect_timeout_ms: config.connect_timeout_ms,
                nodelay: true,
            }),
            rpc_config: RpcClientConfig {
                response_timeout_ms: config.rpc_timeout_ms,
            },
        }
    }
}

#[async_trait]
impl ProxyFactory for TcpProxyFactory {
    async fn new_proxy(&self, uuid: &NodeId, addr: &HostPort) -> TransportResult<Arc<dyn RemoteBootstrapProxy>> {
        let conn = self.transport.connect(&addr.to_string()).await?;
        debug!(peer = %uuid, addr = %addr, "connected to remote bootstrap service");
        let client = RpcClient::new(Arc::new(conn), self.rpc_config.clone());
        Ok(Arc::new(TcpRemoteBootstrapProxy::new(client)))
    }
}
