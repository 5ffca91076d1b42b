//! Outbound calls from one node to its peers
//!
//! `PeerTransport` is the seam between the transfer logic and the network.
//! `HttpTransport` talks JSON over HTTP to real nodes; `LocalTransport`
//! (see `local.rs`) routes calls to in-process nodes.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

use super::envelope::TransferEnvelope;
use crate::campaign::WorldGraph;
use crate::core::error::{Result, WarError};
use crate::core::types::LocationId;
use crate::node::response::{LocationStatus, NodeResponse};
use crate::node::service::ResetRequest;

/// Calls a node can make to its peers
///
/// Any answer that is not a success status with a parseable body is an
/// `Err(WarError::Transit)`; a node that answered with `success: false` still
/// counts as delivered.
pub trait PeerTransport: Send + Sync {
    /// Deliver one hop of a transfer to `target`'s receive endpoint
    fn deliver<'a>(
        &'a self,
        target: &'a LocationId,
        envelope: &'a TransferEnvelope,
    ) -> BoxFuture<'a, Result<NodeResponse>>;

    /// Read `target`'s public status
    fn status<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<LocationStatus>>;

    /// Reset `target` to its initial state without letting it fan out further
    fn reset<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<NodeResponse>>;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: Client,
    addresses: AHashMap<LocationId, String>,
}

impl HttpTransport {
    /// Address every location at its configured `host:port`
    pub fn new(graph: &WorldGraph, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WarError::Config(format!("HTTP client: {}", e)))?;

        let addresses = graph
            .locations()
            .map(|location| (location.id.clone(), location.base_url()))
            .collect();

        Ok(Self { client, addresses })
    }

    /// Address peers by service name (`village_1` -> `village-1`), as inside a
    /// container network where every location runs as its own service
    pub fn with_service_hostnames(mut self, graph: &WorldGraph) -> Self {
        for location in graph.locations() {
            let host = location.id.as_str().replace('_', "-");
            self.addresses.insert(
                location.id.clone(),
                format!("http://{}:{}", host, location.port),
            );
        }
        self
    }

    /// Override one peer's base URL
    pub fn with_address(mut self, id: LocationId, base_url: impl Into<String>) -> Self {
        self.addresses.insert(id, base_url.into());
        self
    }

    pub fn into_shared(self) -> Arc<dyn PeerTransport> {
        Arc::new(self)
    }

    fn url(&self, target: &LocationId, route: &str) -> Result<String> {
        self.addresses
            .get(target)
            .map(|base| format!("{}{}", base.trim_end_matches('/'), route))
            .ok_or_else(|| WarError::UnknownLocation(target.clone()))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        target: &LocationId,
        route: &str,
        body: &B,
    ) -> Result<NodeResponse> {
        let transit = |reason: String| WarError::Transit {
            target: target.clone(),
            reason,
        };

        let response = self
            .client
            .post(self.url(target, route)?)
            .json(body)
            .send()
            .await
            .map_err(|e| transit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<NodeResponse>(&error_text)
                .map(|body| body.message)
                .unwrap_or(error_text);
            return Err(transit(format!("{}: {}", status, message)));
        }

        response
            .json()
            .await
            .map_err(|e| transit(e.to_string()))
    }
}

impl PeerTransport for HttpTransport {
    fn deliver<'a>(
        &'a self,
        target: &'a LocationId,
        envelope: &'a TransferEnvelope,
    ) -> BoxFuture<'a, Result<NodeResponse>> {
        async move {
            match envelope {
                TransferEnvelope::Army(army) => self.post(target, "/receive_army", army).await,
                TransferEnvelope::Resources(cargo) => {
                    self.post(target, "/receive_resources", cargo).await
                }
            }
        }
        .boxed()
    }

    fn status<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<LocationStatus>> {
        async move {
            let transit = |reason: String| WarError::Transit {
                target: target.clone(),
                reason,
            };
            let response = self
                .client
                .get(self.url(target, "/")?)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| transit(e.to_string()))?;
            response.json().await.map_err(|e| transit(e.to_string()))
        }
        .boxed()
    }

    fn reset<'a>(&'a self, target: &'a LocationId) -> BoxFuture<'a, Result<NodeResponse>> {
        async move { self.post(target, "/reset", &ResetRequest::local_only()).await }.boxed()
    }
}
