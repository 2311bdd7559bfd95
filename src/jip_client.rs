use crate::{
    config::JipConfig,
    request_queue::{RequestDescriptor, RequestQueue},
    transport::{HttpTransport, Request, Transport},
    types::{
        ActionRequest, BorderRouter, DiscoverBorderRoutersResponse, NetworkResponse,
        NetworkState, Status, StatusResponse, VariableReading, VersionInfo,
    },
};
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::oneshot;

/// Pending result of a queued action
pub type ActionFuture<R> = Pin<Box<dyn Future<Output = Result<R>> + Send + 'static>>;

/// Client for the JIP device management endpoint
///
/// Every action is queued on a shared [`RequestQueue`], so requests reach the
/// endpoint one at a time and in call order. Actions enqueue their request
/// immediately and return a future resolving to the result.
pub struct JipClient<T> {
    queue: RequestQueue<T>,
    endpoint: String,
    state: Arc<Mutex<NetworkState>>,
}

impl<T> Clone for JipClient<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            endpoint: self.endpoint.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl JipClient<HttpTransport> {
    pub fn new(config: &JipConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)
            .context("failed to create JIP transport")?;

        Ok(Self::with_transport(transport, config))
    }
}

impl<T> JipClient<T>
where
    T: Transport + Send + Sync + 'static,
{
    // action names as understood by the JIP CGI
    const GET_VERSION: &str = "getVersion";
    const DISCOVER_BORDER_ROUTERS: &str = "discoverBRs";
    const DISCOVER: &str = "discover";
    const GET_VARIABLE: &str = "GetVar";
    const SET_VARIABLE: &str = "SetVar";

    pub fn with_transport(transport: T, config: &JipConfig) -> Self {
        Self {
            queue: RequestQueue::new(transport, config.poll_interval),
            endpoint: config.url.clone(),
            state: Arc::new(Mutex::new(NetworkState::default())),
        }
    }

    /// Start dispatching queued requests
    pub fn start(&self) {
        self.queue.run();
    }

    /// Stop dispatching and drop all pending requests
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Drop requests that have not been sent yet, e.g. when leaving a view
    ///
    /// The futures of dropped requests resolve with an error.
    pub fn cancel_pending_requests(&self) {
        self.queue.clear();
    }

    pub fn queue(&self) -> &RequestQueue<T> {
        &self.queue
    }

    pub fn state(&self) -> NetworkState {
        self.lock_state().clone()
    }

    pub fn border_routers(&self) -> Vec<BorderRouter> {
        self.lock_state().border_routers.clone()
    }

    pub fn active_border_router(&self) -> Option<String> {
        self.lock_state().active_border_router.clone()
    }

    pub fn network(&self) -> Value {
        self.lock_state().network.clone()
    }

    /// Route subsequent variable reads and writes through `border_router`
    pub fn select_border_router(&self, border_router: &str) {
        self.lock_state().active_border_router = Some(border_router.to_string());
    }

    pub fn get_version(&self) -> ActionFuture<VersionInfo> {
        self.submit(ActionRequest::new(Self::GET_VERSION), parse_response)
    }

    /// Discover the border routers reachable from the endpoint
    ///
    /// On success the border router list of the client state is replaced.
    pub fn discover_border_routers(&self) -> ActionFuture<Status> {
        let state = self.state.clone();

        self.submit(
            ActionRequest::new(Self::DISCOVER_BORDER_ROUTERS),
            move |body| {
                let response: DiscoverBorderRoutersResponse = parse_response(body)?;
                debug!(
                    "discovered {} border routers",
                    response.border_routers.len()
                );
                lock(&state).border_routers = response.border_routers;
                Ok(response.status)
            },
        )
    }

    /// Discover the network behind `border_router`
    ///
    /// `border_router` becomes the active border router right away. On success
    /// the network snapshot of the client state is replaced.
    pub fn discover(&self, border_router: &str) -> ActionFuture<Status> {
        self.select_border_router(border_router);
        let state = self.state.clone();

        self.submit(
            ActionRequest::new(Self::DISCOVER).param("BRaddress", border_router),
            move |body| {
                let response: NetworkResponse = parse_response(body)?;
                lock(&state).network = response.network;
                Ok(response.status)
            },
        )
    }

    /// Read a single variable of a MIB on a node
    ///
    /// If the response does not contain the node, the reading carries
    /// [`Status::NO_DATA`] and a `"?"` placeholder value instead of failing.
    pub fn get_variable(
        &self,
        node_address: &str,
        mib: impl ToString,
        variable: impl ToString,
    ) -> ActionFuture<VariableReading> {
        let request = self
            .node_request(Self::GET_VARIABLE, node_address, mib, variable)
            .param("refresh", "no");

        self.submit(request, |body| {
            let response: NetworkResponse = parse_response(body)?;
            Ok(VariableReading::from_network(
                response.status,
                &response.network,
            ))
        })
    }

    /// Write a single variable of a MIB on a node
    pub fn set_variable(
        &self,
        node_address: &str,
        mib: impl ToString,
        variable: impl ToString,
        value: impl ToString,
    ) -> ActionFuture<Status> {
        let request = self
            .node_request(Self::SET_VARIABLE, node_address, mib, variable)
            .param("value", value)
            .param("refresh", "no");

        self.submit(request, |body| {
            parse_response::<StatusResponse>(body).map(|response| response.status)
        })
    }

    fn node_request(
        &self,
        action: &str,
        node_address: &str,
        mib: impl ToString,
        variable: impl ToString,
    ) -> ActionRequest {
        let border_router = self.active_border_router().unwrap_or_else(|| {
            warn!("{action} for {node_address} without a selected border router");
            String::new()
        });

        ActionRequest::new(action)
            .param("BRaddress", border_router)
            .param("nodeaddress", node_address)
            .param("mib", mib)
            .param("var", variable)
    }

    /// Queue `payload` and resolve with `handle` applied to the response body
    fn submit<R, F>(&self, payload: ActionRequest, handle: F) -> ActionFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(Value) -> Result<R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let action = payload.action().to_string();

        self.queue.enqueue(
            RequestDescriptor::new(Request::post(&self.endpoint, payload)).on_success(
                move |body| {
                    let _ = tx.send(handle(body));
                },
            ),
        );

        Box::pin(async move {
            rx.await
                .map_err(|_| anyhow!("{action} request did not complete"))?
                .with_context(|| format!("failed to handle {action} response"))
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, NetworkState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<NetworkState>) -> MutexGuard<'_, NetworkState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_response<R: DeserializeOwned>(body: Value) -> Result<R> {
    serde_json::from_value(body).context("unexpected response format")
}
