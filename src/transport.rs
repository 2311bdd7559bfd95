use crate::{
    http_client::{handle_http_response, jip_http_client},
    types::ActionRequest,
};
use anyhow::{Context, Result};
use log::info;
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::{Client, Method, header::CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use trait_variant::make;

/// The wire part of a queued request
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub payload: ActionRequest,
}

impl Request {
    /// All JIP actions are posted to the same endpoint
    pub fn post(endpoint: impl Into<String>, payload: ActionRequest) -> Self {
        Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            payload,
        }
    }
}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait Transport {
    /// Deliver one request and return the parsed response body
    async fn send(&self, request: Request) -> Result<Value>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = jip_http_client(request_timeout)?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Value> {
        let body = request.payload.encode()?;
        let context_msg = format!("{} {}", request.method, request.payload);
        info!("{context_msg} to {}", request.endpoint);

        let res = self
            .client
            .request(request.method, &request.endpoint)
            .header(CONTENT_TYPE, Self::FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .context(format!("failed to send {context_msg}"))?;

        let body = handle_http_response(res, &context_msg).await?;

        serde_json::from_str(&body).context(format!("failed to parse response of {context_msg}"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for exercising the queue without a network

    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };
    use tokio::sync::Semaphore;

    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        sent: Arc<Mutex<Vec<Request>>>,
        responses: Arc<Mutex<HashMap<String, Value>>>,
        failing: Arc<Mutex<Vec<String>>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedTransport {
        /// Every call waits for a permit handed out by [`ScriptedTransport::release`]
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Default::default()
            }
        }

        pub fn respond(&self, action: &str, body: Value) {
            self.responses
                .lock()
                .unwrap()
                .insert(action.to_string(), body);
        }

        pub fn fail(&self, action: &str) {
            self.failing.lock().unwrap().push(action.to_string());
        }

        pub fn release(&self, calls: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(calls);
            }
        }

        pub fn sent(&self) -> Vec<Request> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_actions(&self) -> Vec<String> {
            self.sent()
                .iter()
                .map(|request| request.payload.action().to_string())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, request: Request) -> Result<Value> {
            let action = request.payload.action().to_string();
            self.sent.lock().unwrap().push(request);

            if let Some(gate) = &self.gate {
                gate.acquire().await?.forget();
            }

            if self.failing.lock().unwrap().contains(&action) {
                bail!("{action} failed with status 500");
            }

            let scripted = self.responses.lock().unwrap().get(&action).cloned();
            Ok(scripted.unwrap_or_else(|| json!({ "Status": 0, "Action": action })))
        }
    }
}
