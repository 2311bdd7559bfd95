pub mod config;
pub mod http_client;
pub mod jip_client;
pub mod request_queue;
pub mod transport;
pub mod types;

pub use crate::{
    config::{AppConfig, JipConfig},
    jip_client::{ActionFuture, JipClient},
    request_queue::{RequestDescriptor, RequestQueue},
    transport::{HttpTransport, Request, Transport},
    types::{ActionRequest, NetworkState, Status, VariableReading, VersionInfo},
};
