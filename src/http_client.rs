use anyhow::{Context, Result, ensure};
use reqwest::{Client, Response};
use std::time::Duration;

/// Create the HTTP client used to talk to the JIP endpoint
///
/// # Arguments
/// * `request_timeout` - Upper bound for a whole request/response round trip
///
/// # Examples
/// ```no_run
/// use jip_client::http_client::jip_http_client;
/// use std::time::Duration;
///
/// let client = jip_http_client(Duration::from_secs(30))
///     .expect("failed to create client");
/// ```
pub fn jip_http_client(request_timeout: Duration) -> Result<Client> {
    ensure!(
        !request_timeout.is_zero(),
        "failed since request timeout must not be zero"
    );

    Client::builder()
        .timeout(request_timeout)
        .build()
        .context("failed to create JIP HTTP client")
}

/// Handle HTTP response by checking status and extracting body
///
/// This is a common utility for processing HTTP responses.
/// It ensures the response status is successful and extracts the body text.
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "POST action=discoverBRs")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - If the status is not successful or reading the body fails
pub async fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().await.context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}
