//! HTTP webhook tools: notify external services from the board.
//!
//! Response bodies are read only up to [`MAX_BODY_BYTES`], so a chatty
//! endpoint cannot blow the memory or conversation budget.

use async_trait::async_trait;
use microclaw_core::error::ToolError;
use microclaw_core::tool::{InputSchema, ParamKind, Tool, ToolArgs};
use std::time::Duration;

/// Response body bytes kept per request.
pub const MAX_BODY_BYTES: usize = 512;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP client for both webhook tools.
#[derive(Clone)]
pub struct Webhook {
    client: reqwest::Client,
}

impl Webhook {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ToolError::failed("http", e.to_string()))?;
        Ok(Self { client })
    }

    async fn finish(
        tool: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<String, ToolError> {
        let mut response = response.map_err(|e| ToolError::failed(tool, e.to_string()))?;
        let status = response.status().as_u16();

        // Stop reading at the cap; the rest of the body is never buffered.
        let mut body = Vec::with_capacity(MAX_BODY_BYTES);
        while body.len() < MAX_BODY_BYTES {
            let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| ToolError::failed(tool, e.to_string()))?
            else {
                break;
            };
            let take = chunk.len().min(MAX_BODY_BYTES - body.len());
            body.extend_from_slice(&chunk[..take]);
        }
        Ok(format!("HTTP {status}: {}", String::from_utf8_lossy(&body)))
    }
}

fn url<'a>(args: &'a ToolArgs) -> Result<&'a str, ToolError> {
    let url = args.str("url")?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::InvalidArguments(
            "url must start with http:// or https://".into(),
        ));
    }
    Ok(url)
}

pub struct HttpGetTool(pub Webhook);

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Make an HTTP GET request to a URL. Response is truncated to 512 bytes."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty().required("url", ParamKind::String, "URL to request")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let url = url(&args)?;
        let response = self.0.client.get(url).send().await;
        Webhook::finish(self.name(), response).await
    }
}

pub struct HttpPostTool(pub Webhook);

#[async_trait]
impl Tool for HttpPostTool {
    fn name(&self) -> &str {
        "http_post"
    }

    fn description(&self) -> &str {
        "Make an HTTP POST request. Use this to send webhooks or notifications."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
            .required("url", ParamKind::String, "URL to POST to")
            .optional("body", ParamKind::String, "Request body (usually JSON string)")
            .optional(
                "content_type",
                ParamKind::String,
                "Content-Type header (default: application/json)",
            )
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let url = url(&args)?;
        let body = args.opt_str("body").unwrap_or_default().to_string();
        let content_type = args.opt_str("content_type").unwrap_or("application/json");
        let response = self
            .0
            .client
            .post(url)
            .header("content-type", content_type)
            .body(body)
            .send()
            .await;
        Webhook::finish(self.name(), response).await
    }
}
