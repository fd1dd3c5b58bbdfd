//! Request commands: `get`, `delete`, `post`, `put`, `patch`, `upload` and
//! `download`.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;

use super::config::{Options, parse_pair};
use crate::http::{Method, RequestBody, RequestConfig, ResponseBody, UploadFile};

/// Sends a request and prints the response body.
#[tracing::instrument(skip(options, query, data))]
pub async fn fetch(
    options: &Options,
    method: Method,
    endpoint: &str,
    query: &[String],
    data: Option<&str>,
) -> Result<()> {
    let client = options.client()?;

    let mut config = with_query(RequestConfig::new(method), query)?;
    if let Some(data) = data {
        let value: Value = serde_json::from_str(data).context("--data must be valid JSON")?;
        config = config.with_body(RequestBody::Json(value));
    }

    let response = client.execute(endpoint, config).await?;
    debug!("Received HTTP {}", response.status);
    print_body(&response.data);
    Ok(())
}

/// Uploads a file from disk and prints the response body.
#[tracing::instrument(skip(options))]
pub async fn upload(options: &Options, endpoint: &str, path: &Path) -> Result<()> {
    let file = UploadFile::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let client = options.client()?;

    let response: Value = client
        .upload(endpoint, file, RequestConfig::default())
        .await?;
    print_body(&ResponseBody::Json(response));
    Ok(())
}

/// Downloads a body to `output`, whatever its content type.
#[tracing::instrument(skip(options, query))]
pub async fn download(
    options: &Options,
    endpoint: &str,
    query: &[String],
    output: &Path,
) -> Result<()> {
    let client = options.client()?;
    let config = with_query(RequestConfig::default(), query)?;

    let bytes = client.download(endpoint, config).await?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Saved {} bytes to {}", bytes.len(), output.display());
    println!("Saved {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn with_query(mut config: RequestConfig, query: &[String]) -> Result<RequestConfig> {
    for raw in query {
        let (key, value) = parse_pair(raw)?;
        config = config.with_query(key, value);
    }
    Ok(config)
}

fn print_body(body: &ResponseBody) {
    let rendered = render(body);
    if !rendered.is_empty() {
        println!("{}", rendered);
    }
}

/// Text shown for a response body: pretty JSON, the text itself, or a
/// size note for binary data.
pub fn render(body: &ResponseBody) -> String {
    match body {
        ResponseBody::Json(Value::Null) => String::new(),
        ResponseBody::Json(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        ResponseBody::Text(text) => text.clone(),
        ResponseBody::Binary(bytes) if bytes.is_empty() => String::new(),
        ResponseBody::Binary(bytes) => format!("<{} bytes of binary data>", bytes.len()),
    }
}
