/*
[INPUT]:  HTTP method, API path and optional JSON body from the command line
[OUTPUT]: Pretty-printed JSON response or a classified error
[POS]:    CLI passthrough to the request pipeline
[UPDATE]: When request options change
*/

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use mobank_session::{ApiRequest, ErrorKind};
use serde_json::Value;
use tracing::debug;

use super::App;

pub async fn run(app: &App, method: &str, path: &str, body: Option<&str>, retry_safe: bool) -> Result<()> {
    let mut request = build_request(method, path)?;
    if let Some(body) = body {
        let value: Value = serde_json::from_str(body).context("--body must be valid JSON")?;
        request = request.with_body(value);
    }
    if retry_safe {
        request = request.retry_safe(true);
    }

    debug!(method = %request.method, path = %request.path, "sending request from CLI");
    match app.session.client().send::<Value>(request).await {
        Ok(Value::Null) => {
            println!("{}", style("(empty response)").dim());
            Ok(())
        }
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            let hint = match err.kind() {
                ErrorKind::NetworkUnavailable => "device is offline",
                ErrorKind::AuthExpired => "session ended; run `mobank login`",
                ErrorKind::RateLimited => "slow down and try again later",
                ErrorKind::Timeout | ErrorKind::NetworkError => "network problem; try again",
                ErrorKind::ServerError => "server error; try again later",
                ErrorKind::ClientError | ErrorKind::Unexpected => "request rejected",
            };
            eprintln!("{} {}", style(err.kind()).red().bold(), hint);
            Err(anyhow!(err))
        }
    }
}

fn build_request(method: &str, path: &str) -> Result<ApiRequest> {
    if !path.starts_with('/') {
        bail!("path must start with '/', got `{path}`");
    }
    let request = match method.to_ascii_uppercase().as_str() {
        "GET" => ApiRequest::get(path),
        "POST" => ApiRequest::post(path),
        "PUT" => ApiRequest::put(path),
        "PATCH" => ApiRequest::patch(path),
        "DELETE" => ApiRequest::delete(path),
        other => bail!("unsupported method `{other}`"),
    };
    Ok(request)
}
