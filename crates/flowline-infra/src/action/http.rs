//! `network` action handler backed by `reqwest`.
//!
//! Params: `method` (default `GET`), `url`, `headers` (map of strings) and
//! `fail_on_status`. An input named `url` overrides the param. For any
//! method other than GET the remaining inputs are sent as a JSON body.
//!
//! The result record is `{ status, ok, data }` where `data` is the parsed
//! JSON body, or the raw text when the body is not JSON.

use std::time::Duration;

use flowline_core::workflow::action::{bool_param, str_param, ActionError, ActionHandler};
use flowline_types::config::HttpActionConfig;
use flowline_types::context::{map_to_json, ContextMap, ContextValue};

/// Performs HTTP requests for `network` action steps.
#[derive(Debug, Clone)]
pub struct HttpActionHandler {
    client: reqwest::Client,
}

impl HttpActionHandler {
    /// Build a handler with its own client configured from `config`.
    pub fn new(config: &HttpActionConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_params(params: &ContextMap) -> Result<Vec<(String, String)>, ActionError> {
    match params.get("headers") {
        None | Some(ContextValue::Null) => Ok(Vec::new()),
        Some(ContextValue::Map(map)) => map
            .iter()
            .map(|(name, value)| match value {
                ContextValue::String(s) => Ok((name.clone(), s.clone())),
                other => Err(ActionError::invalid(
                    "headers",
                    format!("header '{name}' must be a string, got {}", other.type_name()),
                )),
            })
            .collect(),
        Some(other) => Err(ActionError::invalid(
            "headers",
            format!("expected map, got {}", other.type_name()),
        )),
    }
}

impl ActionHandler for HttpActionHandler {
    async fn handle(
        &self,
        params: &ContextMap,
        inputs: &ContextMap,
    ) -> Result<ContextMap, ActionError> {
        let url = match inputs.get("url") {
            Some(ContextValue::String(url)) => url.as_str(),
            _ => str_param(params, "url")?.ok_or_else(|| ActionError::MissingParam("url".into()))?,
        };
        let method_name = str_param(params, "method")?.unwrap_or("GET");
        let method: reqwest::Method = method_name
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| ActionError::invalid("method", format!("invalid HTTP method: {method_name}")))?;
        let fail_on_status = bool_param(params, "fail_on_status")?.unwrap_or(false);

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in header_params(params)? {
            request = request.header(name, value);
        }
        if method != reqwest::Method::GET {
            let mut body = inputs.clone();
            body.remove("url");
            request = request.json(&map_to_json(&body));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ActionError::Failed(format!("HTTP request to '{url}' failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ActionError::Failed(format!("failed to read HTTP response body: {e}")))?;

        tracing::info!(url, status = status.as_u16(), body_len = text.len(), "HTTP step completed");

        if fail_on_status && !status.is_success() {
            return Err(ActionError::Failed(format!(
                "HTTP {} from '{url}'",
                status.as_u16()
            )));
        }

        let data = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => ContextValue::from_json(json),
            Err(_) => ContextValue::String(text),
        };

        let mut result = ContextMap::new();
        result.insert("status".to_string(), ContextValue::Number(f64::from(status.as_u16())));
        result.insert("ok".to_string(), ContextValue::Bool(status.is_success()));
        result.insert("data".to_string(), data);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{addr}/hook"), handle)
    }

    fn handler() -> HttpActionHandler {
        HttpActionHandler::new(&HttpActionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let err = handler()
            .handle(&ContextMap::new(), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::MissingParam(ref p) if p == "url"));
    }

    #[tokio::test]
    async fn invalid_method_is_rejected() {
        let mut params = ContextMap::new();
        params.insert("url".to_string(), "http://127.0.0.1:1/".into());
        params.insert("method".to_string(), "NOT A METHOD".into());

        let err = handler().handle(&params, &ContextMap::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParam { ref name, .. } if name == "method"));
    }

    #[tokio::test]
    async fn non_string_header_is_rejected() {
        let mut headers = ContextMap::new();
        headers.insert("x-retries".to_string(), ContextValue::Number(3.0));
        let mut params = ContextMap::new();
        params.insert("url".to_string(), "http://127.0.0.1:1/".into());
        params.insert("headers".to_string(), ContextValue::Map(headers));

        let err = handler().handle(&params, &ContextMap::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParam { ref name, .. } if name == "headers"));
    }

    #[tokio::test]
    async fn get_returns_parsed_json() {
        let (url, server) = serve_once("200 OK", r#"{"greeting":"hi","count":2}"#).await;
        let mut params = ContextMap::new();
        params.insert("url".to_string(), url.into());

        let result = handler().handle(&params, &ContextMap::new()).await.unwrap();
        assert_eq!(result["status"], ContextValue::Number(200.0));
        assert_eq!(result["ok"], ContextValue::Bool(true));
        let data = result["data"].as_map().unwrap();
        assert_eq!(data["greeting"], ContextValue::from("hi"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /hook"));
        assert!(request.to_lowercase().contains("user-agent: flowline-workflow/0.1"));
    }

    #[tokio::test]
    async fn post_sends_inputs_as_json_and_url_input_overrides() {
        let (url, server) = serve_once("201 Created", "accepted").await;
        let mut params = ContextMap::new();
        params.insert("url".to_string(), "http://127.0.0.1:1/unused".into());
        params.insert("method".to_string(), "post".into());
        let mut inputs = ContextMap::new();
        inputs.insert("url".to_string(), url.into());
        inputs.insert("order_id".to_string(), "A-1".into());

        let result = handler().handle(&params, &inputs).await.unwrap();
        assert_eq!(result["status"], ContextValue::Number(201.0));
        assert_eq!(result["data"], ContextValue::from("accepted"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains(r#"{"order_id":"A-1"}"#));
    }

    #[tokio::test]
    async fn error_status_is_data_unless_fail_on_status() {
        let (url, _server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
        let mut params = ContextMap::new();
        params.insert("url".to_string(), url.into());
        let result = handler().handle(&params, &ContextMap::new()).await.unwrap();
        assert_eq!(result["ok"], ContextValue::Bool(false));
        assert_eq!(result["status"], ContextValue::Number(503.0));

        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let mut params = ContextMap::new();
        params.insert("url".to_string(), url.into());
        params.insert("fail_on_status".to_string(), ContextValue::Bool(true));
        let err = handler().handle(&params, &ContextMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
