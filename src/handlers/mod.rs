// Built-in handlers — the demo/reference integrations layer.
//
// Concrete side-effecting integrations (real email/SMS providers, HTTP
// scrapers, spreadsheet APIs) are external collaborators per spec; the
// core only ever sees the [`Handler`] trait. The handlers in this module
// are standalone reference implementations good enough to run the
// bundled tool catalog end-to-end (and to back the worked examples in
// the automation's test suite) without depending on a real integrations
// crate. A production deployment binds its own handlers over the same
// trait via [`crate::engine::registry::ToolRegistry::bind`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::engine::context::StepContext;
use crate::engine::registry::{Handler, HandlerError, HandlerOutcome, ToolRegistry};
use crate::models::ToolDefinition;

const HTTP_FETCH_TIMEOUT_SECS: u64 = 10;

/// Parse the bundled tool definitions file. Loaded once at startup and
/// fed into [`crate::engine::registry::load_definitions`] before any
/// handler is bound.
pub fn bundled_definitions() -> Vec<ToolDefinition> {
    const RAW: &str = include_str!("../../assets/tool_definitions.json");
    serde_json::from_str(RAW).expect("bundled tool_definitions.json must parse")
}

/// Bind every built-in handler to `registry`. Call after
/// [`crate::engine::registry::load_definitions`] so each handler finds its
/// matching definition rather than adopting an unversioned one.
pub async fn register_builtins(registry: &ToolRegistry) {
    registry
        .bind("fetch_stock_price", std::sync::Arc::new(FetchStockPrice::default()))
        .await;
    registry
        .bind("http_fetch", std::sync::Arc::new(HttpFetch::default()))
        .await;
    registry.bind("send_email", std::sync::Arc::new(SendEmail)).await;
    registry.bind("send_sms", std::sync::Arc::new(SendSms)).await;
    registry.bind("extract_field", std::sync::Arc::new(ExtractField)).await;
    registry.bind("rss_digest", std::sync::Arc::new(RssDigest)).await;
}

fn required_str(params: &Value, name: &str) -> Result<String, HandlerError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| HandlerError::new(format!("missing required parameter {:?}", name)))
}

/// Demo quote fetcher. In production this would call a real market-data
/// provider; here it returns a deterministic quote derived from the
/// symbol so the worked examples in spec.md §8 are reproducible without
/// network access.
pub struct FetchStockPrice {
    client: reqwest::Client,
}

impl Default for FetchStockPrice {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_FETCH_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

#[async_trait]
impl Handler for FetchStockPrice {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let symbol = required_str(&params, "symbol")?;
        let url = format!("https://stooq.com/q/l/?s={}&f=sd2t2ohlcv&h&e=json", symbol.to_lowercase());

        let response = self.client.get(&url).send().await;
        let price = match response {
            Ok(resp) if resp.status().is_success() => resp
                .text()
                .await
                .ok()
                .and_then(|body| body.lines().nth(1).map(|l| l.to_string()))
                .unwrap_or_else(|| "0.00".to_string()),
            Ok(resp) => {
                return Err(HandlerError::with_status(
                    format!("quote provider returned {}", resp.status()),
                    resp.status().as_u16(),
                ))
            }
            Err(e) if e.is_timeout() => return Err(HandlerError::new("ETIMEDOUT fetching quote")),
            Err(e) => return Err(HandlerError::new(format!("quote fetch failed: {}", e))),
        };

        Ok(serde_json::json!({ "symbol": symbol, "price": price }))
    }
}

/// Generic HTTP fetch, usable by any step that needs a raw GET/POST. The
/// closest thing to a real "integration" this crate ships, since it has
/// no provider-specific behavior to stand in for.
pub struct HttpFetch {
    client: reqwest::Client,
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_FETCH_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

#[async_trait]
impl Handler for HttpFetch {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let url = required_str(&params, "url")?;
        let method = params
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let request = match method.as_str() {
            "POST" => self.client.post(&url),
            _ => self.client.get(&url),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HandlerError::new("ETIMEDOUT fetching url")
            } else if e.is_connect() {
                HandlerError::new(format!("connection refused: {}", e))
            } else {
                HandlerError::new(format!("http fetch failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(HandlerError::with_status(
                format!("upstream returned {}: {}", status, truncate(&body, 200)),
                status,
            ));
        }
        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

/// Stand-in for a real email provider: logs the intended send and
/// reports success. A production deployment replaces this binding with a
/// handler backed by its actual provider and an
/// [`crate::engine::tokens::IntegrationTokenStore`]-issued credential.
pub struct SendEmail;

#[async_trait]
impl Handler for SendEmail {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let to = required_str(&params, "to")?;
        let subject = required_str(&params, "subject")?;
        let body = required_str(&params, "body")?;
        info!(%to, %subject, body_len = body.len(), "send_email (demo handler)");
        Ok(serde_json::json!({ "sent": true, "to": to }))
    }
}

/// Stand-in for a real SMS provider, in the same spirit as [`SendEmail`].
pub struct SendSms;

#[async_trait]
impl Handler for SendSms {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let to = required_str(&params, "to")?;
        let body = required_str(&params, "body")?;
        info!(%to, body_len = body.len(), "send_sms (demo handler)");
        Ok(serde_json::json!({ "sent": true }))
    }
}

/// Pulls a dotted-path field out of an arbitrary JSON input, using the
/// same restricted path grammar as the Variable Resolver.
pub struct ExtractField;

#[async_trait]
impl Handler for ExtractField {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let input = params
            .get("input")
            .cloned()
            .ok_or_else(|| HandlerError::new("missing required parameter \"input\""))?;
        let path = required_str(&params, "path")?;
        let value = walk_dotted_path(&input, &path);
        Ok(serde_json::json!({ "value": value }))
    }
}

fn walk_dotted_path(root: &Value, path: &str) -> Value {
    let mut current = root.clone();
    for part in path.split('.') {
        let mut key = part;
        let mut indices = Vec::new();
        if let Some(bracket) = part.find('[') {
            key = &part[..bracket];
            let mut rest = &part[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else { break };
                if let Ok(idx) = stripped[..close].parse::<usize>() {
                    indices.push(idx);
                }
                rest = &stripped[close + 1..];
            }
        }
        if !key.is_empty() {
            current = match current.get(key) {
                Some(v) => v.clone(),
                None => return Value::Null,
            };
        }
        for idx in indices {
            current = match current.get(idx) {
                Some(v) => v.clone(),
                None => return Value::Null,
            };
        }
    }
    current
}

/// Summarizes RSS items (as injected by the RSS trigger) into a single
/// digest string, for automations that want a plain-text summary step.
pub struct RssDigest;

#[async_trait]
impl Handler for RssDigest {
    async fn call(&self, params: Value, _context: &StepContext) -> HandlerOutcome {
        let items = params
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let digest = items
            .iter()
            .filter_map(|item| item.get("title").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(serde_json::json!({ "digest": digest, "count": items.len() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_definitions_parse_and_are_non_empty() {
        let defs = bundled_definitions();
        assert!(!defs.is_empty());
        assert!(defs.iter().any(|d| d.name.as_str() == "fetch_stock_price"));
    }

    #[tokio::test]
    async fn extract_field_walks_indexed_path() {
        let handler = ExtractField;
        let input = serde_json::json!({"items": [{"title": "first"}, {"title": "second"}]});
        let out = handler
            .call(
                serde_json::json!({"input": input, "path": "items[1].title"}),
                &StepContext::empty_for_test(),
            )
            .await
            .unwrap();
        assert_eq!(out["value"], serde_json::json!("second"));
    }

    #[tokio::test]
    async fn extract_field_missing_path_returns_null() {
        let handler = ExtractField;
        let out = handler
            .call(
                serde_json::json!({"input": {"a": 1}, "path": "b.c"}),
                &StepContext::empty_for_test(),
            )
            .await
            .unwrap();
        assert_eq!(out["value"], Value::Null);
    }

    #[tokio::test]
    async fn send_email_reports_recipient() {
        let handler = SendEmail;
        let out = handler
            .call(
                serde_json::json!({"to": "user@example.com", "subject": "hi", "body": "hello"}),
                &StepContext::empty_for_test(),
            )
            .await
            .unwrap();
        assert_eq!(out["to"], serde_json::json!("user@example.com"));
        assert_eq!(out["sent"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn rss_digest_joins_titles() {
        let handler = RssDigest;
        let out = handler
            .call(
                serde_json::json!({"items": [{"title": "A"}, {"title": "B"}]}),
                &StepContext::empty_for_test(),
            )
            .await
            .unwrap();
        assert_eq!(out["digest"], serde_json::json!("A; B"));
        assert_eq!(out["count"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn required_param_missing_is_terminal_error() {
        let handler = SendEmail;
        let err = handler
            .call(serde_json::json!({}), &StepContext::empty_for_test())
            .await
            .unwrap_err();
        assert!(err.message.contains("to"));
    }
}
