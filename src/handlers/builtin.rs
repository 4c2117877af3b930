//! Built-in handlers for the shipped node-type catalog.
//!
//! All implementations are deterministic and local: nodes that stand for
//! external effects (HTTP, email, scraping, LLM calls) produce structured
//! simulated results instead of performing network I/O. Real integrations
//! plug in by registering their own [`NodeHandler`] over the same type id.
//!
//! Every handler returns a JSON object carrying the conventional `result`
//! key so default-handle connections extract something meaningful, plus the
//! named output ports of its type.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{HandlerError, HandlerInput, HandlerRegistry, NodeHandler};

use std::sync::Arc;

/// Register every built-in handler on `registry`.
pub fn register_builtin_handlers(registry: &mut HandlerRegistry) {
    for trigger_type in ["webhook_trigger", "schedule_trigger", "email_trigger"] {
        registry.register(
            trigger_type,
            Arc::new(TriggerHandler {
                trigger_type: trigger_type.to_string(),
            }),
        );
    }
    registry.register("ai_model", Arc::new(AiModelHandler));
    registry.register("text_analysis", Arc::new(TextAnalysisHandler));
    registry.register("data_transform", Arc::new(DataTransformHandler));
    registry.register("data_formatter", Arc::new(DataFormatterHandler));
    registry.register("data_logger", Arc::new(DataLoggerHandler));
    registry.register("http_request", Arc::new(HttpRequestHandler));
    registry.register("condition", Arc::new(ConditionHandler));
    registry.register("approval", Arc::new(ApprovalHandler));
    registry.register("notification", Arc::new(NotificationHandler));
    registry.register("email_sender", Arc::new(EmailSenderHandler));
    registry.register("url_input", Arc::new(UrlInputHandler));
    registry.register("web_scraper", Arc::new(WebScraperHandler));
}

/// Entry-point nodes. A trigger receives the run's initial input payload;
/// its result is that payload (config fallback) stamped with trigger
/// metadata.
struct TriggerHandler {
    trigger_type: String,
}

#[async_trait]
impl NodeHandler for TriggerHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let payload = input
            .inputs
            .get("payload")
            .or_else(|| input.config.get("payload"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({
            "result": {
                "trigger_type": self.trigger_type,
                "triggered_at": Utc::now().to_rfc3339(),
                "payload": payload.clone(),
            },
            "payload": payload,
        }))
    }
}

/// Simulated LLM call: echoes the prompt back tagged with the configured
/// provider and model, with a token count derived from the prompt length.
struct AiModelHandler;

#[async_trait]
impl NodeHandler for AiModelHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let prompt = input
            .inputs
            .get("prompt")
            .or_else(|| input.primary_input())
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| input.config_str("prompt").map(str::to_string))
            .ok_or(HandlerError::MissingInput { key: "prompt" })?;
        let provider = input.config_str_or("provider", "openai");
        let model = input.config_str_or("model", "gpt-4");
        let response = format!("[{provider}/{model}] processed: {prompt}");
        let tokens_used = prompt.split_whitespace().count() + response.split_whitespace().count();
        Ok(json!({
            "result": response.clone(),
            "response": response,
            "tokens_used": tokens_used,
        }))
    }
}

/// Deterministic text analysis: keyword extraction by word frequency and a
/// naive sentiment score from a small lexicon.
struct TextAnalysisHandler;

#[async_trait]
impl NodeHandler for TextAnalysisHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let text = input
            .inputs
            .get("text")
            .or_else(|| input.primary_input())
            .and_then(Value::as_str)
            .ok_or(HandlerError::MissingInput { key: "text" })?;
        let lower = text.to_lowercase();
        let positive = ["good", "great", "excellent", "love", "happy"];
        let negative = ["bad", "poor", "terrible", "hate", "sad"];
        let pos = positive.iter().filter(|w| lower.contains(*w)).count() as i64;
        let neg = negative.iter().filter(|w| lower.contains(*w)).count() as i64;
        let sentiment = if pos > neg {
            "positive"
        } else if neg > pos {
            "negative"
        } else {
            "neutral"
        };
        let mut keywords: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 4)
            .collect();
        keywords.sort_unstable();
        keywords.dedup();
        keywords.truncate(10);
        Ok(json!({
            "result": { "sentiment": sentiment, "keywords": keywords },
            "sentiment": { "label": sentiment, "positive_hits": pos, "negative_hits": neg },
            "keywords": keywords,
        }))
    }
}

/// Structural transforms over the incoming data. The configured expression is
/// treated as a field path for `filter`/`map`-style operations.
struct DataTransformHandler;

#[async_trait]
impl NodeHandler for DataTransformHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let data = input
            .inputs
            .get("data")
            .or_else(|| input.primary_input())
            .cloned()
            .ok_or(HandlerError::MissingInput { key: "data" })?;
        let operation = input.config_str_or("operation", "filter");
        let transformed = match operation {
            "sort" => match data {
                Value::Array(mut items) => {
                    items.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
                    Value::Array(items)
                }
                other => other,
            },
            "filter" | "map" => {
                let expression = input.config_str("expression").ok_or_else(|| {
                    HandlerError::InvalidConfig {
                        key: "expression",
                        message: "expression is required for this operation".to_string(),
                    }
                })?;
                apply_field_path(&data, expression)
            }
            "reduce" => match &data {
                Value::Array(items) => json!(items.len()),
                other => other.clone(),
            },
            _ => data,
        };
        Ok(json!({
            "result": transformed.clone(),
            "transformed_data": transformed,
            "operation": operation,
        }))
    }
}

/// Walk a dotted field path into a JSON value; missing segments yield null.
fn apply_field_path(data: &Value, path: &str) -> Value {
    let mut current = data;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Wraps the incoming summary data in the configured output format.
struct DataFormatterHandler;

#[async_trait]
impl NodeHandler for DataFormatterHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let data = input
            .inputs
            .get("summary_data")
            .or_else(|| input.primary_input())
            .cloned()
            .unwrap_or(Value::Null);
        let format = input.config_str_or("output_format", "structured");
        let include_metadata = input
            .config
            .get("include_metadata")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let body = match format {
            "plain_text" | "markdown" => json!(render_text(&data)),
            _ => data.clone(),
        };
        let mut output = json!({ "format": format, "body": body });
        if include_metadata {
            output["metadata"] = json!({ "formatted_at": Utc::now().to_rfc3339() });
        }
        Ok(json!({
            "result": output.clone(),
            "formatted_output": output,
        }))
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", render_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Emits the incoming data to the structured log and echoes it. Marked
/// non-critical in the catalog, so a failure here never fails the run.
struct DataLoggerHandler;

#[async_trait]
impl NodeHandler for DataLoggerHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let data = input.primary_input().cloned().unwrap_or(Value::Null);
        let destination = input.config_str_or("log_destination", "analytics_db");
        tracing::info!(
            node_id = %input.node_id,
            destination,
            payload = %data,
            "data logger record"
        );
        Ok(json!({
            "result": { "logged": true, "destination": destination },
            "logged": { "destination": destination, "at": Utc::now().to_rfc3339() },
        }))
    }
}

/// Simulated HTTP call: validates the URL shape and returns a synthetic
/// response without touching the network.
struct HttpRequestHandler;

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let url = input
            .inputs
            .get("url")
            .or_else(|| input.primary_input())
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| input.config_str("url").map(str::to_string))
            .ok_or(HandlerError::MissingInput { key: "url" })?;
        validate_url(&url)?;
        let method = input.config_str_or("method", "GET");
        let body = input.inputs.get("body").cloned().unwrap_or(Value::Null);
        let response = json!({
            "url": url,
            "method": method,
            "request_body": body,
            "simulated": true,
        });
        Ok(json!({
            "result": response.clone(),
            "response": response,
            "status_code": 200,
        }))
    }
}

/// Comparison against a configured value. The branch name ("true"/"false")
/// matches the condition type's output ports, so downstream connections can
/// route on it.
struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let value = input
            .inputs
            .get("value")
            .or_else(|| input.primary_input())
            .cloned()
            .ok_or(HandlerError::MissingInput { key: "value" })?;
        let operator = input.config_str_or("operator", "equals");
        let compare = input.config_str("compare_value").ok_or_else(|| {
            HandlerError::InvalidConfig {
                key: "compare_value",
                message: "compare_value is required".to_string(),
            }
        })?;
        let outcome = evaluate(&value, operator, compare)?;
        let branch = if outcome { "true" } else { "false" };
        let mut out = json!({
            "result": outcome,
            "branch": branch,
        });
        // Mirror the value onto the matching output port ("true"/"false").
        out[branch] = value;
        Ok(out)
    }
}

fn evaluate(value: &Value, operator: &str, compare: &str) -> Result<bool, HandlerError> {
    let value_str = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let outcome = match operator {
        "equals" => value_str == compare,
        "not_equals" => value_str != compare,
        "contains" => value_str.contains(compare),
        "starts_with" => value_str.starts_with(compare),
        "ends_with" => value_str.ends_with(compare),
        "greater_than" | "less_than" => {
            let left = value
                .as_f64()
                .or_else(|| value_str.parse().ok())
                .ok_or_else(|| HandlerError::Failed(format!(
                    "numeric comparison on non-numeric value: {value_str}"
                )))?;
            let right: f64 = compare.parse().map_err(|_| {
                HandlerError::InvalidConfig {
                    key: "compare_value",
                    message: format!("not a number: {compare}"),
                }
            })?;
            if operator == "greater_than" {
                left > right
            } else {
                left < right
            }
        }
        other => {
            return Err(HandlerError::InvalidConfig {
                key: "operator",
                message: format!("unknown operator: {other}"),
            })
        }
    };
    Ok(outcome)
}

/// Auto-approves. A real deployment replaces this with a handler that parks
/// the item for human review.
struct ApprovalHandler;

#[async_trait]
impl NodeHandler for ApprovalHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let item = input
            .inputs
            .get("item")
            .or_else(|| input.primary_input())
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({
            "result": { "approval_status": "approved", "item": item },
            "approval_status": "approved",
        }))
    }
}

/// Records the notification it would send. Non-critical in the catalog.
struct NotificationHandler;

#[async_trait]
impl NodeHandler for NotificationHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let message = input
            .inputs
            .get("message")
            .or_else(|| input.primary_input())
            .cloned()
            .unwrap_or(Value::Null);
        let channel = input.config_str_or("channel", "default");
        let notification_type = input.config_str_or("notification_type", "email");
        tracing::info!(node_id = %input.node_id, channel, notification_type, "notification queued");
        Ok(json!({
            "result": { "sent": true, "channel": channel, "type": notification_type },
            "notification_sent": true,
            "message": message,
        }))
    }
}

/// Simulated email dispatch: builds the message envelope and a synthetic
/// message id without sending anything.
struct EmailSenderHandler;

#[async_trait]
impl NodeHandler for EmailSenderHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let body = input
            .inputs
            .get("body")
            .or_else(|| input.primary_input())
            .cloned()
            .ok_or(HandlerError::MissingInput { key: "body" })?;
        let recipient = input
            .inputs
            .get("recipient")
            .and_then(Value::as_str)
            .unwrap_or("unknown@localhost");
        let from = input.config_str_or("from_address", "support@company.com");
        let message_id = format!("<{}@flowgrid>", uuid::Uuid::new_v4());
        Ok(json!({
            "result": {
                "message_id": message_id.clone(),
                "from": from,
                "to": recipient,
                "body": body,
            },
            "message_id": message_id,
            "delivery_status": "queued",
        }))
    }
}

/// Source node for scraping flows: validates the configured URL and passes
/// it downstream.
struct UrlInputHandler;

#[async_trait]
impl NodeHandler for UrlInputHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let url = input
            .config_str("url")
            .map(str::to_string)
            .ok_or_else(|| HandlerError::InvalidConfig {
                key: "url",
                message: "url is required".to_string(),
            })?;
        validate_url(&url)?;
        Ok(json!({
            "result": url.clone(),
            "url": url,
        }))
    }
}

/// Simulated page fetch: returns deterministic content derived from the URL.
struct WebScraperHandler;

#[async_trait]
impl NodeHandler for WebScraperHandler {
    async fn handle(&self, input: HandlerInput) -> Result<Value, HandlerError> {
        let url = input
            .inputs
            .get("target_url")
            .or_else(|| input.primary_input())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(HandlerError::MissingInput { key: "target_url" })?;
        validate_url(&url)?;
        let max_len = input
            .config
            .get("max_content_length")
            .and_then(Value::as_u64)
            .unwrap_or(10_000) as usize;
        let mut content = format!("Simulated page content for {url}");
        content.truncate(max_len);
        Ok(json!({
            "result": content.clone(),
            "content": content,
            "source_url": url,
            "metadata": { "fetched_at": Utc::now().to_rfc3339(), "simulated": true },
        }))
    }
}

fn validate_url(url: &str) -> Result<(), HandlerError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(HandlerError::InvalidConfig {
            key: "url",
            message: format!("not an http(s) url: {url}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn input_with(inputs: &[(&str, Value)], config: &[(&str, Value)]) -> HandlerInput {
        HandlerInput {
            node_id: "n".to_string(),
            config: config
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            inputs: inputs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn trigger_prefers_run_input_payload_over_config() {
        let handler = TriggerHandler {
            trigger_type: "webhook_trigger".to_string(),
        };
        let out = handler
            .handle(input_with(
                &[("payload", json!({"x": 1}))],
                &[("payload", json!({"x": 0}))],
            ))
            .await
            .unwrap();
        assert_eq!(out["payload"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn ai_model_requires_prompt() {
        let err = AiModelHandler
            .handle(input_with(&[], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::MissingInput { key: "prompt" }));
    }

    #[tokio::test]
    async fn ai_model_tags_provider_and_model() {
        let out = AiModelHandler
            .handle(input_with(
                &[("prompt", json!("summarize this"))],
                &[("provider", json!("anthropic")), ("model", json!("claude"))],
            ))
            .await
            .unwrap();
        let response = out["response"].as_str().unwrap();
        assert!(response.starts_with("[anthropic/claude]"));
        assert!(out["tokens_used"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn condition_numeric_comparison() {
        let out = ConditionHandler
            .handle(input_with(
                &[("value", json!(7))],
                &[("operator", json!("greater_than")), ("compare_value", json!("5"))],
            ))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(true));
        assert_eq!(out["branch"], json!("true"));
        assert_eq!(out["true"], json!(7));
    }

    #[tokio::test]
    async fn condition_unknown_operator_is_config_error() {
        let err = ConditionHandler
            .handle(input_with(
                &[("value", json!("x"))],
                &[("operator", json!("approximates")), ("compare_value", json!("x"))],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig { key: "operator", .. }));
    }

    #[tokio::test]
    async fn url_input_rejects_non_http_url() {
        let err = UrlInputHandler
            .handle(input_with(&[], &[("url", json!("ftp://example.com"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig { key: "url", .. }));
    }

    #[tokio::test]
    async fn transform_filter_walks_field_path() {
        let out = DataTransformHandler
            .handle(input_with(
                &[("data", json!({"a": {"b": 42}}))],
                &[("operation", json!("filter")), ("expression", json!("a.b"))],
            ))
            .await
            .unwrap();
        assert_eq!(out["transformed_data"], json!(42));
    }

    #[tokio::test]
    async fn scraper_truncates_to_configured_length() {
        let out = WebScraperHandler
            .handle(input_with(
                &[("target_url", json!("https://example.com"))],
                &[("max_content_length", json!(9))],
            ))
            .await
            .unwrap();
        assert_eq!(out["content"].as_str().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn builtin_registry_covers_catalog_types() {
        let registry = HandlerRegistry::with_builtin_handlers();
        for id in [
            "webhook_trigger",
            "schedule_trigger",
            "email_trigger",
            "ai_model",
            "text_analysis",
            "data_transform",
            "data_formatter",
            "data_logger",
            "http_request",
            "condition",
            "approval",
            "notification",
            "email_sender",
            "url_input",
            "web_scraper",
        ] {
            assert!(registry.has_handler(id), "missing handler for {id}");
        }
    }
}
