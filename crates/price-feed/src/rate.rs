//! stAPT exchange rate from the Amnis staking contract
//!
//! The rate is read through the Aptos fullnode `/view` endpoint and comes
//! back as a fixed-point integer with 8 decimals.

use serde_json::{json, Value};
use tracing::debug;

use amnis_core::{RateError, RateResult};

/// View function returning the stAPT/APT exchange rate
pub const STAPT_PRICE_FUNCTION: &str =
    "0x111ae3e5bc816a5e63c2da97d0aa3886519e0cd5e4b046659fa35796bd11542a::stapt_token::stapt_price";

const RATE_DECIMALS: i32 = 8;

/// Source of the derived/base exchange rate
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self) -> RateResult<f64>;
}

/// Calls the staking contract's view function over HTTP
pub struct ViewFunctionRate {
    client: reqwest::Client,
    view_url: String,
}

impl ViewFunctionRate {
    pub fn new(node_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            view_url: format!("{}/view", node_url.trim_end_matches('/')),
        }
    }

    pub fn view_url(&self) -> &str {
        &self.view_url
    }
}

#[async_trait::async_trait]
impl RateSource for ViewFunctionRate {
    async fn fetch_rate(&self) -> RateResult<f64> {
        let response = self
            .client
            .post(&self.view_url)
            .json(&view_payload())
            .send()
            .await
            .map_err(|e| RateError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RateError::Malformed(e.to_string()))?;

        let rate = parse_rate(&body)?;
        debug!(rate, "Fetched stAPT rate");
        Ok(rate)
    }
}

fn view_payload() -> Value {
    json!({
        "type": "entry_function_payload",
        "function": STAPT_PRICE_FUNCTION,
        "type_arguments": [],
        "arguments": []
    })
}

/// Decode a `/view` response whose first element is the rate scaled by 10^8
pub fn parse_rate(body: &Value) -> RateResult<f64> {
    let first = body
        .as_array()
        .ok_or_else(|| RateError::Malformed(format!("expected a JSON array, got {}", body)))?
        .first()
        .ok_or_else(|| RateError::Malformed("empty result array".to_string()))?;

    let raw: u128 = match first {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| RateError::InvalidNumber(format!("{:?}: {}", s, e)))?,
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| RateError::InvalidNumber(n.to_string()))?,
        other => {
            return Err(RateError::Malformed(format!("unexpected result element {}", other)))
        }
    };

    Ok(raw as f64 / 10f64.powi(RATE_DECIMALS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;

    #[test]
    fn test_parse_string_rate() {
        assert_eq!(parse_rate(&json!(["500000000"])).unwrap(), 5.0);
        assert_eq!(parse_rate(&json!(["102345678", "ignored"])).unwrap(), 1.02345678);
    }

    #[test]
    fn test_parse_numeric_rate() {
        assert_eq!(parse_rate(&json!([100000000])).unwrap(), 1.0);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(matches!(parse_rate(&json!([])), Err(RateError::Malformed(_))));
        assert!(matches!(parse_rate(&json!({"rate": "1"})), Err(RateError::Malformed(_))));
        assert!(matches!(parse_rate(&json!([true])), Err(RateError::Malformed(_))));
        assert!(matches!(parse_rate(&json!(["1.5"])), Err(RateError::InvalidNumber(_))));
        assert!(matches!(parse_rate(&json!([-3])), Err(RateError::InvalidNumber(_))));
    }

    #[test]
    fn test_view_url_trailing_slash() {
        let source = ViewFunctionRate::new("https://fullnode.example/v1/", reqwest::Client::new());
        assert_eq!(source.view_url(), "https://fullnode.example/v1/view");
    }

    #[tokio::test]
    async fn test_fetch_rate_posts_view_payload() {
        let base = serve(|path, body| {
            let request: Value = serde_json::from_str(body).unwrap_or(Value::Null);
            if path == "/view" && request["function"] == STAPT_PRICE_FUNCTION {
                (200, r#"["500000000"]"#.to_string())
            } else {
                (404, "{}".to_string())
            }
        })
        .await;

        let source = ViewFunctionRate::new(&base, reqwest::Client::new());
        assert_eq!(source.fetch_rate().await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_fetch_rate_server_error() {
        let base = serve(|_, _| (500, r#"{"message":"internal"}"#.to_string())).await;

        let source = ViewFunctionRate::new(&base, reqwest::Client::new());
        assert!(matches!(source.fetch_rate().await, Err(RateError::Status(500))));
    }

    #[tokio::test]
    async fn test_fetch_rate_unreachable_node() {
        // Nothing listens on port 9 locally
        let source = ViewFunctionRate::new("http://127.0.0.1:9", reqwest::Client::new());
        assert!(matches!(source.fetch_rate().await, Err(RateError::Http(_))));
    }
}
