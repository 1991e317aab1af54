//! The judge model call boundary (spec.md §4.3, §6.3): a strict-JSON
//! prompt/response contract with defensive parsing, shared by the single-doc
//! and pairwise evaluators.

use acm_contracts::{AcmError, ErrorKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

/// One call to a judge model: a rendered prompt in, raw text out. The
/// evaluators own prompt construction and response parsing; this trait is
/// deliberately thin so a fake judge is trivial to write in tests.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    /// `temperature` and `timeout_seconds` are passed explicitly rather than
    /// stored on the client so a single client instance can serve both the
    /// single-doc (temperature 0.3) and combiner merge (§4.5, possibly
    /// different temperature) call sites.
    async fn call(
        &self,
        prompt: &str,
        temperature: f32,
        timeout_seconds: u64,
    ) -> Result<String, AcmError>;
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());

/// Extracts a JSON document from judge free-text output (spec.md §4.3 step
/// 1): prefer a fenced code block, else fall back to the first
/// `{`-to-matching-`}` span, else the raw text as-is.
pub fn extract_json(raw: &str) -> String {
    if let Some(captures) = CODE_FENCE.captures(raw) {
        if let Some(m) = captures.get(1) {
            return m.as_str().trim().to_string();
        }
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            return raw[start..=end].to_string();
        }
    }
    raw.trim().to_string()
}

/// Parses `raw` into `T`, retrying once through `retry_fn` with a stricter
/// schema-instruction prompt on failure, per spec.md §4.3 step 4. `retry_fn`
/// returns the judge's raw text for the retried call.
pub async fn parse_with_retry<T, F, Fut>(
    raw: &str,
    retry_fn: F,
) -> Result<T, AcmError>
where
    T: DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<String, AcmError>>,
{
    let extracted = extract_json(raw);
    match serde_json::from_str::<T>(&extracted) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let retried = retry_fn().await?;
            let extracted_retry = extract_json(&retried);
            serde_json::from_str::<T>(&extracted_retry).map_err(|second_error| {
                AcmError::new(
                    ErrorKind::ParseError,
                    format!(
                        "judge response failed schema validation twice: first={first_error}, \
                         after stricter-schema retry={second_error}"
                    ),
                )
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "Here is my answer:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn extracts_bare_json_span() {
        let raw = "sure, {\"a\": 1, \"b\": [1,2]} is my answer";
        assert_eq!(extract_json(raw), "{\"a\": 1, \"b\": [1,2]}");
    }

    #[test]
    fn falls_back_to_raw_text_when_no_braces() {
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Probe {
        value: i32,
    }

    #[tokio::test]
    async fn parse_with_retry_succeeds_on_first_pass() {
        let result: Result<Probe, _> = parse_with_retry("{\"value\": 7}", || async {
            unreachable!("retry should not be invoked")
        })
        .await;
        assert_eq!(result.unwrap(), Probe { value: 7 });
    }

    #[tokio::test]
    async fn parse_with_retry_recovers_on_second_pass() {
        let result: Result<Probe, _> =
            parse_with_retry("not json at all", || async { Ok("{\"value\": 9}".to_string()) })
                .await;
        assert_eq!(result.unwrap(), Probe { value: 9 });
    }

    #[tokio::test]
    async fn parse_with_retry_fails_after_two_bad_attempts() {
        let result: Result<Probe, _> =
            parse_with_retry("garbage", || async { Ok("still garbage".to_string()) }).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, ErrorKind::ParseError);
    }
}
