//! Synthesis oracle client: dispatch, retry with backoff, and fenced
//! code-block extraction.
//!
//! The oracle is any OpenAI-compatible chat-completions endpoint. The network
//! transport sits behind the [`CodeOracle`] trait so the pipeline can be
//! exercised with a scripted oracle in tests.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::config::OracleConfig;
use crate::prompt::OracleRequest;

/// Failure modes of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleError {
    /// Network failure, timeout, or server-side error. Retryable.
    Unavailable(String),
    /// Request-rate quota exceeded. Retryable.
    RateLimited,
    /// The response violated the single-code-block contract or could not be
    /// decoded. Deterministic, never retried.
    MalformedResponse(String),
}

impl OracleError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OracleError::MalformedResponse(_))
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Unavailable(msg) => write!(f, "oracle unavailable: {}", msg),
            OracleError::RateLimited => write!(f, "oracle rate limited"),
            OracleError::MalformedResponse(msg) => write!(f, "malformed oracle response: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {}

/// One round-trip to a text-generation oracle.
#[async_trait]
pub trait CodeOracle: Send + Sync {
    /// Perform a single attempt and return the raw response text.
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Retry settings for retryable oracle failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

/// Ceiling on any single backoff delay, whatever the attempt count.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl RetryPolicy {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
        }
    }

    /// Exponential backoff: base * 2^attempt, capped at [`MAX_BACKOFF`].
    pub fn delay(&self, attempt: u32) -> Duration {
        // exponent clamp keeps the multiplication itself from overflowing
        let factor = 1u32 << attempt.min(20);
        self.backoff_base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Applies the retry policy and the single-code-block contract on top of a
/// raw [`CodeOracle`].
pub struct SynthesisClient<O> {
    oracle: O,
    policy: RetryPolicy,
}

impl<O: CodeOracle> SynthesisClient<O> {
    pub fn new(oracle: O, policy: RetryPolicy) -> Self {
        Self { oracle, policy }
    }

    /// Obtain the synthesized source for one rendered request.
    ///
    /// Unavailable and rate-limited attempts are retried with exponential
    /// backoff up to the attempt ceiling. A malformed response is surfaced
    /// immediately: retrying a deterministic prompt mismatch cannot fix it.
    pub async fn synthesize(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut attempt = 0u32;
        loop {
            match self.oracle.complete(request).await {
                Ok(text) => return extract_code_block(&text),
                Err(err) if err.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        "oracle attempt {}/{} failed ({}), retrying in {:?}",
                        attempt + 1,
                        self.policy.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Extract the content of exactly one fenced code block.
///
/// Zero blocks, more than one block, or an empty block all violate the
/// contract. Guessing (for example taking the first of several blocks) risks
/// writing the wrong content into a production file, so the call refuses
/// instead.
pub fn extract_code_block(text: &str) -> Result<String, OracleError> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\n(.*?)```").expect("valid fence pattern")
    });
    let mut blocks = fence.captures_iter(text);
    let first = match blocks.next() {
        Some(capture) => capture[1].trim().to_string(),
        None => {
            return Err(OracleError::MalformedResponse(
                "no fenced code block in response".to_string(),
            ))
        }
    };
    if blocks.next().is_some() {
        return Err(OracleError::MalformedResponse(
            "more than one fenced code block in response".to_string(),
        ));
    }
    if first.is_empty() {
        return Err(OracleError::MalformedResponse(
            "fenced code block is empty".to_string(),
        ));
    }
    Ok(first)
}

/// HTTP client for an OpenAI-compatible chat-completions oracle.
pub struct HttpOracleClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpOracleClient {
    /// Build the client, reading the API key from the configured environment
    /// variable. The per-attempt timeout rides on the underlying HTTP client.
    pub fn from_config(config: &OracleConfig) -> Result<Self, String> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| format!("{} not set in environment", config.api_key_env))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| format!("failed to build http client: {}", e))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl CodeOracle for HttpOracleClient {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Unavailable("request timed out".to_string())
                } else {
                    OracleError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            return Err(OracleError::Unavailable(format!(
                "oracle returned status {}",
                status
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("decoding response: {}", e)))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                OracleError::MalformedResponse("response contained no choices".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Oracle returning a scripted sequence of results, one per attempt.
    struct ScriptedOracle {
        script: Mutex<Vec<Result<String, OracleError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Result<String, OracleError>>) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CodeOracle for ScriptedOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("scripted oracle exhausted")
        }
    }

    fn request() -> OracleRequest {
        OracleRequest {
            system: "system".to_string(),
            user: "user".to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_extract_single_block() {
        let text = "Here you go:\n```java\npublic class A {}\n```\n";
        assert_eq!(extract_code_block(text).unwrap(), "public class A {}");
    }

    #[test]
    fn test_extract_block_without_language_tag() {
        let text = "```\nSELECT 1;\n```";
        assert_eq!(extract_code_block(text).unwrap(), "SELECT 1;");
    }

    #[test]
    fn test_extract_rejects_zero_blocks() {
        let err = extract_code_block("no code here").unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[test]
    fn test_extract_rejects_two_blocks() {
        let text = "```java\nclass A {}\n```\nand also\n```java\nclass B {}\n```";
        let err = extract_code_block(text).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[test]
    fn test_extract_rejects_empty_block() {
        let err = extract_code_block("```java\n\n```").unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 64,
            backoff_base: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(10), Duration::from_secs(60));
        // late attempts stay at the ceiling instead of overflowing
        assert_eq!(policy.delay(40), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_unavailable_then_succeeds() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Unavailable("connection refused".to_string())),
            Err(OracleError::RateLimited),
            Ok("```java\nclass A {}\n```".to_string()),
        ]);
        let client = SynthesisClient::new(oracle, fast_policy());
        let code = client.synthesize(&request()).await.unwrap();
        assert_eq!(code, "class A {}");
    }

    #[tokio::test]
    async fn test_attempt_ceiling_respected() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Unavailable("down".to_string())),
            Err(OracleError::Unavailable("down".to_string())),
            Err(OracleError::Unavailable("down".to_string())),
        ]);
        let client = SynthesisClient::new(oracle, fast_policy());
        let err = client.synthesize(&request()).await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        // a second attempt would panic the scripted oracle
        let oracle = ScriptedOracle::new(vec![Ok("no fence at all".to_string())]);
        let client = SynthesisClient::new(oracle, fast_policy());
        let err = client.synthesize(&request()).await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_single_attempt_on_success() {
        let oracle = ScriptedOracle::new(vec![Ok("```java\nclass A {}\n```".to_string())]);
        let client = SynthesisClient::new(oracle, fast_policy());
        client.synthesize(&request()).await.unwrap();
        assert_eq!(client.oracle.calls(), 1);
    }
}
