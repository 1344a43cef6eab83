use std::sync::Arc;
use std::time::Duration;

use deckgen_core::config::RetryConfig;
use deckgen_core::outline::{Outline, OutlineError};
use thiserror::Error;
use tokio::time::Instant;

use crate::llm::{ChatClient, ChatError, ChatMessage, ChatRequest};

/// Output contract for the generation endpoint: a bare JSON array of five
/// `{title, bullets}` objects, nothing else. Enforced by prompt, verified
/// by parsing.
pub const SYSTEM_PROMPT: &str = "\
You are an expert at producing B2B presentation material.
## Hard rules
- Output JSON ONLY. No explanation or code fences before or after.
- Each object has exactly the keys \"title\" and \"bullets\".
- \"bullets\" is always an array of strings.
Produce exactly 5 slides in this format:
[
  { \"title\": \"Title 1\", \"bullets\": [\"Point A\", \"Point B\"] },
  ...
]";

/// Theme, audience, and goal for one outline request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineBrief {
    pub theme: String,
    pub audience: String,
    pub goal: String,
}

impl Default for OutlineBrief {
    fn default() -> Self {
        Self {
            theme: "A Dubai trip for a Japanese couple".to_string(),
            audience: "Travel agency sales representatives".to_string(),
            goal: "Introduce 5 popular sights and activities, \
                   summarizing each slide in 3 bullet points"
                .to_string(),
        }
    }
}

impl OutlineBrief {
    pub fn user_prompt(&self) -> String {
        format!("Theme: {} Audience: {} Goal: {}", self.theme, self.audience, self.goal)
    }
}

/// Exponential backoff schedule: delays of base, 2*base, 4*base, ... are
/// spent until the next delay would overrun the elapsed budget, at which
/// point the generator gives up. Disabled means a single attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub base_delay: Duration,
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { enabled: true, base_delay: Duration::from_secs(1), budget: Duration::from_secs(300) }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            base_delay: Duration::from_secs(config.base_delay_secs),
            budget: Duration::from_secs(config.budget_secs),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // attempt is 1-based; cap the exponent so the shift cannot overflow.
        let exponent = (attempt - 1).min(30);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("outline generation exhausted its {budget_secs}s retry budget after {attempts} attempts")]
    BudgetExhausted {
        attempts: u32,
        budget_secs: u64,
        #[source]
        last: ChatError,
    },
    #[error("generation endpoint broke the outline contract: {0}")]
    Contract(#[from] OutlineError),
    #[error(transparent)]
    Chat(ChatError),
}

/// Produces slide outlines through an injected chat client.
///
/// The client is constructed once at bootstrap and shared; the generator
/// itself keeps no state between calls beyond the per-call attempt count.
pub struct OutlineGenerator {
    client: Arc<dyn ChatClient>,
    retry: RetryPolicy,
    max_completion_tokens: u32,
}

impl OutlineGenerator {
    pub fn new(client: Arc<dyn ChatClient>, retry: RetryPolicy) -> Self {
        Self { client, retry, max_completion_tokens: 400 }
    }

    pub fn with_max_completion_tokens(mut self, max_completion_tokens: u32) -> Self {
        self.max_completion_tokens = max_completion_tokens;
        self
    }

    /// Ask the endpoint for an outline and parse the reply.
    ///
    /// Transient transport faults are retried under the policy budget; a
    /// reply that is not the contracted JSON array fails immediately.
    pub async fn generate(&self, brief: &OutlineBrief) -> Result<Outline, GenerateError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(brief.user_prompt()),
        ])
        .with_max_completion_tokens(self.max_completion_tokens);

        let reply = self.complete_with_retry(&request).await?;
        let outline = Outline::from_reply(&reply)?;

        tracing::info!(
            event_name = "agent.outline.generated",
            slide_count = outline.len(),
            "outline generated"
        );
        Ok(outline)
    }

    async fn complete_with_retry(&self, request: &ChatRequest) -> Result<String, GenerateError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.client.complete(request).await {
                Ok(reply) => return Ok(reply),
                Err(error) if self.retry.enabled && error.is_transient() => {
                    let delay = self.retry.delay_for_attempt(attempts);
                    if started.elapsed() + delay > self.retry.budget {
                        return Err(GenerateError::BudgetExhausted {
                            attempts,
                            budget_secs: self.retry.budget.as_secs(),
                            last: error,
                        });
                    }
                    tracing::warn!(
                        event_name = "agent.outline.transient_fault",
                        attempt = attempts,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "transient generation fault, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(GenerateError::Chat(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::{GenerateError, OutlineBrief, OutlineGenerator, RetryPolicy};
    use crate::llm::{ChatClient, ChatError, ChatRequest};

    const VALID_REPLY: &str = r#"[
        {"title": "Dubai Overview", "bullets": []},
        {"title": "Burj Khalifa", "bullets": ["Tallest building", "Observation deck", "Evening light show"]}
    ]"#;

    /// Replays a fixed script of outcomes, then repeats the last entry.
    struct ScriptedClient {
        script: Mutex<Vec<Result<String, ChatError>>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<String, ChatError>>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script), calls: AtomicU32::new(0) })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().expect("script lock");
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn policy(budget_secs: u64) -> RetryPolicy {
        RetryPolicy {
            enabled: true,
            base_delay: Duration::from_secs(1),
            budget: Duration::from_secs(budget_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_faults_within_budget() {
        let client = ScriptedClient::new(vec![
            Err(ChatError::Timeout),
            Err(ChatError::RateLimited),
            Ok(VALID_REPLY.to_string()),
        ]);
        let generator = OutlineGenerator::new(client.clone(), policy(300));

        let started = Instant::now();
        let outline = generator
            .generate(&OutlineBrief::default())
            .await
            .expect("third attempt succeeds");

        assert_eq!(outline.len(), 2);
        assert_eq!(client.calls(), 3);
        // Delays of 1s then 2s: doubling, and comfortably inside the budget.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_once_budget_is_exhausted() {
        let client = ScriptedClient::new(vec![Err(ChatError::Timeout)]);
        let generator = OutlineGenerator::new(client.clone(), policy(300));

        let started = Instant::now();
        let error = generator
            .generate(&OutlineBrief::default())
            .await
            .expect_err("endpoint never recovers");

        // 1+2+4+...+128 = 255s spent; the next 256s delay would overrun.
        assert!(matches!(
            error,
            GenerateError::BudgetExhausted { attempts: 9, budget_secs: 300, .. }
        ));
        assert_eq!(client.calls(), 9);
        assert!(started.elapsed() <= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_are_non_decreasing() {
        let client = ScriptedClient::new(vec![
            Err(ChatError::Timeout),
            Err(ChatError::Timeout),
            Err(ChatError::Timeout),
            Ok(VALID_REPLY.to_string()),
        ]);
        let generator = OutlineGenerator::new(client.clone(), policy(300));

        let started = Instant::now();
        generator.generate(&OutlineBrief::default()).await.expect("fourth attempt succeeds");

        // 1 + 2 + 4 seconds: strictly doubling schedule.
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn contract_violation_is_never_retried() {
        let client = ScriptedClient::new(vec![Ok("this is not JSON".to_string())]);
        let generator = OutlineGenerator::new(client.clone(), policy(300));

        let error = generator
            .generate(&OutlineBrief::default())
            .await
            .expect_err("unparseable reply is fatal");

        assert!(matches!(error, GenerateError::Contract(_)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn fatal_api_errors_are_not_retried() {
        let client = ScriptedClient::new(vec![Err(ChatError::Api {
            status: 401,
            message: "bad key".to_string(),
        })]);
        let generator = OutlineGenerator::new(client.clone(), policy(300));

        let error =
            generator.generate(&OutlineBrief::default()).await.expect_err("auth failure is fatal");

        assert!(matches!(error, GenerateError::Chat(ChatError::Api { status: 401, .. })));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_retry_fails_on_first_transient_fault() {
        let client = ScriptedClient::new(vec![Err(ChatError::Timeout)]);
        let generator = OutlineGenerator::new(client.clone(), RetryPolicy::disabled());

        let error = generator
            .generate(&OutlineBrief::default())
            .await
            .expect_err("single attempt only");

        assert!(matches!(error, GenerateError::Chat(ChatError::Timeout)));
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn brief_prompt_mentions_all_three_parts() {
        let brief = OutlineBrief {
            theme: "a theme".into(),
            audience: "an audience".into(),
            goal: "a goal".into(),
        };
        let prompt = brief.user_prompt();
        assert!(prompt.contains("a theme"));
        assert!(prompt.contains("an audience"));
        assert!(prompt.contains("a goal"));
    }
}
