use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use frontdesk_core::domain::message::SenderRole;
use frontdesk_core::domain::overrides::{resolve_effective, TemporaryOverride};
use frontdesk_core::errors::EngineError;
use frontdesk_core::phrases::TopicFilter;

use crate::language::detect_language;

/// Opaque inference capability. Prompt construction stays on this side of the
/// boundary; the client only completes.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(
        &self,
        system_context: &str,
        history: &[(SenderRole, String)],
        user_message: &str,
    ) -> Result<String, EngineError>;
}

/// Structured answer parsed from the inference output.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StructuredAnswer {
    pub content: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub escalate: bool,
    #[serde(default)]
    pub escalate_reason: Option<String>,
    #[serde(default)]
    pub extracted_data: BTreeMap<String, serde_json::Value>,
}

fn default_confidence() -> f32 {
    0.5
}

impl StructuredAnswer {
    /// Malformed or non-JSON output degrades to the raw text at neutral
    /// confidence rather than a hard failure.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw.trim()).unwrap_or_else(|_| Self {
            content: raw.trim().to_owned(),
            confidence: 0.5,
            intent: None,
            escalate: false,
            escalate_reason: None,
            extracted_data: BTreeMap::new(),
        })
    }
}

/// What the router should do with the answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponderDecision {
    Answer,
    Escalate { reason: String },
    Redirect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponderOutcome {
    pub content: String,
    pub confidence: f32,
    pub intent: Option<String>,
    pub decision: ResponderDecision,
}

pub struct ResponderAdapter {
    inference: std::sync::Arc<dyn InferenceClient>,
    confidence_threshold: f32,
    topic_filter: TopicFilter,
    standing_knowledge: String,
}

impl ResponderAdapter {
    pub fn new(
        inference: std::sync::Arc<dyn InferenceClient>,
        confidence_threshold: f32,
        topic_filter: TopicFilter,
        standing_knowledge: impl Into<String>,
    ) -> Self {
        Self {
            inference,
            confidence_threshold,
            topic_filter,
            standing_knowledge: standing_knowledge.into(),
        }
    }

    /// The effective override enters the system context with explicit
    /// priority over standing knowledge; keyword-triggered secondary
    /// overrides are appended as supporting notes.
    pub fn assemble_system_context(
        &self,
        overrides: &[TemporaryOverride],
        user_message: &str,
        now: DateTime<Utc>,
    ) -> String {
        let language = detect_language(user_message);
        let mut context = String::new();

        if let Some(effective) = resolve_effective(overrides, now) {
            context.push_str("CURRENT STATUS (overrides everything below): ");
            context.push_str(&effective.customer_text);
            context.push('\n');

            for row in overrides {
                if row.id != effective.id
                    && row.is_effective(now)
                    && row.triggered_by(user_message)
                {
                    context.push_str("Also note: ");
                    context.push_str(&row.customer_text);
                    context.push('\n');
                }
            }
        }

        context.push_str(&self.standing_knowledge);
        context.push('\n');
        context.push_str(language.response_instruction());
        context
    }

    /// Calls inference and applies the confidence policy. Escalation is
    /// signalled by either the threshold rule or the explicit flag; off-topic
    /// questions short-circuit to a redirect and never escalate.
    pub async fn answer(
        &self,
        overrides: &[TemporaryOverride],
        history: &[(SenderRole, String)],
        user_message: &str,
        now: DateTime<Utc>,
    ) -> Result<ResponderOutcome, EngineError> {
        let system_context = self.assemble_system_context(overrides, user_message, now);
        let raw = self.inference.infer(&system_context, history, user_message).await?;
        let answer = StructuredAnswer::parse(&raw);

        let wants_escalation = answer.confidence < self.confidence_threshold || answer.escalate;
        let decision = if wants_escalation {
            if self.topic_filter.is_on_topic(user_message) {
                ResponderDecision::Escalate {
                    reason: answer
                        .escalate_reason
                        .clone()
                        .unwrap_or_else(|| format!("confidence {:.2}", answer.confidence)),
                }
            } else {
                ResponderDecision::Redirect
            }
        } else {
            ResponderDecision::Answer
        };

        if !matches!(decision, ResponderDecision::Answer) {
            tracing::info!(
                event_name = "responder_policy",
                confidence = answer.confidence,
                escalate_flag = answer.escalate,
                decision = ?decision,
            );
        }

        Ok(ResponderOutcome {
            content: answer.content,
            confidence: answer.confidence,
            intent: answer.intent,
            decision,
        })
    }
}

/// Turns a manager's terse raw reply into a customer-facing sentence. The raw
/// text survives any inference failure.
pub async fn polish_manager_reply(
    inference: &dyn InferenceClient,
    customer_question: &str,
    raw_reply: &str,
) -> String {
    let system_context = format!(
        "Rephrase the manager's reply as one short, professional message to the \
         customer. Keep the meaning exactly. Customer asked: \"{customer_question}\""
    );
    match inference.infer(&system_context, &[], raw_reply).await {
        Ok(raw) => {
            let parsed = StructuredAnswer::parse(&raw);
            if parsed.content.trim().is_empty() {
                raw_reply.to_owned()
            } else {
                parsed.content
            }
        }
        Err(error) => {
            tracing::warn!(
                event_name = "polish_fallback",
                error = %error,
                "rephrasing failed, forwarding the raw manager reply"
            );
            raw_reply.to_owned()
        }
    }
}

/// Test double that replays a scripted sequence of raw inference outputs.
#[derive(Default)]
pub struct ScriptedInferenceClient {
    responses: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedInferenceClient {
    pub fn with_responses(responses: Vec<String>) -> Self {
        let mut queue = responses;
        queue.reverse();
        Self { responses: Mutex::new(queue), calls: Mutex::new(Vec::new()) }
    }

    pub async fn last_system_context(&self) -> Option<String> {
        self.calls.lock().await.last().cloned()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInferenceClient {
    async fn infer(
        &self,
        system_context: &str,
        _history: &[(SenderRole, String)],
        _user_message: &str,
    ) -> Result<String, EngineError> {
        self.calls.lock().await.push(system_context.to_owned());
        self.responses
            .lock()
            .await
            .pop()
            .ok_or_else(|| EngineError::Inference("no scripted response left".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use frontdesk_core::domain::overrides::{
        OverrideId, OverrideKind, OverridePriority, TemporaryOverride,
    };
    use frontdesk_core::phrases::TopicFilter;

    use super::{
        polish_manager_reply, ResponderAdapter, ResponderDecision, ScriptedInferenceClient,
        StructuredAnswer,
    };

    fn override_row(id: &str, customer_text: &str) -> TemporaryOverride {
        let now = Utc::now();
        TemporaryOverride {
            id: OverrideId(id.to_owned()),
            org_id: "org-1".to_owned(),
            kind: OverrideKind::Hours,
            priority: OverridePriority::Urgent,
            original_text: "closed today".to_owned(),
            customer_text: customer_text.to_owned(),
            keywords: vec!["open".to_owned()],
            created_by: "manager:dana".to_owned(),
            starts_at: now - Duration::hours(1),
            expires_at: now + Duration::hours(7),
            expire_on_reopen: true,
            active: true,
            created_at: now,
        }
    }

    fn adapter(responses: Vec<&str>) -> ResponderAdapter {
        ResponderAdapter::new(
            Arc::new(ScriptedInferenceClient::with_responses(
                responses.into_iter().map(str::to_owned).collect(),
            )),
            0.6,
            TopicFilter::default(),
            "We are a neighborhood restaurant.",
        )
    }

    #[test]
    fn malformed_inference_output_degrades_to_neutral_confidence() {
        let parsed = StructuredAnswer::parse("We open at 9am, see you soon!");
        assert_eq!(parsed.content, "We open at 9am, see you soon!");
        assert_eq!(parsed.confidence, 0.5);
        assert!(!parsed.escalate);
    }

    #[test]
    fn structured_output_parses_all_fields() {
        let parsed = StructuredAnswer::parse(
            r#"{"content": "We open at 9.", "confidence": 0.92, "intent": "hours_inquiry",
                "escalate": false, "extracted_data": {"day": "monday"}}"#,
        );
        assert_eq!(parsed.confidence, 0.92);
        assert_eq!(parsed.intent.as_deref(), Some("hours_inquiry"));
        assert_eq!(
            parsed.extracted_data.get("day"),
            Some(&serde_json::Value::String("monday".to_owned()))
        );
    }

    #[test]
    fn effective_override_text_appears_verbatim_with_priority() {
        let adapter = adapter(vec![]);
        let rows = vec![override_row("ov-1", "We are closed today for maintenance.")];

        let context = adapter.assemble_system_context(&rows, "are you open?", Utc::now());
        assert!(context.starts_with("CURRENT STATUS"));
        assert!(context.contains("We are closed today for maintenance."));
        assert!(context.contains("neighborhood restaurant"));
    }

    #[test]
    fn expired_override_leaves_no_trace_in_the_context() {
        let adapter = adapter(vec![]);
        let rows = vec![override_row("ov-1", "We are closed today for maintenance.")];

        let at_nine_hours = Utc::now() + Duration::hours(9);
        let context = adapter.assemble_system_context(&rows, "are you open?", at_nine_hours);
        assert!(!context.contains("CURRENT STATUS"));
        assert!(!context.contains("maintenance"));
    }

    #[tokio::test]
    async fn low_confidence_escalates_even_without_the_flag() {
        let adapter = adapter(vec![
            r#"{"content": "I think we might be open?", "confidence": 0.4, "escalate": false}"#,
        ]);

        let outcome =
            adapter.answer(&[], &[], "are you open on bank holidays?", Utc::now()).await.expect("answer");
        assert!(matches!(outcome.decision, ResponderDecision::Escalate { .. }));
    }

    #[tokio::test]
    async fn explicit_flag_escalates_despite_high_confidence() {
        let adapter = adapter(vec![
            r#"{"content": "Let me check on that.", "confidence": 0.95, "escalate": true,
                "escalate_reason": "refund request"}"#,
        ]);

        let outcome =
            adapter.answer(&[], &[], "can I get a refund for my booking?", Utc::now()).await.expect("answer");
        match outcome.decision {
            ResponderDecision::Escalate { reason } => assert_eq!(reason, "refund request"),
            other => panic!("expected escalation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn off_topic_low_confidence_redirects_instead_of_escalating() {
        let adapter = adapter(vec![
            r#"{"content": "I'm not sure.", "confidence": 0.2, "escalate": false}"#,
        ]);

        let outcome = adapter
            .answer(&[], &[], "what do you think about the stock market", Utc::now())
            .await
            .expect("answer");
        assert_eq!(outcome.decision, ResponderDecision::Redirect);
    }

    #[tokio::test]
    async fn confident_on_topic_answer_passes_through() {
        let adapter = adapter(vec![
            r#"{"content": "We open at 9am.", "confidence": 0.9, "escalate": false}"#,
        ]);

        let outcome =
            adapter.answer(&[], &[], "what time do you open?", Utc::now()).await.expect("answer");
        assert_eq!(outcome.decision, ResponderDecision::Answer);
        assert_eq!(outcome.content, "We open at 9am.");
    }

    #[tokio::test]
    async fn polishing_falls_back_to_the_raw_reply_on_inference_failure() {
        let empty = ScriptedInferenceClient::default();
        let polished = polish_manager_reply(&empty, "do you allow dogs?", "yes dogs fine").await;
        assert_eq!(polished, "yes dogs fine");
    }

    #[tokio::test]
    async fn polishing_uses_the_inference_content() {
        let scripted = ScriptedInferenceClient::with_responses(vec![
            r#"{"content": "Yes, dogs are very welcome!", "confidence": 0.9}"#.to_owned(),
        ]);
        let polished = polish_manager_reply(&scripted, "do you allow dogs?", "yes dogs fine").await;
        assert_eq!(polished, "Yes, dogs are very welcome!");
    }
}
