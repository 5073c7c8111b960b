//! Audit pipeline: runs one inbound event through every gate.
//!
//! Flow (stops at the first gate that fails):
//! 1. Scope filter
//! 2. Image extraction (stickers abort, GIFs dropped)
//! 3. Sampling
//! 4. Rule presence
//! 5. Vision classification (errors fail open)
//! 6. Enforcement on violation
//!
//! Nothing here ever replies into the chat. Every stop is observable only
//! through logs and the returned `AuditOutcome`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::classifier::{ModerationRule, Verdict, VerdictClassifier};
use crate::config::GuardConfig;
use crate::error::ClassifierError;
use crate::event::MessageEvent;
use crate::pipeline::enforcer::{Enforcement, PenaltyEnforcer};
use crate::pipeline::extract::{Extraction, extract_images};
use crate::pipeline::sampler::{RandomSampler, Sampler};
use crate::pipeline::scope::in_scope;

/// Where processing of one event ended.
#[derive(Debug)]
pub enum AuditOutcome {
    OutOfScope,
    Sticker,
    NoImages,
    NotSampled,
    NoRules,
    /// The classifier could not be reached; the event is treated as clean.
    ClassifierFailed(ClassifierError),
    Clean(Verdict),
    Violation {
        verdict: Verdict,
        /// `None` when the backend offers no way to act on the event.
        enforcement: Option<Enforcement>,
    },
}

impl AuditOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutOfScope => "out_of_scope",
            Self::Sticker => "sticker",
            Self::NoImages => "no_images",
            Self::NotSampled => "not_sampled",
            Self::NoRules => "no_rules",
            Self::ClassifierFailed(_) => "classifier_failed",
            Self::Clean(_) => "clean",
            Self::Violation { .. } => "violation",
        }
    }
}

/// Image moderation pipeline.
#[derive(Clone)]
pub struct AuditPipeline {
    config: Arc<GuardConfig>,
    classifier: VerdictClassifier,
    enforcer: PenaltyEnforcer,
    sampler: Arc<dyn Sampler>,
}

impl AuditPipeline {
    pub fn new(config: Arc<GuardConfig>, classifier: VerdictClassifier) -> Self {
        Self {
            enforcer: PenaltyEnforcer::new(Arc::clone(&config)),
            config,
            classifier,
            sampler: Arc::new(RandomSampler),
        }
    }

    /// Replace the random sampler (deterministic draws in tests).
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Process a single inbound event.
    pub async fn process(&self, event: &MessageEvent) -> AuditOutcome {
        let config = &self.config;
        let is_group = event.is_group();

        // Step 1: scope
        if !in_scope(
            is_group,
            event.group_id_or_empty(),
            &event.sender_id,
            &config.group_scope,
            &config.private_scope,
        ) {
            return AuditOutcome::OutOfScope;
        }

        // Step 2: images
        let images = match extract_images(event.raw_segment_list(), &event.segments) {
            Extraction::Sticker => {
                debug!(sender = %event.sender_id, "Sticker message, skipping audit");
                return AuditOutcome::Sticker;
            }
            Extraction::Images(images) if images.is_empty() => return AuditOutcome::NoImages,
            Extraction::Images(images) => images,
        };

        // Step 3: sampling
        if !self.sampler.should_audit(config.check_probability) {
            debug!(
                sender = %event.sender_id,
                probability = config.check_probability,
                "Event not sampled for audit"
            );
            return AuditOutcome::NotSampled;
        }

        // Step 4: rules
        let rule = ModerationRule::from_config(config);
        if rule.is_empty() {
            debug!("No forbidden texts or descriptions configured, skipping audit");
            return AuditOutcome::NoRules;
        }

        // Step 5: classify (fail open)
        let verdict = match self.classifier.classify(&rule, &images).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(
                    group_id = event.group_id_or_empty(),
                    sender = %event.sender_id,
                    error = %e,
                    "Image audit failed, treating as clean"
                );
                return AuditOutcome::ClassifierFailed(e);
            }
        };

        if !verdict.is_violation {
            debug!(
                sender = %event.sender_id,
                images = images.len(),
                reason = %verdict.reason,
                "Images passed audit"
            );
            return AuditOutcome::Clean(verdict);
        }

        // Step 6: enforce
        info!(
            group_id = event.group_id_or_empty(),
            sender = %event.sender_id,
            reason = %verdict.reason,
            "Violation detected"
        );
        let evidence = &images[0];
        let enforcement = self.enforcer.enforce(event, evidence, &verdict.reason).await;
        match &enforcement {
            Some(enforcement) => log_enforcement(event, enforcement),
            None => debug!(
                sender = %event.sender_id,
                "No action invoker on event, enforcement unavailable"
            ),
        }

        AuditOutcome::Violation {
            verdict,
            enforcement,
        }
    }
}

fn log_enforcement(event: &MessageEvent, enforcement: &Enforcement) {
    if let Some(e) = enforcement.recall.error() {
        warn!(message_id = ?event.message_id(), error = %e, "Recall failed");
    }
    if let Some(e) = enforcement.ban.error() {
        warn!(
            group_id = event.group_id_or_empty(),
            user_id = %event.sender_id,
            error = %e,
            "Mute failed"
        );
    }
    if let Some(e) = enforcement.report.error() {
        error!(error = %e, "Evidence report failed");
    }

    let receipt = enforcement.receipt();
    info!(
        sender = %event.sender_id,
        recalled = receipt.recalled,
        banned = receipt.banned,
        report_sent = receipt.report_sent,
        "Enforcement complete"
    );
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use super::*;
    use crate::classifier::ClassifierTransport;
    use crate::error::ActionError;
    use crate::event::{ActionInvoker, MessageSegment};
    use crate::pipeline::enforcer::{
        ACTION_DELETE_MSG, ACTION_SEND_PRIVATE_MSG, ACTION_SET_GROUP_BAN,
    };
    use crate::pipeline::sampler::FixedSampler;

    /// Transport returning a fixed response, recording the URLs it saw.
    struct MockVision {
        response: Option<String>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl MockVision {
        fn replying(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn down() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        async fn call_count(&self) -> usize {
            self.seen.lock().await.len()
        }
    }

    #[async_trait]
    impl ClassifierTransport for MockVision {
        fn name(&self) -> &str {
            "mock-vision"
        }

        async fn complete(
            &self,
            _prompt: &str,
            image_urls: &[String],
        ) -> Result<String, ClassifierError> {
            self.seen.lock().await.push(image_urls.to_vec());
            self.response
                .clone()
                .ok_or_else(|| ClassifierError::HttpStatus {
                    transport: "mock-vision".into(),
                    status: 503,
                    body: "overloaded".into(),
                })
        }
    }

    #[derive(Default)]
    struct RecordingInvoker {
        fail: Option<&'static str>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ActionInvoker for RecordingInvoker {
        async fn call_action(&self, action: &str, params: Value) -> Result<Value, ActionError> {
            self.calls.lock().await.push((action.to_string(), params));
            if self.fail.is_some_and(|f| f == action) {
                return Err(ActionError::RequestFailed {
                    action: action.to_string(),
                    reason: "timeout".into(),
                });
            }
            Ok(json!({}))
        }
    }

    fn config() -> GuardConfig {
        GuardConfig {
            sensitive_texts: vec!["加群".into()],
            forbidden_descriptions: vec!["nudity".into()],
            ban_duration: 1800,
            report_target_id: Some("99".into()),
            ..GuardConfig::default()
        }
    }

    fn pipeline(config: GuardConfig, vision: Arc<MockVision>) -> AuditPipeline {
        let classifier = VerdictClassifier::new(Some(vision as Arc<dyn ClassifierTransport>));
        AuditPipeline::new(Arc::new(config), classifier)
            .with_sampler(Arc::new(FixedSampler(0.0)))
    }

    fn group_event(segments: Vec<MessageSegment>, invoker: Arc<RecordingInvoker>) -> MessageEvent {
        MessageEvent::new(Some("2001".into()), "3001", "mallory", segments)
            .with_message_id("777")
            .with_invoker(invoker)
    }

    fn png_and_gif() -> Vec<MessageSegment> {
        vec![
            MessageSegment::image("https://cdn.example.com/a.png"),
            MessageSegment::image("https://cdn.example.com/b.gif"),
        ]
    }

    #[tokio::test]
    async fn end_to_end_violation() {
        let vision = MockVision::replying("REASON: nudity\nRESULT: VIOLATION");
        let invoker = Arc::new(RecordingInvoker::default());
        let pipeline = pipeline(config(), vision.clone());

        let outcome = pipeline
            .process(&group_event(png_and_gif(), invoker.clone()))
            .await;

        let AuditOutcome::Violation {
            verdict,
            enforcement,
        } = outcome
        else {
            panic!("Expected violation");
        };
        assert_eq!(verdict.reason, "nudity");
        let receipt = enforcement.unwrap().receipt();
        assert!(receipt.recalled && receipt.banned && receipt.report_sent);

        // Only the png reached the classifier.
        assert_eq!(
            vision.seen.lock().await.clone(),
            vec![vec!["https://cdn.example.com/a.png".to_string()]]
        );

        let calls = invoker.calls.lock().await.clone();
        let actions: Vec<&str> = calls.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(
            actions,
            vec![ACTION_DELETE_MSG, ACTION_SET_GROUP_BAN, ACTION_SEND_PRIVATE_MSG]
        );
        assert_eq!(calls[1].1["duration"], 1800);
        let report = &calls[2].1;
        assert_eq!(report["user_id"], 99);
        let text = report["message"][0]["data"]["text"].as_str().unwrap();
        assert!(text.contains("理由: nudity"));
        assert!(text.contains("撤回:✅ 禁言:✅"));
        assert_eq!(
            report["message"][1]["data"]["file"],
            "https://cdn.example.com/a.png"
        );
    }

    #[tokio::test]
    async fn end_to_end_status_reflects_failed_ban() {
        let vision = MockVision::replying("REASON: nudity\nRESULT: VIOLATION");
        let invoker = Arc::new(RecordingInvoker {
            fail: Some(ACTION_SET_GROUP_BAN),
            ..Default::default()
        });
        let pipeline = pipeline(config(), vision);

        let outcome = pipeline
            .process(&group_event(png_and_gif(), invoker.clone()))
            .await;
        assert_eq!(outcome.label(), "violation");

        let calls = invoker.calls.lock().await.clone();
        let text = calls[2].1["message"][0]["data"]["text"].as_str().unwrap().to_string();
        assert!(text.contains("撤回:✅ 禁言:❌"));
    }

    #[tokio::test]
    async fn clean_verdict_takes_no_action() {
        let vision = MockVision::replying("REASON: cat photo\nRESULT: SAFE");
        let invoker = Arc::new(RecordingInvoker::default());
        let outcome = pipeline(config(), vision)
            .process(&group_event(png_and_gif(), invoker.clone()))
            .await;
        assert!(matches!(outcome, AuditOutcome::Clean(_)));
        assert!(invoker.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_scope_group_is_ignored() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let config = GuardConfig {
            group_scope: vec!["1".into()],
            ..config()
        };
        let invoker = Arc::new(RecordingInvoker::default());
        let outcome = pipeline(config, vision.clone())
            .process(&group_event(png_and_gif(), invoker))
            .await;
        assert!(matches!(outcome, AuditOutcome::OutOfScope));
        assert_eq!(vision.call_count().await, 0);
    }

    #[tokio::test]
    async fn private_chat_out_of_scope_by_default() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let event = MessageEvent::new(None, "3001", "mallory", png_and_gif());
        let outcome = pipeline(config(), vision).process(&event).await;
        assert!(matches!(outcome, AuditOutcome::OutOfScope));
    }

    #[tokio::test]
    async fn sticker_aborts_before_classification() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let invoker = Arc::new(RecordingInvoker::default());
        let event = group_event(png_and_gif(), invoker).with_raw_segments(json!([
            {"type": "image", "data": {"url": "https://cdn.example.com/a.png", "sub_type": 1}}
        ]));
        let outcome = pipeline(config(), vision.clone()).process(&event).await;
        assert!(matches!(outcome, AuditOutcome::Sticker));
        assert_eq!(vision.call_count().await, 0);
    }

    #[tokio::test]
    async fn only_gifs_means_no_images() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let invoker = Arc::new(RecordingInvoker::default());
        let event = group_event(
            vec![
                MessageSegment::Other,
                MessageSegment::image("https://x/y.gif"),
            ],
            invoker,
        );
        let outcome = pipeline(config(), vision).process(&event).await;
        assert!(matches!(outcome, AuditOutcome::NoImages));
    }

    #[tokio::test]
    async fn unsampled_event_is_skipped() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let config = GuardConfig {
            check_probability: 0.2,
            ..config()
        };
        let invoker = Arc::new(RecordingInvoker::default());
        let pipeline = pipeline(config, vision.clone()).with_sampler(Arc::new(FixedSampler(0.5)));
        let outcome = pipeline.process(&group_event(png_and_gif(), invoker)).await;
        assert!(matches!(outcome, AuditOutcome::NotSampled));
        assert_eq!(vision.call_count().await, 0);
    }

    #[tokio::test]
    async fn missing_rules_skip_audit() {
        let vision = MockVision::replying("RESULT: VIOLATION");
        let config = GuardConfig {
            sensitive_texts: vec![],
            forbidden_descriptions: vec![],
            ..config()
        };
        let invoker = Arc::new(RecordingInvoker::default());
        let outcome = pipeline(config, vision.clone())
            .process(&group_event(png_and_gif(), invoker))
            .await;
        assert!(matches!(outcome, AuditOutcome::NoRules));
        assert_eq!(vision.call_count().await, 0);
    }

    #[tokio::test]
    async fn classifier_outage_fails_open() {
        let vision = MockVision::down();
        let invoker = Arc::new(RecordingInvoker::default());
        let outcome = pipeline(config(), vision)
            .process(&group_event(png_and_gif(), invoker.clone()))
            .await;
        assert!(matches!(
            outcome,
            AuditOutcome::ClassifierFailed(ClassifierError::HttpStatus { status: 503, .. })
        ));
        assert!(invoker.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unavailable_classifier_fails_open() {
        let pipeline = AuditPipeline::new(Arc::new(config()), VerdictClassifier::new(None))
            .with_sampler(Arc::new(FixedSampler(0.0)));
        let invoker = Arc::new(RecordingInvoker::default());
        let outcome = pipeline.process(&group_event(png_and_gif(), invoker)).await;
        assert!(matches!(
            outcome,
            AuditOutcome::ClassifierFailed(ClassifierError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn violation_without_invoker_is_recorded_without_enforcement() {
        let vision = MockVision::replying("REASON: ad\nRESULT: VIOLATION");
        let event = MessageEvent::new(Some("2001".into()), "3001", "mallory", png_and_gif());
        let outcome = pipeline(config(), vision).process(&event).await;
        assert!(matches!(
            outcome,
            AuditOutcome::Violation {
                enforcement: None,
                ..
            }
        ));
    }
}
