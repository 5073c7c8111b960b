//! Penalty enforcement: recall, mute, evidence report.
//!
//! Each action runs independently and reports its own `ActionOutcome`. A
//! failed action never prevents the others from running. Recall and mute are
//! issued together; the report waits for both so its status line is accurate.
//! Nothing is retried and nothing is logged here; the caller logs outcomes.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::GuardConfig;
use crate::error::ActionError;
use crate::event::{ActionInvoker, MessageEvent, id_param};
use crate::pipeline::extract::ImageRef;

pub const ACTION_DELETE_MSG: &str = "delete_msg";
pub const ACTION_SET_GROUP_BAN: &str = "set_group_ban";
pub const ACTION_SEND_PRIVATE_MSG: &str = "send_private_msg";

/// Result of one enforcement action.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Preconditions not met (disabled, private chat, no message id...).
    Skipped,
    Succeeded,
    Failed(ActionError),
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn error(&self) -> Option<&ActionError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn from_result(result: Result<Value, ActionError>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Which actions were confirmed successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnforcementReceipt {
    pub recalled: bool,
    pub banned: bool,
    pub report_sent: bool,
}

/// Per-action outcomes of one enforcement run.
#[derive(Debug)]
pub struct Enforcement {
    pub recall: ActionOutcome,
    pub ban: ActionOutcome,
    pub report: ActionOutcome,
}

impl Enforcement {
    pub fn receipt(&self) -> EnforcementReceipt {
        EnforcementReceipt {
            recalled: self.recall.succeeded(),
            banned: self.ban.succeeded(),
            report_sent: self.report.succeeded(),
        }
    }
}

/// Executes penalties against the messaging backend.
#[derive(Clone)]
pub struct PenaltyEnforcer {
    config: Arc<GuardConfig>,
}

impl PenaltyEnforcer {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        Self { config }
    }

    /// Punish the sender of `event` for a confirmed violation.
    ///
    /// Returns `None` when the event carries no action invoker: enforcement is
    /// simply unavailable in that context.
    pub async fn enforce(
        &self,
        event: &MessageEvent,
        evidence: &ImageRef,
        reason: &str,
    ) -> Option<Enforcement> {
        let invoker = event.action_invoker()?.as_ref();

        let (recall, ban) = futures::join!(self.recall(invoker, event), self.ban(invoker, event));

        let receipt_so_far = EnforcementReceipt {
            recalled: recall.succeeded(),
            banned: ban.succeeded(),
            report_sent: false,
        };
        let report = self
            .report(invoker, event, evidence, reason, &receipt_so_far)
            .await;

        Some(Enforcement {
            recall,
            ban,
            report,
        })
    }

    async fn recall(&self, invoker: &dyn ActionInvoker, event: &MessageEvent) -> ActionOutcome {
        if !self.config.enable_recall || !event.is_group() {
            return ActionOutcome::Skipped;
        }
        let Some(message_id) = event.message_id() else {
            return ActionOutcome::Skipped;
        };

        let params = json!({ "message_id": id_param(message_id) });
        ActionOutcome::from_result(invoker.call_action(ACTION_DELETE_MSG, params).await)
    }

    async fn ban(&self, invoker: &dyn ActionInvoker, event: &MessageEvent) -> ActionOutcome {
        if self.config.ban_duration <= 0 || !event.is_group() {
            return ActionOutcome::Skipped;
        }

        let params = json!({
            "group_id": id_param(event.group_id_or_empty()),
            "user_id": id_param(&event.sender_id),
            "duration": self.config.ban_duration,
        });
        ActionOutcome::from_result(invoker.call_action(ACTION_SET_GROUP_BAN, params).await)
    }

    async fn report(
        &self,
        invoker: &dyn ActionInvoker,
        event: &MessageEvent,
        evidence: &ImageRef,
        reason: &str,
        receipt: &EnforcementReceipt,
    ) -> ActionOutcome {
        let Some(target) = self.config.report_target_id.as_deref() else {
            return ActionOutcome::Skipped;
        };

        let target_id: i64 = match target.trim().parse() {
            Ok(id) => id,
            Err(e) => {
                return ActionOutcome::Failed(ActionError::InvalidParameter {
                    action: ACTION_SEND_PRIVATE_MSG.into(),
                    reason: format!("report target {target:?} is not a user id: {e}"),
                });
            }
        };

        let params = json!({
            "user_id": target_id,
            "message": [
                { "type": "text", "data": { "text": format_report(event, reason, receipt) } },
                { "type": "image", "data": { "file": evidence.url } },
            ],
        });
        ActionOutcome::from_result(invoker.call_action(ACTION_SEND_PRIVATE_MSG, params).await)
    }
}

/// Text block of the evidence report.
pub fn format_report(event: &MessageEvent, reason: &str, receipt: &EnforcementReceipt) -> String {
    let source = match &event.group_id {
        Some(group_id) => format!("群 {group_id}"),
        None => "私聊".to_string(),
    };
    let status = format!(
        "撤回:{} 禁言:{}",
        glyph(receipt.recalled),
        glyph(receipt.banned)
    );

    format!(
        "🕵️ [静默执法报告]\n\
         来源: {source}\n\
         用户: {name} ({id})\n\
         理由: {reason}\n\
         状态: {status}\n\
         证据:",
        name = event.sender_name,
        id = event.sender_id,
    )
}

fn glyph(ok: bool) -> &'static str {
    if ok { "✅" } else { "❌" }
}
