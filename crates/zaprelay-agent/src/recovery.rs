// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch repair of conversations left behind by failed deliveries.
//!
//! Every job walks a bounded batch with a fixed pause between items and
//! re-checks for an existing bot reply right before sending, so running a
//! job twice never answers the same message twice.

use serde::Serialize;
use tracing::{debug, info, warn};
use zaprelay_core::types::Conversation;
use zaprelay_core::RelayError;

use crate::bridge::ask_llm;
use crate::{Relay, SharedProvider};

/// Counters for one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub replied: usize,
    /// Already answered by the time the item was reached.
    pub skipped: usize,
    pub sessions_created: usize,
    pub failed: usize,
    /// Rows touched by `sync_messages`.
    pub timestamps_synced: usize,
}

/// Per-item result.
enum Step {
    Replied,
    Skipped,
    Failed,
}

impl Relay {
    /// Answers bot-owned conversations whose latest client message never
    /// got a bot reply.
    pub async fn reprocess_lost_messages(&self) -> Result<RecoveryReport, RelayError> {
        let provider = self.require_provider()?;
        let batch = self
            .storage
            .conversations_missing_bot_reply(self.settings.recovery_batch_limit)
            .await?;
        info!(count = batch.len(), "reprocessing conversations without bot reply");

        let mut report = RecoveryReport::default();
        for (i, conversation) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.recovery_delay).await;
            }
            report.scanned += 1;
            match self
                .answer_latest(provider, conversation, conversation.llm_session_id.as_deref())
                .await
            {
                Ok((step, _)) => tally(&mut report, step),
                Err(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "reprocess failed");
                    report.failed += 1;
                }
            }
        }
        info!(?report, "reprocess complete");
        Ok(report)
    }

    /// Opens an LLM session for bot-owned conversations that have none,
    /// replying when the latest client message is still unanswered.
    pub async fn recover_llm_sessions(&self) -> Result<RecoveryReport, RelayError> {
        let provider = self.require_provider()?;
        let batch = self
            .storage
            .conversations_missing_llm_session(self.settings.recovery_batch_limit)
            .await?;
        info!(count = batch.len(), "recovering LLM sessions");

        let mut report = RecoveryReport::default();
        for (i, conversation) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.recovery_delay).await;
            }
            report.scanned += 1;
            match self.answer_latest(provider, conversation, None).await {
                Ok((step, session_created)) => {
                    if session_created {
                        report.sessions_created += 1;
                    }
                    tally(&mut report, step);
                }
                Err(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "session recovery failed");
                    report.failed += 1;
                }
            }
        }
        info!(?report, "session recovery complete");
        Ok(report)
    }

    /// Realigns every conversation's `last_message_at` with its newest message.
    pub async fn sync_messages(&self) -> Result<RecoveryReport, RelayError> {
        let changed = self.storage.sync_conversation_timestamps().await?;
        info!(changed, "conversation timestamps synced");
        Ok(RecoveryReport {
            timestamps_synced: changed,
            ..RecoveryReport::default()
        })
    }

    fn require_provider(&self) -> Result<&SharedProvider, RelayError> {
        self.provider.as_ref().ok_or_else(|| RelayError::AdapterNotFound {
            adapter_type: "provider".into(),
            name: "dify".into(),
        })
    }

    /// Asks the LLM about the latest client message and sends the answer
    /// if nobody replied meanwhile. Returns the step and whether a new
    /// LLM session was stored.
    async fn answer_latest(
        &self,
        provider: &SharedProvider,
        conversation: &Conversation,
        session: Option<&str>,
    ) -> Result<(Step, bool), RelayError> {
        let Some(latest) = self.storage.latest_client_message(&conversation.id).await? else {
            debug!(conversation_id = %conversation.id, "no client message to answer");
            return Ok((Step::Skipped, false));
        };
        let answered = self
            .storage
            .has_bot_reply_since(&conversation.id, &latest.created_at)
            .await?;
        if answered && session.is_some() {
            return Ok((Step::Skipped, false));
        }

        let Some(resp) = ask_llm(
            provider.as_ref(),
            &latest.content,
            &conversation.client_phone,
            session,
        )
        .await
        else {
            return Ok((Step::Failed, false));
        };

        let session_created = conversation.llm_session_id.as_deref()
            != Some(resp.conversation_id.as_str());
        if session_created {
            self.storage
                .set_llm_session(&conversation.id, &resp.conversation_id)
                .await?;
        }

        // Re-check: a webhook or a parallel run may have answered meanwhile.
        if self
            .storage
            .has_bot_reply_since(&conversation.id, &latest.created_at)
            .await?
        {
            debug!(conversation_id = %conversation.id, "already answered, skipping send");
            return Ok((Step::Skipped, session_created));
        }

        let channel = self.client_channel(conversation).await?;
        let sent = self
            .send_bot_message(
                &conversation.id,
                &channel,
                &conversation.client_phone,
                &resp.answer,
                "text",
            )
            .await?;
        let step = if sent { Step::Replied } else { Step::Failed };
        Ok((step, session_created))
    }
}

fn tally(report: &mut RecoveryReport, step: Step) {
    match step {
        Step::Replied => report.replied += 1,
        Step::Skipped => report.skipped += 1,
        Step::Failed => report.failed += 1,
    }
}
