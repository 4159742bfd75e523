// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Management alerts and the periodic alert-rule monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zaprelay_core::types::{
    format_timestamp, timestamp_minutes_ago, AlertAction, AlertKind, AlertRule, Conversation,
    Notification, OutboundMessage, Seller,
};
use zaprelay_core::RelayError;

use crate::Relay;

/// An alert addressed to the management team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementAlert {
    /// Machine-readable cause, e.g. `inactivity` or `transfer_notification_failed`.
    #[serde(default = "default_alert_kind")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub seller_id: Option<String>,
}

fn default_alert_kind() -> String {
    "manual".to_string()
}

/// Delivery summary of one management alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertDelivery {
    pub notification_id: String,
    pub phones_total: usize,
    pub phones_delivered: usize,
}

/// Counters for one monitor run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub rules_evaluated: usize,
    pub rules_triggered: usize,
    pub skipped_cooldown: usize,
    pub alerts_sent: usize,
    pub notifications_written: usize,
    pub failures: usize,
}

/// One entity that matched a rule.
struct RuleHit {
    title: String,
    message: String,
    conversation_id: Option<String>,
    seller_id: Option<String>,
}

impl Relay {
    /// Writes a `management_alert` notification and texts every management
    /// phone through the router account.
    ///
    /// Fails when the notification cannot be written, or when phones are
    /// configured and none of them received the text.
    pub async fn send_management_alert(
        &self,
        alert: ManagementAlert,
    ) -> Result<AlertDelivery, RelayError> {
        let notification = Notification::new(
            "management_alert",
            alert.title.clone(),
            alert.message.clone(),
        )
        .for_seller(alert.seller_id.as_deref());
        let notification = match alert.conversation_id.as_deref() {
            Some(id) => notification.for_conversation(id),
            None => notification,
        };
        self.storage.create_notification(&notification).await?;

        let phones = &self.settings.management_phones;
        let mut delivery = AlertDelivery {
            notification_id: notification.id.clone(),
            phones_total: phones.len(),
            phones_delivered: 0,
        };
        if phones.is_empty() {
            debug!(kind = %alert.kind, "no management phones configured, notification only");
            return Ok(delivery);
        }

        let text = format!("🚨 {}\n\n{}", alert.title, alert.message);
        match self.router.as_ref() {
            Some(router) => {
                for phone in phones {
                    match router.send(OutboundMessage::text(phone, text.as_str())).await {
                        Ok(_) => delivery.phones_delivered += 1,
                        Err(e) => warn!(phone = %phone, error = %e, "management alert send failed"),
                    }
                }
            }
            None => warn!(kind = %alert.kind, "no router channel, management alert not texted"),
        }

        info!(
            kind = %alert.kind,
            delivered = delivery.phones_delivered,
            total = delivery.phones_total,
            "management alert sent"
        );
        if delivery.phones_delivered == 0 {
            return Err(RelayError::Channel {
                message: format!(
                    "management alert reached none of {} phones",
                    delivery.phones_total
                ),
                source: None,
            });
        }
        Ok(delivery)
    }

    /// Evaluates every active alert rule once.
    ///
    /// Rules inside their cooldown window are skipped. Each matching
    /// entity gets its own alert; per-entity failures are counted and the
    /// run continues.
    pub async fn run_alert_monitor(&self) -> Result<MonitorReport, RelayError> {
        let rules = self.storage.list_active_alert_rules().await?;
        let mut report = MonitorReport::default();
        let now = Utc::now();

        for rule in rules {
            report.rules_evaluated += 1;
            if rule.in_cooldown(now) {
                debug!(rule = %rule.name, "rule in cooldown, skipped");
                report.skipped_cooldown += 1;
                continue;
            }

            let hits = match self.evaluate_rule(&rule).await {
                Ok(hits) => hits,
                Err(e) => {
                    error!(rule = %rule.name, error = %e, "alert rule evaluation failed");
                    report.failures += 1;
                    continue;
                }
            };
            if hits.is_empty() {
                continue;
            }
            report.rules_triggered += 1;
            info!(rule = %rule.name, kind = %rule.kind, matches = hits.len(), "alert rule triggered");

            for hit in hits {
                match rule.action {
                    AlertAction::NotifyManagement => {
                        let alert = ManagementAlert {
                            kind: rule.kind.to_string(),
                            title: hit.title,
                            message: hit.message,
                            conversation_id: hit.conversation_id,
                            seller_id: hit.seller_id,
                        };
                        match self.send_management_alert(alert).await {
                            Ok(_) => report.alerts_sent += 1,
                            Err(e) => {
                                warn!(rule = %rule.name, error = %e, "alert delivery failed");
                                report.failures += 1;
                            }
                        }
                    }
                    AlertAction::NotifyOnly => {
                        let notification =
                            Notification::new(&rule.kind.to_string(), hit.title, hit.message)
                                .for_seller(hit.seller_id.as_deref());
                        let notification = match hit.conversation_id.as_deref() {
                            Some(id) => notification.for_conversation(id),
                            None => notification,
                        };
                        match self.storage.create_notification(&notification).await {
                            Ok(()) => report.notifications_written += 1,
                            Err(e) => {
                                error!(rule = %rule.name, error = %e, "failed to write alert notification");
                                report.failures += 1;
                            }
                        }
                    }
                }
            }

            if let Err(e) = self
                .storage
                .mark_rule_triggered(&rule.id, &format_timestamp(now))
                .await
            {
                error!(rule = %rule.name, error = %e, "failed to stamp rule trigger time");
                report.failures += 1;
            }
        }

        info!(?report, "alert monitor run complete");
        Ok(report)
    }

    async fn evaluate_rule(&self, rule: &AlertRule) -> Result<Vec<RuleHit>, RelayError> {
        let minutes = rule.threshold;
        let hits = match rule.kind {
            AlertKind::Inactivity => {
                let cutoff = timestamp_minutes_ago(minutes);
                self.storage
                    .sellers_inactive_since(&cutoff)
                    .await?
                    .into_iter()
                    .map(|s| seller_hit(&s, format!("Vendedor inativo: {}", s.name), format!(
                        "{} está sem atividade há mais de {minutes} minutos (última: {}).",
                        s.name,
                        s.last_activity.as_deref().unwrap_or("-")
                    )))
                    .collect()
            }
            AlertKind::ConversationStalled => {
                let cutoff = timestamp_minutes_ago(minutes);
                self.storage
                    .conversations_stalled_since(&cutoff)
                    .await?
                    .into_iter()
                    .map(|c| conversation_hit(&c, "Conversa parada", format!(
                        "A conversa com {} está sem mensagens há mais de {minutes} minutos.",
                        c.client_phone
                    )))
                    .collect()
            }
            AlertKind::ResponseTime => {
                let cutoff = timestamp_minutes_ago(minutes);
                self.storage
                    .conversations_awaiting_response(&cutoff)
                    .await?
                    .into_iter()
                    .map(|c| conversation_hit(&c, "Cliente aguardando resposta", format!(
                        "O cliente {} aguarda resposta há mais de {minutes} minutos.",
                        c.client_phone
                    )))
                    .collect()
            }
            AlertKind::QualityScore => self
                .storage
                .sellers_below_score(rule.threshold)
                .await?
                .into_iter()
                .map(|s| seller_hit(&s, format!("Qualidade baixa: {}", s.name), format!(
                    "{} tem pontuação {:.1}, abaixo do mínimo de {}.",
                    s.name, s.performance_score, rule.threshold
                )))
                .collect(),
        };
        Ok(hits)
    }
}

fn seller_hit(seller: &Seller, title: String, message: String) -> RuleHit {
    RuleHit {
        title,
        message,
        conversation_id: None,
        seller_id: Some(seller.id.clone()),
    }
}

fn conversation_hit(conversation: &Conversation, title: &str, message: String) -> RuleHit {
    RuleHit {
        title: title.to_string(),
        message,
        conversation_id: Some(conversation.id.clone()),
        seller_id: conversation.assigned_seller_id.clone(),
    }
}

/// Runs the alert monitor every `period` until `cancel` fires.
pub fn spawn_alert_ticker(
    relay: Arc<Relay>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick completes immediately.
        interval.tick().await;
        info!(period_secs = period.as_secs(), "alert monitor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = relay.run_alert_monitor().await {
                        warn!(error = %e, "alert monitor run failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("alert monitor shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, RelaySettings};
    use zaprelay_core::types::{new_id, now_timestamp};
    use zaprelay_test_utils::MockChannel;

    fn rule(kind: AlertKind, threshold: f64, action: AlertAction) -> AlertRule {
        AlertRule {
            id: new_id(),
            name: format!("{kind} rule"),
            kind,
            threshold,
            cooldown_minutes: 0,
            action,
            active: true,
            last_triggered_at: None,
            created_at: now_timestamp(),
        }
    }

    fn settings() -> RelaySettings {
        RelaySettings {
            management_phones: vec!["5511977776666".into(), "5511977775555".into()],
            ..RelaySettings::default()
        }
    }

    #[tokio::test]
    async fn management_alert_texts_every_phone() {
        let (storage, _dir) = testing::storage().await;
        let router = Arc::new(MockChannel::named("router"));
        let relay = Relay::new(storage.clone(), settings()).with_router(router.clone());

        let delivery = relay
            .send_management_alert(ManagementAlert {
                kind: "manual".into(),
                title: "Teste".into(),
                message: "corpo".into(),
                conversation_id: None,
                seller_id: None,
            })
            .await
            .unwrap();
        assert_eq!(delivery.phones_delivered, 2);
        assert_eq!(router.sent_to("5511977775555").await.len(), 1);

        let notes = storage.list_notifications("admin", 10).await.unwrap();
        assert_eq!(notes[0].kind, "management_alert");
        assert_eq!(notes[0].id, delivery.notification_id);
    }

    #[tokio::test]
    async fn management_alert_without_delivery_is_an_error() {
        let (storage, _dir) = testing::storage().await;
        let relay = Relay::new(storage.clone(), settings())
            .with_router(Arc::new(MockChannel::failing()));
        let result = relay
            .send_management_alert(ManagementAlert {
                kind: "manual".into(),
                title: "t".into(),
                message: "m".into(),
                conversation_id: None,
                seller_id: None,
            })
            .await;
        assert!(matches!(result, Err(RelayError::Channel { .. })));
        // The notification is still written.
        assert_eq!(storage.list_notifications("admin", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_seller_triggers_one_alert_per_run() {
        let (storage, _dir) = testing::storage().await;
        let mut idle = testing::seller("s1", "5511911111111", None);
        idle.last_activity = Some(timestamp_minutes_ago(120.0));
        storage.upsert_seller(&idle).await.unwrap();
        let mut busy = testing::seller("s2", "5511922222222", None);
        busy.last_activity = Some(now_timestamp());
        storage.upsert_seller(&busy).await.unwrap();
        storage
            .create_alert_rule(&rule(AlertKind::Inactivity, 60.0, AlertAction::NotifyManagement))
            .await
            .unwrap();

        let router = Arc::new(MockChannel::named("router"));
        let settings = RelaySettings {
            management_phones: vec!["5511977776666".into()],
            ..RelaySettings::default()
        };
        let relay = Relay::new(storage.clone(), settings).with_router(router.clone());

        let report = relay.run_alert_monitor().await.unwrap();
        assert_eq!(report.rules_evaluated, 1);
        assert_eq!(report.rules_triggered, 1);
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(router.sent_count().await, 1);
        assert!(router.sent_messages().await[0].body.display_text().contains("Vendedor s1"));

        let rules = storage.list_active_alert_rules().await.unwrap();
        assert!(rules[0].last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_runs() {
        let (storage, _dir) = testing::storage().await;
        let mut weak = testing::seller("s1", "5511911111111", None);
        weak.performance_score = 40.0;
        storage.upsert_seller(&weak).await.unwrap();
        let mut r = rule(AlertKind::QualityScore, 50.0, AlertAction::NotifyOnly);
        r.cooldown_minutes = 60;
        storage.create_alert_rule(&r).await.unwrap();

        let relay = Relay::new(storage.clone(), RelaySettings::default());
        let first = relay.run_alert_monitor().await.unwrap();
        assert_eq!(first.notifications_written, 1);
        assert_eq!(first.skipped_cooldown, 0);

        let second = relay.run_alert_monitor().await.unwrap();
        assert_eq!(second.skipped_cooldown, 1);
        assert_eq!(second.notifications_written, 0);

        let notes = storage.list_notifications("admin", 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, "quality_score");
        assert_eq!(notes[0].seller_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn quiet_rules_are_not_stamped() {
        let (storage, _dir) = testing::storage().await;
        storage
            .create_alert_rule(&rule(AlertKind::ConversationStalled, 30.0, AlertAction::NotifyOnly))
            .await
            .unwrap();
        let relay = Relay::new(storage.clone(), RelaySettings::default());
        let report = relay.run_alert_monitor().await.unwrap();
        assert_eq!(report.rules_triggered, 0);
        let rules = storage.list_active_alert_rules().await.unwrap();
        assert!(rules[0].last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn ticker_stops_on_cancel() {
        let (storage, _dir) = testing::storage().await;
        let relay = Arc::new(Relay::new(storage, RelaySettings::default()));
        let cancel = CancellationToken::new();
        let handle = spawn_alert_ticker(relay, Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
