//! Feishu (Lark) webhook notifications
//!
//! Fire-and-forget: delivery failures are logged and never propagate into
//! the trading path.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{ArbitrageOpportunity, KillReason};

/// Feishu notification client
#[derive(Clone)]
pub struct FeishuNotifier {
    client: Client,
    webhook_url: String,
}

/// Events worth pushing to the operations channel
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    OpportunityFound {
        opportunity: ArbitrageOpportunity,
    },
    TradeExecuted {
        strategy_id: Uuid,
        instrument: String,
        long_venue: String,
        short_venue: String,
        notional: Decimal,
        expected_profit_bps: Decimal,
    },
    PositionKilled {
        strategy_id: Uuid,
        instrument: String,
        reason: KillReason,
    },
    RiskWarning {
        message: String,
    },
}

impl NotifyEvent {
    fn render(&self) -> String {
        match self {
            NotifyEvent::OpportunityFound { opportunity } => format!(
                "🔍 Opportunity: {}\n\
                 Long {} @ {} | Short {} @ {}\n\
                 Spread: {:.1} bps | Size: ${:.0} | Est. daily: ${:.2}",
                opportunity.instrument,
                opportunity.long_venue,
                opportunity.long_rate,
                opportunity.short_venue,
                opportunity.short_rate,
                opportunity.spread_bps,
                opportunity.optimal_notional,
                opportunity.estimated_daily_profit,
            ),
            NotifyEvent::TradeExecuted {
                strategy_id,
                instrument,
                long_venue,
                short_venue,
                notional,
                expected_profit_bps,
            } => format!(
                "🟢 Strategy opened: {}\n\
                 Long {} / Short {} | Notional: ${:.0}\n\
                 Expected: {:.1} bps/day | ID: {}",
                instrument, long_venue, short_venue, notional, expected_profit_bps, strategy_id,
            ),
            NotifyEvent::PositionKilled {
                strategy_id,
                instrument,
                reason,
            } => format!(
                "🔴 KILL SWITCH: {} ({})\nStrategy: {}",
                instrument, reason, strategy_id,
            ),
            NotifyEvent::RiskWarning { message } => format!("⚠️ Risk warning: {}", message),
        }
    }
}

#[derive(Serialize)]
struct FeishuMessage {
    msg_type: String,
    content: FeishuContent,
}

#[derive(Serialize)]
struct FeishuContent {
    text: String,
}

impl FeishuNotifier {
    /// Create a new Feishu notifier from environment variable
    pub fn from_env() -> Option<Arc<Self>> {
        std::env::var("FEISHU_WEBHOOK_URL").ok().map(|url| {
            info!("Feishu notifications enabled");
            Arc::new(Self {
                client: Client::new(),
                webhook_url: url,
            })
        })
    }

    /// Create a new Feishu notifier with explicit URL
    pub fn new(webhook_url: String) -> Arc<Self> {
        Arc::new(Self {
            client: Client::new(),
            webhook_url,
        })
    }

    /// Send a text message to Feishu
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let message = FeishuMessage {
            msg_type: "text".to_string(),
            content: FeishuContent {
                text: text.to_string(),
            },
        };

        match self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
        {
            Ok(resp) => {
                if resp.status().is_success() {
                    debug!("Feishu notification sent");
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("Feishu notification failed: {} - {}", status, body);
                    Err(format!("HTTP {}: {}", status, body))
                }
            }
            Err(e) => {
                error!("Feishu request failed: {}", e);
                Err(e.to_string())
            }
        }
    }

    /// Render and deliver an event, swallowing delivery errors
    pub async fn notify(&self, event: NotifyEvent) {
        if let Err(e) = self.send_message(&event.render()).await {
            error!("Failed to send notification: {}", e);
        }
    }

    /// Send startup notification
    pub async fn notify_startup(&self, venues: &[String], instruments: &[String], dry_run: bool) {
        let text = format!(
            "🚀 Funding arbitrage engine started\n\
             Venues: {}\nInstruments: {}\nMode: {}",
            venues.join(", "),
            instruments.join(", "),
            if dry_run { "dry-run" } else { "live" },
        );

        if let Err(e) = self.send_message(&text).await {
            error!("Failed to send startup notification: {}", e);
        }
    }
}
