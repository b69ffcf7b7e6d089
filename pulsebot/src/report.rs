//! Periodic news digests pushed to every registered user.

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::dialogue::send_long;
use crate::texts;

/// One digest ready to be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub chat_id: ChatId,
    pub username: String,
    pub text: String,
}

/// Ask the API for a digest per registered user.
///
/// Users whose stored chat id is not a number are skipped.
pub async fn collect_reports(api: &ApiClient) -> Vec<Report> {
    let users = match api.get_all_users().await {
        Ok(users) => users,
        Err(e) => {
            error!("Error calling /get_all_users: {}", e);
            return Vec::new();
        }
    };

    let mut reports = Vec::with_capacity(users.len());
    for user in users {
        let chat_id = match user.chat_id.trim().parse::<i64>() {
            Ok(id) => ChatId(id),
            Err(_) => {
                warn!(username = %user.username, chat_id = %user.chat_id, "skipping user with invalid chat id");
                continue;
            }
        };

        let prompt = format!("{}\n{}", user.system_prompt, texts::REGULAR_UPDATE_PROMPT);
        let result = api.predict(&user.username, &prompt).await;
        if let Err(e) = &result {
            error!("Error calling /predict for {}: {}", user.username, e);
        }

        reports.push(Report {
            chat_id,
            username: user.username,
            text: texts::report_reply(&result),
        });
    }
    reports
}

async fn deliver(bot: &Bot, reports: Vec<Report>) {
    for report in reports {
        if let Err(e) = send_long(bot, report.chat_id, &report.text).await {
            error!("Failed to send report to {}: {}", report.username, e);
        }
    }
}

/// Send digests now and then every `every`
pub fn spawn_reports(bot: Bot, api: Arc<ApiClient>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            // first tick completes immediately
            ticker.tick().await;
            let reports = collect_reports(&api).await;
            info!("Sending {} scheduled reports", reports.len());
            deliver(&bot, reports).await;
        }
    })
}
