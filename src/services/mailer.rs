//! Outbound mail requests.
//!
//! Services only build a [`MailRequest`] and hand it to a [`Mailer`]; transport
//! runs on its own task so a slow or failing relay never holds up a request.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    /// Sent after registration; carries the activation code.
    Welcome,
    /// Sent on a password reset request; carries the reset code.
    ForgotPassword,
}

#[derive(Debug, Clone, Serialize)]
pub struct MailRequest {
    pub to: String,
    pub template: MailTemplate,
    pub user_id: UserId,
    pub first_name: String,
    pub code: String,
    /// Absolute link the recipient follows to use the code.
    pub link: String,
}

pub trait Mailer: Send + Sync {
    /// Queues a message. Must not block.
    fn deliver(&self, request: MailRequest);
}

/// Queues requests on an unbounded channel.
#[derive(Clone)]
pub struct ChannelMailer {
    tx: mpsc::UnboundedSender<MailRequest>,
}

impl ChannelMailer {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MailRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Mailer for ChannelMailer {
    fn deliver(&self, request: MailRequest) {
        if self.tx.send(request).is_err() {
            warn!("Mail transport is gone; dropping message");
        }
    }
}

/// Drains the queue and records each message. Bodies are not logged since
/// they contain codes.
pub fn spawn_log_transport(
    mut rx: mpsc::UnboundedReceiver<MailRequest>,
    config: MailConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            if !config.enabled {
                continue;
            }
            info!(
                from = %config.from_address,
                to = %request.to,
                template = ?request.template,
                user_id = %request.user_id,
                "Mail dispatched"
            );
            metrics::counter!("warden_mail_sent_total").increment(1);
        }
    })
}
