use crate::domain::events::IdentityEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Writes identity events to the log as structured lines.
pub struct AuditService {
    event_bus: broadcast::Sender<IdentityEvent>,
}

impl AuditService {
    #[must_use]
    pub const fn new(event_bus: broadcast::Sender<IdentityEvent>) -> Self {
        Self { event_bus }
    }

    pub fn start_listener(self: Arc<Self>) {
        let mut rx = self.event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => record(&event),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!(count, "Audit listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Audit listener event bus closed");
                        break;
                    }
                }
            }
        });
    }
}

fn record(event: &IdentityEvent) {
    let name = event.name();
    metrics::counter!("warden_identity_events_total", "event" => name).increment(1);

    let payload = serde_json::to_string(event).unwrap_or_default();
    if event.is_security_alert() {
        warn!(target: "warden::audit", event = name, %payload, "Security event");
    } else {
        info!(target: "warden::audit", event = name, %payload, "Identity event");
    }
}
