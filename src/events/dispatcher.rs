//! Background delivery of credit events to vendor webhooks

use reqwest::Client;
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::CreditEvent;
use crate::providers::client::backoff;
use crate::webhook::{sign, SignatureAlgorithm, SIGNATURE_HEADER};

const QUEUE_CAPACITY: usize = 1024;
const DELIVERY_ATTEMPTS: u32 = 3;

/// Cheap-to-clone handle for publishing events
#[derive(Clone)]
pub struct EventDispatcher {
    tx: Option<mpsc::Sender<CreditEvent>>,
}

#[derive(Debug, sqlx::FromRow)]
struct VendorWebhook {
    id: Uuid,
    url: String,
    secret: String,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    event: &'static str,
    payload: &'a CreditEvent,
}

impl EventDispatcher {
    /// Spawn the delivery worker and return the publishing handle
    pub fn start(db_pool: PgPool, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        let handle = tokio::spawn(run_worker(rx, db_pool, client));
        (Self { tx: Some(tx) }, handle)
    }

    /// A dispatcher that only logs. Used where no worker runs.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event without waiting. A full or closed queue drops the event
    /// with a warning.
    pub fn publish(&self, event: CreditEvent) {
        tracing::info!(event = event.name(), business_id = %event.business_id(), "Credit event");

        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!(error = %e, "Event queue unavailable, dropping event");
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<CreditEvent>, db_pool: PgPool, client: Client) {
    tracing::info!("Event dispatcher started");

    while let Some(event) = rx.recv().await {
        let hooks = match sqlx::query_as::<_, VendorWebhook>(
            "SELECT id, url, secret FROM vendor_webhooks WHERE business_id = $1 AND active = true",
        )
        .bind(event.business_id())
        .fetch_all(&db_pool)
        .await
        {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!(error = %e, event = event.name(), "Failed to load vendor webhooks");
                continue;
            }
        };

        for hook in hooks {
            let client = client.clone();
            let event = event.clone();
            tokio::spawn(async move {
                deliver(&client, &hook, &event).await;
            });
        }
    }

    tracing::info!("Event dispatcher stopped");
}

async fn deliver(client: &Client, hook: &VendorWebhook, event: &CreditEvent) {
    let body = match serde_json::to_vec(&OutboundEnvelope {
        event: event.name(),
        payload: event,
    }) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound event");
            return;
        }
    };
    let signature = sign(SignatureAlgorithm::Sha512, &hook.secret, &body);

    for attempt in 0..DELIVERY_ATTEMPTS {
        let result = client
            .post(&hook.url)
            .header(SIGNATURE_HEADER, &signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(webhook_id = %hook.id, event = event.name(), "Vendor webhook delivered");
                return;
            }
            Ok(resp) => {
                tracing::warn!(webhook_id = %hook.id, status = %resp.status(), attempt = attempt + 1, "Vendor webhook rejected");
            }
            Err(e) => {
                tracing::warn!(webhook_id = %hook.id, error = %e, attempt = attempt + 1, "Vendor webhook delivery failed");
            }
        }

        tokio::time::sleep(backoff(attempt + 2)).await;
    }

    tracing::error!(webhook_id = %hook.id, url = %hook.url, event = event.name(), "Giving up on vendor webhook");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_dispatcher_accepts_events() {
        let dispatcher = EventDispatcher::disabled();
        dispatcher.publish(CreditEvent::LoanCompleted {
            business_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
        });
    }

    #[tokio::test]
    async fn test_publish_never_blocks_when_queue_is_full() {
        let (tx, _rx) = mpsc::channel(1);
        let dispatcher = EventDispatcher { tx: Some(tx) };
        let event = CreditEvent::LoanCompleted {
            business_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
        };

        // Second publish finds the queue full and returns immediately
        dispatcher.publish(event.clone());
        dispatcher.publish(event);
    }
}
