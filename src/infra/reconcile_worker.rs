use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::application::{
    ports::{gateways::PaymentEvent, idempotency::IdempotencyGuard},
    use_cases::{
        billing::BillingUseCases,
        reconciliation::{PaymentCredit, ReconciliationUseCases},
    },
};
use crate::app_error::is_retryable;

/// Work admitted by the idempotency guard, queued after the webhook sender
/// was acknowledged. At-least-once: a job lost to a crash is redelivered by
/// the gateway and re-admitted because its marker was never completed.
#[derive(Debug)]
pub enum ReconcileJob {
    /// Authenticated push event from the subscription gateway.
    SubscriptionEvent(PaymentEvent),
    /// Regional-charge notification; gateway truth still has to be pulled.
    RegionalCharge { tx_ref: String },
}

#[derive(Clone)]
pub struct ReconcileQueue {
    tx: mpsc::UnboundedSender<ReconcileJob>,
}

impl ReconcileQueue {
    pub fn enqueue(&self, job: ReconcileJob) {
        if self.tx.send(job).is_err() {
            error!("Reconciliation worker is gone; dropping job for gateway redelivery");
        }
    }
}

pub fn spawn_reconcile_worker(
    reconciliation: Arc<ReconciliationUseCases>,
    billing: Arc<BillingUseCases>,
    guard: Arc<dyn IdempotencyGuard>,
) -> ReconcileQueue {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        info!("Reconciliation worker started");
        while let Some(job) = rx.recv().await {
            process_job(&reconciliation, &billing, &guard, job).await;
        }
        info!("Reconciliation worker stopped");
    });

    ReconcileQueue { tx }
}

async fn process_job(
    reconciliation: &ReconciliationUseCases,
    billing: &BillingUseCases,
    guard: &Arc<dyn IdempotencyGuard>,
    job: ReconcileJob,
) {
    match job {
        ReconcileJob::SubscriptionEvent(event) => {
            let key = event.dedup_key();
            let credit = PaymentCredit {
                gateway: event.gateway,
                provider_ref: event
                    .provider_ref
                    .clone()
                    .unwrap_or_else(|| event.event_ref.clone()),
                reference: event.event_ref.clone(),
                user_hint: event.user_hint,
                customer_id: event.customer_id.clone(),
                amount: event.amount.unwrap_or(0),
                currency: event.currency.clone().unwrap_or_else(|| "USD".to_string()),
                period_end: event.period_end,
            };

            match reconciliation.apply_successful_payment(&credit).await {
                Ok(outcome) => {
                    if let Err(e) = guard.complete(&key).await {
                        error!(key, error = %e, "Failed to mark event done");
                    }
                    info!(event_ref = %event.event_ref, ?outcome, "Reconciled subscription event");
                }
                Err(e) if is_retryable(&e) => {
                    // Give the gateway's redelivery a second chance.
                    let _ = guard.release(&key).await;
                    error!(event_ref = %event.event_ref, error = %e, "Reconciliation failed, marker released");
                }
                Err(e) => {
                    // Dropped for manual follow-up; redeliveries must no-op.
                    let _ = guard.complete(&key).await;
                    error!(event_ref = %event.event_ref, error = %e, "Reconciliation failed, event dropped");
                }
            }
        }
        ReconcileJob::RegionalCharge { tx_ref } => {
            // The guard marker is settled inside verify_admitted_charge.
            match billing.verify_admitted_charge(&tx_ref).await {
                Ok(outcome) => {
                    info!(tx_ref, ?outcome, "Processed regional charge notification");
                }
                Err(e) => {
                    error!(tx_ref, error = %e, "Regional charge processing failed");
                }
            }
        }
    }
}
