use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tokio::time::interval;
use tracing::{error, info};

use crate::application::use_cases::{
    policy::PolicyUseCases,
    reconciliation::{ReconciliationUseCases, SubscriptionRepo, UserDirectoryRepo},
};

/// Periodic repair jobs: expire subscriptions whose paid window closed,
/// synthesize subscription rows for pro users that lost theirs to the
/// non-transactional write pair, and reset free-plan quotas monthly.
pub struct MaintenanceDeps {
    pub reconciliation: Arc<ReconciliationUseCases>,
    pub policy: Arc<PolicyUseCases>,
    pub subscription_repo: Arc<dyn SubscriptionRepo>,
    pub user_repo: Arc<dyn UserDirectoryRepo>,
}

pub async fn run_maintenance_loop(deps: MaintenanceDeps, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs));

    // Seed with the current month so a restart never re-runs the reset.
    let now = Utc::now();
    let mut last_reset = (now.year(), now.month());

    info!("Maintenance loop started (ticking every {}s)", interval_secs);

    loop {
        ticker.tick().await;

        if let Err(e) = sweep_expired_subscriptions(&deps).await {
            error!(error = %e, "Expiry sweep failed");
        }
        if let Err(e) = sweep_entitlement_drift(&deps).await {
            error!(error = %e, "Entitlement sweep failed");
        }

        let now = Utc::now();
        let this_month = (now.year(), now.month());
        if this_month != last_reset {
            match deps.policy.monthly_reset().await {
                Ok(_) => last_reset = this_month,
                Err(e) => error!(error = %e, "Monthly quota reset failed, will retry next tick"),
            }
        }
    }
}

/// Downgrade pro subscriptions past their end date: missed renewals move
/// to `expired`, end-of-period cancellations finally drop the plan.
pub async fn sweep_expired_subscriptions(deps: &MaintenanceDeps) -> crate::app_error::AppResult<usize> {
    let expired = deps
        .subscription_repo
        .list_pro_past_end(Utc::now())
        .await?;
    let count = expired.len();
    for sub in &expired {
        if let Err(e) = deps.reconciliation.expire_subscription(sub).await {
            error!(subscription_id = %sub.id, error = %e, "Failed to expire subscription");
        }
    }
    if count > 0 {
        info!(count, "Expired subscriptions past their end date");
    }
    Ok(count)
}

/// Repair the documented consistency window in the User-authoritative
/// direction: a pro user whose subscription row is missing gets one
/// synthesized, mirroring the self-healing read.
pub async fn sweep_entitlement_drift(deps: &MaintenanceDeps) -> crate::app_error::AppResult<usize> {
    let pro_users = deps.user_repo.list_pro_users().await?;
    let mut repaired = 0;
    for user in &pro_users {
        if deps.subscription_repo.get_by_user(user.id).await?.is_none() {
            deps.reconciliation.ensure_subscription_row(user).await?;
            repaired += 1;
        }
    }
    if repaired > 0 {
        info!(repaired, "Synthesized subscription rows for pro users");
    }
    Ok(repaired)
}
