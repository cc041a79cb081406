use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::plan::Plan;

/// Monthly quota of AI project ideas on the free plan.
pub const FREE_PROJECT_IDEAS: i32 = 3;
/// Monthly quota of collaboration requests on the free plan.
pub const FREE_COLLABORATION_REQUESTS: i32 = 5;
/// Sentinel quota for pro users; large enough to never be exhausted
/// within a billing period.
pub const UNLIMITED_QUOTA: i32 = 1_000_000;

/// A user record as seen by the billing engine.
///
/// The row is owned by the authentication/profile subsystem; this service
/// only mutates the entitlement fields (`plan`, quotas, `plan_expires_at`).
/// Invariant: `plan == Pro` implies `plan_expires_at` is set.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// External identity id issued by the auth provider (JWT `sub`).
    pub identity_id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub country_code: Option<String>,
    pub plan: Plan,
    pub project_ideas_left: i32,
    pub collaboration_requests_left: i32,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which monthly quota a request spends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    ProjectIdeas,
    CollaborationRequests,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::ProjectIdeas => "project_ideas",
            QuotaKind::CollaborationRequests => "collaboration_requests",
        }
    }
}

/// Base quotas for a plan, applied on signup, downgrade and monthly reset.
pub fn base_quotas(plan: Plan) -> (i32, i32) {
    match plan {
        Plan::Free => (FREE_PROJECT_IDEAS, FREE_COLLABORATION_REQUESTS),
        Plan::Pro => (UNLIMITED_QUOTA, UNLIMITED_QUOTA),
    }
}
