use chrono::Utc;
use uuid::Uuid;

use crate::domain::entities::{
    plan::Plan,
    user::{FREE_COLLABORATION_REQUESTS, FREE_PROJECT_IDEAS, User},
};

/// Create a free-plan user with sensible defaults, then apply the mutator.
pub fn create_test_user(mutate: impl FnOnce(&mut User)) -> User {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut user = User {
        id,
        identity_id: format!("identity_{}", id.simple()),
        email: format!("user-{}@example.com", id.simple()),
        name: "Test User".to_string(),
        phone: None,
        country_code: Some("NG".to_string()),
        plan: Plan::Free,
        project_ideas_left: FREE_PROJECT_IDEAS,
        collaboration_requests_left: FREE_COLLABORATION_REQUESTS,
        plan_expires_at: None,
        created_at: now,
        updated_at: now,
    };
    mutate(&mut user);
    user
}
