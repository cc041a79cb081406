use sqlx::PgPool;

pub mod payment;
pub mod subscription;
pub mod user;

/// Postgres-backed implementation of the repository traits. One shared pool;
/// trait impls live in the sibling modules.
#[derive(Clone)]
pub struct PostgresPersistence {
    pub(crate) pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
