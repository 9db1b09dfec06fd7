use sqlx::PgPool;

/// Executes single-statement commands against the pool.
///
/// Every SQL command in [`crate::entities`] is a `kanau` processor on this
/// type. Multi-statement work that must be atomic goes through the
/// `*_tx` helpers on the entities instead.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;
