use chrono::DateTime;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::OhlcBar;
use crate::error::PersistError;
use crate::persist::BarStore;

/// `BarStore` backed by Postgres via `sqlx`. The `bar` table holds
/// `(h, l, o, c numeric, ts timestamptz)`; the core never creates or
/// migrates this schema.
pub struct SqlxBarStore {
    pool: PgPool,
}

impl SqlxBarStore {
    pub async fn connect(dburi: &str) -> Result<Self, PersistError> {
        let pool = PgPool::connect(dburi)
            .await
            .map_err(PersistError::Connect)?;
        Ok(Self { pool })
    }
}

fn decimal(column: &'static str, value: &str) -> Result<Decimal, PersistError> {
    value.parse().map_err(|_| PersistError::Decimal {
        column,
        value: value.to_string(),
    })
}

#[async_trait::async_trait]
impl BarStore for SqlxBarStore {
    async fn create_bar(&self, bar: &OhlcBar) -> Result<(), PersistError> {
        let h = decimal("h", &bar.high)?;
        let l = decimal("l", &bar.low)?;
        let o = decimal("o", &bar.open)?;
        let c = decimal("c", &bar.close)?;
        let ts = DateTime::from_timestamp(bar.trade_time, 0).ok_or_else(|| PersistError::Decimal {
            column: "ts",
            value: bar.trade_time.to_string(),
        })?;

        sqlx::query("INSERT INTO bar (h, l, o, c, ts) VALUES ($1, $2, $3, $4, $5)")
            .bind(h)
            .bind(l)
            .bind(o)
            .bind(c)
            .bind(ts)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
