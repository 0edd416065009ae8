mod sqlx_store;

pub use sqlx_store::SqlxBarStore;

use crate::domain::OhlcBar;
use crate::error::PersistError;

/// Database access layer for closed candlesticks. The core uses exactly
/// one operation: one row per call, `(H, L, O, C, Ts)`.
#[async_trait::async_trait]
pub trait BarStore: Send + Sync {
    async fn create_bar(&self, bar: &OhlcBar) -> Result<(), PersistError>;
}
