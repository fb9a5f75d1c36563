use async_trait::async_trait;

/// Global counter bounding concurrent beta promotions. All mutation is
/// conditional-increment/decrement against the store; callers never
/// read-then-write the count.
#[async_trait]
pub trait BetaSlotRepository: Send + Sync {
    async fn is_initialized(&self) -> Result<bool, sqlx::Error>;

    /// Seeds the singleton counter row. A concurrent initializer winning
    /// the insert race is not an error.
    async fn initialize(&self, claimed: i64) -> Result<(), sqlx::Error>;

    /// Increments only while the count is below `cap`. Returns false when
    /// the cap is reached (no slot claimed).
    async fn try_claim(&self, cap: i64) -> Result<bool, sqlx::Error>;

    /// Decrements only while the count is positive. Returns false when
    /// there was nothing to release.
    async fn release(&self) -> Result<bool, sqlx::Error>;
}
