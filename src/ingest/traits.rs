use crate::model::{FetchError, Observation};

#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable source tag written into each observation.
    fn name(&self) -> &str;

    async fn fetch_prices(&self) -> Result<Vec<Observation>, FetchError>;
}
