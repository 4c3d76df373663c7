pub mod eia;
pub mod kenya;
pub mod loader;
pub mod traits;

pub use eia::EiaClient;
pub use kenya::KenyaFuelClient;
pub use loader::DataLoader;
pub use traits::PriceProvider;
