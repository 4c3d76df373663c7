pub mod sqlite;

pub use sqlite::{GroupAverage, SqliteStorage};
