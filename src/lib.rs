pub mod app;
pub mod board;
pub mod cache;
pub mod cli;
pub mod constants;
pub mod models;
pub mod utils;

pub use app::{load_config, Config};
pub use board::{Dashboard, Task};
pub use cache::{Fingerprint, FingerprintCache, Generator, Resolution};
pub use utils::InsightCacheError;
