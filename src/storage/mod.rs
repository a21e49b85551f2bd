pub mod cache_dir;
pub mod plan_store;

pub use cache_dir::default_cache_dir;
pub use plan_store::{PlanStore, StoreEntry};
