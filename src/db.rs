pub mod store;
pub use store::{BillingStore, BillingTx};
pub mod billing_repo;
pub use billing_repo::PgBillingStore;
pub mod memory_store;
pub use memory_store::MemoryBillingStore;
