// Metadata store: template documents and DSN records in PostgreSQL

pub mod pool;
pub mod repositories;
pub mod store;

pub use pool::DbPool;
pub use store::PgTemplateStore;
