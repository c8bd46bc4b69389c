// Repository layer for metadata-store operations

pub mod doc;
pub mod dsn;
pub mod queries;

pub use doc::DocRepository;
pub use dsn::DsnRepository;
