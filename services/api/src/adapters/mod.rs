pub mod db;
pub mod identity;
pub mod storage;

pub use db::PgDatabase;
pub use identity::PgIdentityProvider;
pub use storage::LocalObjectStorage;
