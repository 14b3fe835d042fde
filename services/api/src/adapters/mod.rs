pub mod db;
pub mod memory;

pub use db::PgDatabase;
pub use memory::InMemoryDatabase;
