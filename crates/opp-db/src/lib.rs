//! OPP Database — SurrealDB connection management, schema migrations and
//! implementations of the `opp-core` repository traits.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::verify_password;
pub use schema::{run_migrations, schema_v1, schema_version};
