//! Driver layer for Burrow, an interactive multi-backend SQL client.
//!
//! Normalizes connecting to a SQL engine (optionally through an SSH tunnel),
//! running ad hoc and paginated queries, inspecting schema metadata, and
//! applying a user's staged edits as one atomic batch. The UI layer stages
//! edits; [`driver::batch`] plans them; the driver applies the plan inside a
//! single transaction against its one owned connection.

pub mod driver;
pub mod error;
pub mod models;
pub mod services;

pub use driver::{for_provider, MysqlDriver, SqlDriver};
pub use error::{BurrowError, BurrowResult};
