//! Migration runner, shared by binaries and `#[sqlx::test(migrator = ...)]`
//! integration tests across the workspace.

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations");
