//! Command handlers for the taskflow CLI. Each module implements one
//! subcommand against the database directly — there is no server process
//! to delegate to, the Core is a library the CLI links in the same way an
//! embedding application would.

pub mod cancel;
pub mod get;
pub mod graph;
pub mod list_handlers;
pub mod submit;

pub use cancel::run as run_cancel;
pub use get::run as run_get;
pub use graph::run as run_graph;
pub use list_handlers::run as run_list_handlers;
pub use submit::run as run_submit;
