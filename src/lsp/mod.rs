//! Language server front end: full-text sync in, diagnostics out.

pub mod backend;
pub mod document;
pub mod server;

pub use backend::Backend;
