//! Request handler module
//!
//! Maps requests onto static mounts and renders serve outcomes as responses.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
