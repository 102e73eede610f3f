//! clippost - programmatic video publishing through the platform's
//! private web upload API
//!
//! The crate drives the same protocol the web client speaks: a cookie
//! session, a chunked resumable transfer to the content store, and a
//! multi-stage publish handshake signed by an external browser helper.

pub mod caption;
pub mod cli;
pub mod config;
pub mod http;
pub mod publish;
pub mod session;
pub mod signer;
pub mod sigv4;
pub mod upload;
