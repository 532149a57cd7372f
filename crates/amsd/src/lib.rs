//! AMS Daemon - Metric data server
//!
//! This crate provides the server side of the AMS data protocol:
//! - `registry` - Command registry validating and dispatching requests
//! - `server` - Sequential TCP server, one exchange per connection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        amsd server                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   DataServer    │────▶│      CommandRegistry        │   │
//! │  │ (TCP listener)  │     │ (version + range checks)    │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ one at a time               │ dispatch          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │   dyn DataProvider          │   │
//! │  │ (request/reply) │     │   (sysfs, or a test double) │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The channel is plaintext and unauthenticated; anyone who can reach the
//! port can read the partition's memory statistics.

pub mod registry;
pub mod server;

pub use registry::{CommandRegistry, RequestError};
pub use server::{DataServer, ServerConfig, ServerError, DEFAULT_PORT};
