//! Client library for the AMS data server.
//!
//! ```rust,no_run
//! use ams_client::{ClientConfig, DataClient};
//! use ams_protocol::Command;
//!
//! # async fn demo() -> ams_client::Result<()> {
//! let client = DataClient::new(ClientConfig::default());
//! let response = client.fetch(Command::GetSysData).await?;
//! if let Some(payload) = response.payload() {
//!     println!("{:?}", payload.system().get("memtotal"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod sample;

pub use client::{request, ClientConfig, DataClient, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{ClientError, Result};
pub use sample::{Sample, Sampler};
