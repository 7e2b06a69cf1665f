//! Transport backends
//!
//! - [`local`] - directories on the local filesystem
//! - [`sftp`] - remote directories over SSH
//! - [`mail`] - outbound SMTP, send only
//! - [`rpc`] - caller-supplied files, for the RPC entry point
//!
//! All of them apply the shared policy in [`filter`]: glob and age window on
//! the way in, same-name-same-size skip, size checks, and doc-type
//! restriction on the way out.

pub mod factory;
pub mod filter;
pub mod local;
pub mod mail;
pub mod rpc;
pub mod sftp;
pub mod traits;

pub use factory::ConnectionFactory;
pub use rpc::{RpcConnection, RpcFile};
pub use sftp::{MemoryConnector, MemoryRemoteFs, RemoteFs, SftpConnector};
pub use traits::{Connection, TransferContext};
