#![deny(unsafe_code)]

//! sockbridge core runtime.
//!
//! Two independent halves of the same "local socket as a tunnel to a
//! privileged broker" setup:
//!
//! - [`relay`] accepts TCP connections and splices each one onto a fresh
//!   Unix domain socket connection.
//! - [`shim`] stands in for a command-line tool, forwarding the invocation to
//!   a broker over a Unix socket and replaying its output, or running the
//!   real tool locally when the broker is not reachable.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future used as the return type of trait
/// methods that need dynamic dispatch (`dyn Trait`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Tracing subscriber setup shared by the binaries.
pub mod logging;
/// TCP → Unix domain socket relay.
pub mod relay;
/// Command shim: request/response protocol, session driver, local fallback.
pub mod shim;

pub use relay::{EnvSocketPath, RelayError, RelayServer, SocketPathProvider, StaticSocketPath};
pub use shim::{CommandRunner, Invocation, LocalRunner, Shim, ShimError, ShimRequest, ShimResponse};
