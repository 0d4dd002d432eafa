//! Per-connection resolution of the relay's Unix socket target.
//!
//! The relay asks its provider for the target path on every accepted
//! connection instead of caching it at startup, so the target can be
//! repointed while the relay keeps running.

use std::path::PathBuf;

use sockbridge_config::PROXY_SOCK_ENV;

/// Supplies the Unix socket path a new connection should be bridged to.
pub trait SocketPathProvider: Send + Sync {
    /// The current target path, or `None` when nothing is configured.
    fn socket_path(&self) -> Option<PathBuf>;
}

/// A fixed target path.
#[derive(Debug, Clone)]
pub struct StaticSocketPath(PathBuf);

impl StaticSocketPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl SocketPathProvider for StaticSocketPath {
    fn socket_path(&self) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the target from an environment variable on every call, falling back
/// to the path resolved at startup when the variable is unset or empty.
pub struct EnvSocketPath {
    var: String,
    fallback: Option<PathBuf>,
    lookup: Lookup,
}

impl EnvSocketPath {
    /// Watch `var` in the process environment.
    pub fn new(var: impl Into<String>, fallback: Option<PathBuf>) -> Self {
        Self::with_lookup(var, fallback, |key| std::env::var(key).ok())
    }

    /// Watch `PROXY_SOCK`.
    pub fn proxy_sock(fallback: Option<PathBuf>) -> Self {
        Self::new(PROXY_SOCK_ENV, fallback)
    }

    /// Use a custom variable lookup instead of the process environment.
    pub fn with_lookup<F>(var: impl Into<String>, fallback: Option<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            var: var.into(),
            fallback,
            lookup: Box::new(lookup),
        }
    }
}

impl SocketPathProvider for EnvSocketPath {
    fn socket_path(&self) -> Option<PathBuf> {
        (self.lookup)(&self.var)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.fallback.clone())
    }
}
