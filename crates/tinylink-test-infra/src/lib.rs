//! Disposable containers for integration tests.

pub mod error;
pub mod postgres;

pub use error::{Result, TestInfraError};

use std::path::Path;

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Whether a Docker daemon looks reachable, either through `DOCKER_HOST` or
/// the default local socket.
///
/// Container-backed tests return early when this is false.
pub fn docker_available() -> bool {
    std::env::var_os("DOCKER_HOST").is_some_and(|host| !host.is_empty())
        || Path::new(DOCKER_SOCKET).exists()
}
