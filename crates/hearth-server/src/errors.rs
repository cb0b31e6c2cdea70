//! Server error types.

use std::net::SocketAddr;

/// Errors raised while starting or running the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured host/port could not be resolved to a socket address.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: denied");
    }

    #[test]
    fn invalid_address_display() {
        let err = ServerError::InvalidAddress("nowhere:x".into());
        assert!(err.to_string().contains("nowhere:x"));
    }
}
