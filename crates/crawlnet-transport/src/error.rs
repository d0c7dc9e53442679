/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint is not reachable (unknown, offline, or link closed).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// Binding the local listener failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// A serialized endpoint address could not be decoded.
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// The network is not available.
    #[error("network offline")]
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure() {
        assert_eq!(TransportError::Offline.to_string(), "network offline");
        assert_eq!(
            TransportError::Unreachable("loop-3".into()).to_string(),
            "endpoint unreachable: loop-3"
        );
        let bind = TransportError::BindFailed(std::io::ErrorKind::AddrInUse.into());
        assert!(bind.to_string().starts_with("bind failed"));
        assert!(std::error::Error::source(&bind).is_some());
    }
}
