//! Integration tests for error types

#[cfg(test)]
mod tests {
    use sluice_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::Timeout {
            url: "https://example.com".into(),
        };
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_status_classification() {
        let server = NetworkError::from_status(503, "Service Unavailable");
        assert!(matches!(server, NetworkError::ServerError { status: 503, .. }));
        assert!(server.is_retryable());

        let client = NetworkError::from_status(404, "Not Found");
        assert!(client.is_client_error());
        assert!(!client.is_retryable());
        assert_eq!(client.user_code(), Some("network.client_error"));
    }

    #[test]
    fn test_fatal_network_errors_are_not_retryable() {
        let errors = [
            NetworkError::PartialContentNotSupported { status: 200 },
            NetworkError::RangeMismatch {
                requested: 450,
                served: 0,
            },
            NetworkError::InvalidUrl("nope".into()),
            NetworkError::CredentialsUnavailable("token endpoint refused".into()),
            NetworkError::RetriesExhausted {
                attempts: 5,
                last_error: "reset".into(),
            },
        ];
        for err in errors {
            assert!(!err.is_retryable(), "{err} should be fatal");
        }
    }

    #[test]
    fn test_process_failure_message_includes_stderr() {
        let err = TransferError::ProcessFailed {
            exit_code: Some(3),
            stderr_tail: "bad key".into(),
        };
        assert_eq!(err.to_string(), "decryption process exited with code 3");
        assert_eq!(
            err.user_message(),
            "decryption process exited with code 3: bad key"
        );

        let signalled = TransferError::ProcessFailed {
            exit_code: None,
            stderr_tail: String::new(),
        };
        assert_eq!(signalled.to_string(), "decryption process exited with a signal");
    }

    #[test]
    fn test_error_clone() {
        let err = ConfigError::InvalidValue {
            field: "retry.max_attempts".into(),
            value: "0".into(),
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = Error::io_with_path(&io_err, "/tmp/out.bin");
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io { path: Some(_), .. }));
    }

    #[test]
    fn test_cancelled_is_not_retryable() {
        assert!(!Error::Cancelled.is_retryable());
        assert_eq!(Error::Cancelled.user_code(), Some("error.cancelled"));
    }
}
