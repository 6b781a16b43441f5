//! # Connection Errors

use thiserror::Error;

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Connection errors
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Logon failed or the server is unreachable
    #[error("Cannot connect to {target}: {message}")]
    Connect { target: String, message: String },

    /// Statement rejected by the server; `message` carries the server error text
    #[error("{message}")]
    Server { message: String },

    /// A result column could not be converted
    #[error("Cannot decode column {column}: {message}")]
    Decode { column: usize, message: String },

    /// The connection was already released
    #[error("Connection is closed")]
    Closed,
}

impl ConnectionError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn decode(column: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    /// Whether this error means the connection itself is unusable
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_is_verbatim() {
        let err = ConnectionError::server("ORA-00972: identifier is too long");
        assert_eq!(err.to_string(), "ORA-00972: identifier is too long");
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_connectivity() {
        let err = ConnectionError::Connect {
            target: "db:1521/ORCL".to_string(),
            message: "ORA-12541: TNS:no listener".to_string(),
        };
        assert!(err.is_connectivity());
        assert!(err.to_string().contains("db:1521/ORCL"));
        assert!(ConnectionError::Closed.is_connectivity());
    }
}
