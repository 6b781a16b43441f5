//! # Connection Module
//!
//! The seam between provisioning logic and the target server.
//!
//! ## Components
//!
//! - `Connection`: statement execution and scalar/row queries
//! - `Connector`: opens a `Connection` from a `ConnectionDescriptor`
//! - `memory`: in-memory server emulation used by tests
//! - `oracle`: Oracle Instant Client driver (feature `oracle`)
//!
//! Parameters are positional and bound as `:1`, `:2`, ... in statement text.

pub mod errors;
pub mod memory;
#[cfg(feature = "oracle")]
pub mod oracle;

pub use errors::{ConnectionError, ConnectionResult};
pub use memory::InMemoryServer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single bound parameter or result column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    /// Borrow the text content, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

/// Conversion from a column value into a typed destination
pub trait FromValue: Sized {
    fn from_value(value: &Value, column: usize) -> ConnectionResult<Self>;
}

impl FromValue for String {
    fn from_value(value: &Value, column: usize) -> ConnectionResult<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Null => Err(ConnectionError::decode(column, "unexpected NULL")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value, column: usize) -> ConnectionResult<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            // Drivers commonly hand NUMBER columns back as text
            Value::Text(s) => s.trim().parse::<i64>().map_err(|e| {
                ConnectionError::decode(column, format!("'{}' is not an integer: {}", s, e))
            }),
            Value::Null => Err(ConnectionError::decode(column, "unexpected NULL")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value, column: usize) -> ConnectionResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value, column).map(Some)
        }
    }
}

/// One result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Scan column `index` (zero-based) into `T`
    pub fn get<T: FromValue>(&self, index: usize) -> ConnectionResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| ConnectionError::decode(index, "column index out of range"))?;
        T::from_value(value, index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Statement execution against the target server
///
/// Every call is a blocking round-trip.
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the affected row count (0 for DDL)
    fn execute(&self, sql: &str, params: &[Value]) -> ConnectionResult<u64>;

    /// Run a query and collect all rows
    fn query_rows(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>>;

    /// First row of a query, `None` when the query returns no rows
    fn query_row(&self, sql: &str, params: &[Value]) -> ConnectionResult<Option<Row>> {
        Ok(self.query_rows(sql, params)?.into_iter().next())
    }

    /// First column of the first row, `None` when the query returns no rows
    fn query_scalar(&self, sql: &str, params: &[Value]) -> ConnectionResult<Option<Value>> {
        Ok(self
            .query_row(sql, params)?
            .and_then(|row| row.into_values().into_iter().next()))
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&self, sql: &str, params: &[Value]) -> ConnectionResult<u64> {
        (**self).execute(sql, params)
    }

    fn query_rows(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        (**self).query_rows(sql, params)
    }
}

/// Elevated administrative role requested at logon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Sysdba,
    Sysoper,
}

/// Connection descriptor
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub service_name: String,
    #[serde(default)]
    pub admin_role: Option<AdminRole>,
}

impl ConnectionDescriptor {
    /// Easy-connect string: `host:port/service_name`
    pub fn connect_string(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.service_name)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("admin_role", &self.admin_role)
            .finish()
    }
}

/// Opens connections
pub trait Connector: Send + Sync {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> ConnectionResult<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            username: "sys".to_string(),
            password: "hunter2".to_string(),
            host: "db.local".to_string(),
            port: 1521,
            service_name: "ORCLCDB".to_string(),
            admin_role: Some(AdminRole::Sysdba),
        }
    }

    #[test]
    fn test_connect_string() {
        assert_eq!(descriptor().connect_string(), "db.local:1521/ORCLCDB");
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", descriptor());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_row_scanning() {
        let row = Row::new(vec![
            Value::Text("42".to_string()),
            Value::Integer(7),
            Value::Null,
            Value::Text("READ WRITE".to_string()),
        ]);

        assert_eq!(row.get::<i64>(0).unwrap(), 42);
        assert_eq!(row.get::<String>(1).unwrap(), "7");
        assert_eq!(row.get::<Option<String>>(2).unwrap(), None);
        assert_eq!(row.get::<String>(3).unwrap(), "READ WRITE");
        assert!(row.get::<String>(2).is_err());
        assert!(row.get::<i64>(3).is_err());
        assert!(row.get::<String>(9).is_err());
    }

    #[test]
    fn test_admin_role_deserialization() {
        let role: AdminRole = serde_yaml::from_str("sysdba").unwrap();
        assert_eq!(role, AdminRole::Sysdba);
    }
}
