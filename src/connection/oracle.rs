//! # Oracle Driver
//!
//! `Connection` implementation over Oracle Instant Client (ODPI-C).
//! Requires the client libraries at runtime, not at build time.

use oracle::sql_type::ToSql;
use oracle::{Connector as OracleLogon, Privilege};

use super::errors::{ConnectionError, ConnectionResult};
use super::{AdminRole, Connection, ConnectionDescriptor, Connector, Row, Value};

/// Live connection to an Oracle server
pub struct OracleConnection {
    inner: oracle::Connection,
}

impl OracleConnection {
    /// Log on with the given descriptor
    pub fn connect(descriptor: &ConnectionDescriptor) -> ConnectionResult<Self> {
        let target = descriptor.connect_string();
        let mut logon = OracleLogon::new(
            descriptor.username.as_str(),
            descriptor.password.as_str(),
            target.as_str(),
        );
        match descriptor.admin_role {
            Some(AdminRole::Sysdba) => {
                logon.privilege(Privilege::Sysdba);
            }
            Some(AdminRole::Sysoper) => {
                logon.privilege(Privilege::Sysoper);
            }
            None => {}
        }

        let mut inner = logon.connect().map_err(|e| ConnectionError::Connect {
            target: target.clone(),
            message: e.to_string(),
        })?;
        inner.set_autocommit(true);

        tracing::debug!(%target, user = %descriptor.username, "connected");
        Ok(Self { inner })
    }

    /// Release the session now instead of waiting for drop
    pub fn close(self) -> ConnectionResult<()> {
        self.inner
            .close()
            .map_err(|e| ConnectionError::server(e.to_string()))
    }
}

/// Text values are bound as `String`, integers as `i64`
fn bind(params: &[Value]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Integer(i) => Box::new(*i),
                Value::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

impl Connection for OracleConnection {
    fn execute(&self, sql: &str, params: &[Value]) -> ConnectionResult<u64> {
        let owned = bind(params);
        let bound: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
        let stmt = self
            .inner
            .execute(sql, &bound)
            .map_err(|e| ConnectionError::server(e.to_string()))?;
        stmt.row_count()
            .map_err(|e| ConnectionError::server(e.to_string()))
    }

    fn query_rows(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        let owned = bind(params);
        let bound: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
        let result_set = self
            .inner
            .query(sql, &bound)
            .map_err(|e| ConnectionError::server(e.to_string()))?;

        let mut rows = Vec::new();
        for row in result_set {
            let row = row.map_err(|e| ConnectionError::server(e.to_string()))?;
            let width = row.sql_values().len();
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let text: Option<String> = row
                    .get(idx)
                    .map_err(|e| ConnectionError::decode(idx, e.to_string()))?;
                values.push(text.map(Value::Text).unwrap_or(Value::Null));
            }
            rows.push(Row::new(values));
        }
        Ok(rows)
    }
}

/// Connector handing out `OracleConnection`s
#[derive(Debug, Default, Clone, Copy)]
pub struct OracleConnector;

impl Connector for OracleConnector {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> ConnectionResult<Box<dyn Connection>> {
        Ok(Box::new(OracleConnection::connect(descriptor)?))
    }
}
