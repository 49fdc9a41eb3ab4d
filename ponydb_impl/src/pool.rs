//! `r2d2` connection pooling (§10, ambient: not part of the core protocol,
//! but the natural companion to a synchronous, blocking driver used from a
//! multi-threaded server).

use crate::config::ConnectionConfiguration;
use crate::conn::ConnectParams;
use crate::connection::Connection;
use crate::error::HdbError;

/// An [`r2d2::ManageConnection`] that opens fresh [`Connection`]s against a
/// fixed [`ConnectParams`]/[`ConnectionConfiguration`] pair.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    params: ConnectParams,
    config: ConnectionConfiguration,
}

impl ConnectionManager {
    pub fn new(params: ConnectParams, config: ConnectionConfiguration) -> Self {
        Self { params, config }
    }
}

impl r2d2::ManageConnection for ConnectionManager {
    type Connection = Connection;
    type Error = HdbError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::connect(self.params.clone(), self.config.clone())
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if conn.is_closed() {
            return Err(HdbError::ConnectionClosed);
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
