use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::error;

/// Opens a fresh connection for one operation; no pool is kept.
pub fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
    match PgConnection::establish(database_url) {
        Ok(conn) => Ok(conn),
        Err(e) => {
            error!("failed to establish database connection: {}", e);
            Err(e)
        }
    }
}
