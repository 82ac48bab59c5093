use rusqlite::{Connection, Transaction};

use crate::error::{Error, Result};

const CURRENT_SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|err| Error::Storage(format!("failed to read user_version pragma: {err}")))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(Error::Storage(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|err| Error::Storage(format!("failed to open migration transaction: {err}")))?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .map_err(|err| Error::Storage(format!("migration to version {next_version} failed: {err}")))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .map_err(|err| Error::Storage(format!("failed to update user_version pragma: {err}")))?;
    tx.commit()
        .map_err(|err| Error::Storage(format!("failed to commit migrations: {err}")))?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))?;
            Ok(())
        }
        _ => Err(Error::Storage(format!(
            "unknown migration target version: {version}"
        ))),
    }
}
