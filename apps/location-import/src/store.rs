//! Database writes for the importer.

use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::error::ImportError;
use crate::tracking::{ImportRecord, ImportStatus};

/// Two binds per district row keeps a chunk well under Postgres' bind limit.
const DISTRICT_CHUNK: usize = 1000;

pub async fn fetch_import(pool: &PgPool, file_name: &str) -> Result<Option<ImportRecord>, ImportError> {
    let row = sqlx::query("SELECT file_hash, status FROM data_imports WHERE file_name = $1")
        .bind(file_name)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let status: String = row.try_get("status")?;
            Ok(Some(ImportRecord {
                file_hash: row.try_get("file_hash")?,
                status: status.parse()?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn mark_processing(pool: &PgPool, file_name: &str, hash: &str) -> Result<(), ImportError> {
    sqlx::query(
        "INSERT INTO data_imports (file_name, file_hash, status, started_at) \
         VALUES ($1, $2, $3, now()) \
         ON CONFLICT (file_name) DO UPDATE SET \
             file_hash = EXCLUDED.file_hash, status = EXCLUDED.status, \
             started_at = now(), completed_at = NULL, error_message = NULL, records_processed = 0",
    )
    .bind(file_name)
    .bind(hash)
    .bind(ImportStatus::Processing.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_completed(pool: &PgPool, file_name: &str, records: usize) -> Result<(), ImportError> {
    sqlx::query(
        "UPDATE data_imports SET status = $2, records_processed = $3, completed_at = now() \
         WHERE file_name = $1",
    )
    .bind(file_name)
    .bind(ImportStatus::Completed.as_str())
    .bind(i32::try_from(records).unwrap_or(i32::MAX))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, file_name: &str, message: &str) -> Result<(), ImportError> {
    sqlx::query(
        "UPDATE data_imports SET status = $2, error_message = $3, completed_at = now() \
         WHERE file_name = $1",
    )
    .bind(file_name)
    .bind(ImportStatus::Failed.as_str())
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Names and codes already stored.
pub async fn existing_states(conn: &mut PgConnection) -> Result<HashMap<String, String>, ImportError> {
    let rows = sqlx::query("SELECT name, code FROM states")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| -> Result<(String, String), ImportError> {
            Ok((row.try_get("name")?, row.try_get("code")?))
        })
        .collect()
}

pub async fn insert_states(
    conn: &mut PgConnection,
    states: &[(String, String)],
) -> Result<u64, ImportError> {
    if states.is_empty() {
        return Ok(0);
    }
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO states (name, code) ");
    qb.push_values(states, |mut b, (name, code)| {
        b.push_bind(name.clone()).push_bind(code.clone());
    });
    qb.push(" ON CONFLICT (name) DO NOTHING");
    Ok(qb.build().execute(&mut *conn).await?.rows_affected())
}

pub async fn state_ids(conn: &mut PgConnection) -> Result<HashMap<String, i32>, ImportError> {
    let rows = sqlx::query("SELECT id, name FROM states")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| -> Result<(String, i32), ImportError> {
            Ok((row.try_get("name")?, row.try_get("id")?))
        })
        .collect()
}

pub async fn insert_districts(
    conn: &mut PgConnection,
    districts: &HashSet<(i32, String)>,
) -> Result<u64, ImportError> {
    let rows: Vec<&(i32, String)> = districts.iter().collect();
    let mut inserted = 0;
    for chunk in rows.chunks(DISTRICT_CHUNK) {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO districts (state_id, name) ");
        qb.push_values(chunk, |mut b, (state_id, name)| {
            b.push_bind(*state_id).push_bind(name.clone());
        });
        qb.push(" ON CONFLICT (state_id, name) DO NOTHING");
        inserted += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}
