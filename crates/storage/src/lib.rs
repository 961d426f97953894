use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Business, BusinessField, BusinessId};

const BUSINESS_COLUMNS: &str = "id, name, address, city, state, zip, phone, email";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Insert payload for a directory row; the id is assigned by the database.
#[derive(Debug, Clone, Default)]
pub struct NewBusiness {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub phone: String,
    pub email: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_business(&self, record: &NewBusiness) -> Result<BusinessId> {
        let rec = sqlx::query(
            "INSERT INTO businesses (name, address, city, state, zip, phone, email)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&record.name)
        .bind(&record.address)
        .bind(&record.city)
        .bind(&record.state)
        .bind(&record.zip)
        .bind(&record.phone)
        .bind(&record.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(BusinessId(rec.get::<i64, _>(0)))
    }

    /// Inserts a batch inside one transaction; a failing row aborts the whole
    /// batch. Returns the number of rows written.
    pub async fn insert_businesses(&self, records: &[NewBusiness]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO businesses (name, address, city, state, zip, phone, email)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.name)
            .bind(&record.address)
            .bind(&record.city)
            .bind(&record.state)
            .bind(&record.zip)
            .bind(&record.phone)
            .bind(&record.email)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len() as u64)
    }

    /// Total row count. Callers treat this as an advisory snapshot.
    pub async fn count_businesses(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Range select ordered by id ascending, the one ordering the grid uses.
    pub async fn list_businesses(&self, offset: i64, limit: i64) -> Result<Vec<Business>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses ORDER BY id ASC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_business).collect())
    }

    /// Which of the given ids actually exist, id ascending. Used as the
    /// defensive pre-check before a bulk update.
    pub async fn existing_business_ids(&self, ids: &[BusinessId]) -> Result<Vec<BusinessId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM businesses WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        query.push(") ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| BusinessId(r.get::<i64, _>(0)))
            .collect())
    }

    /// Sets one column to one value on every row in `ids` and returns the
    /// updated rows, id ascending. The column name always comes from
    /// `BusinessField::column()`, never from caller input.
    pub async fn update_business_field(
        &self,
        field: BusinessField,
        value: &str,
        ids: &[BusinessId],
    ) -> Result<Vec<Business>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE businesses SET ");
        query.push(field.column());
        query.push(" = ");
        query.push_bind(value);
        query.push(" WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        query.push(") RETURNING ");
        query.push(BUSINESS_COLUMNS);

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut updated: Vec<Business> = rows.into_iter().map(row_to_business).collect();
        updated.sort_by_key(|b| b.id);
        Ok(updated)
    }
}

fn row_to_business(row: SqliteRow) -> Business {
    Business {
        id: BusinessId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        address: row.get::<String, _>(2),
        city: row.get::<String, _>(3),
        state: row.get::<String, _>(4),
        zip: row.get::<String, _>(5),
        phone: row.get::<String, _>(6),
        email: row.get::<String, _>(7),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
