//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every flat mutation locks the owning home row first and advances its
//! `updated_at` before committing, so the generation marker and the flat rows
//! it describes always change together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listings_core::domain::{
    DrainReport, Flat, FlatUpdate, Home, ModerationStatus, NewFlat, NewHome, NewUser, User,
    UserCredentials,
};
use listings_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(port_error)
    }
}

//=========================================================================================
// Error Translation
//=========================================================================================

fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn home_not_found(home_id: i64) -> PortError {
    PortError::NotFound(format!("house {} not found", home_id))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: String,
    email: String,
    password_hash: String,
    is_admin: bool,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user: User {
                id: self.id,
                email: self.email,
                is_admin: self.is_admin,
            },
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct HomeRecord {
    id: i64,
    address: String,
    year: i32,
    developer: String,
    reviewer: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl HomeRecord {
    fn to_domain(self) -> Home {
        Home {
            id: self.id,
            address: self.address,
            year: self.year,
            developer: self.developer,
            reviewer_id: self.reviewer,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FlatRecord {
    number: i32,
    home_id: i64,
    price: i64,
    rooms: i32,
    status: String,
}
impl FlatRecord {
    fn to_domain(self) -> PortResult<Flat> {
        let status = self
            .status
            .parse::<ModerationStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Flat {
            number: self.number,
            home_id: self.home_id,
            price: self.price,
            rooms: self.rooms,
            status,
        })
    }
}

fn flats_to_domain(records: Vec<FlatRecord>) -> PortResult<Vec<Flat>> {
    records.into_iter().map(FlatRecord::to_domain).collect()
}

const FLAT_COLUMNS: &str = "number, home_id, price, rooms, status";
const HOME_COLUMNS: &str = "id, address, year, developer, reviewer, created_at, updated_at";

//=========================================================================================
// Transaction Helpers
//=========================================================================================

/// Takes the row lock on a home for the rest of the transaction.
async fn lock_home(tx: &mut Transaction<'static, Postgres>, home_id: i64) -> PortResult<()> {
    sqlx::query("SELECT id FROM homes WHERE id = $1 FOR UPDATE")
        .bind(home_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(port_error)?
        .ok_or_else(|| home_not_found(home_id))?;
    Ok(())
}

/// Moves the generation marker strictly forward, even within one clock tick.
async fn advance_generation(tx: &mut Transaction<'static, Postgres>, home_id: i64) -> PortResult<()> {
    sqlx::query(
        "UPDATE homes \
         SET updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond') \
         WHERE id = $1",
    )
    .bind(home_id)
    .execute(&mut **tx)
    .await
    .map_err(port_error)?;
    Ok(())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut tx = self.begin().await?;
        // Regenerate until the id is free. A duplicate email still fails with a
        // unique violation, which maps to `Conflict`.
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            let inserted: Option<(String,)> = sqlx::query_as(
                "INSERT INTO users (id, email, password_hash, is_admin) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO NOTHING RETURNING id",
            )
            .bind(&candidate)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_admin)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| match port_error(e) {
                PortError::Conflict(_) => {
                    PortError::Conflict(format!("user {} already exists", user.email))
                }
                other => other,
            })?;
            if let Some((id,)) = inserted {
                break id;
            }
        };
        tx.commit().await.map_err(port_error)?;

        Ok(User {
            id,
            email: user.email,
            is_admin: user.is_admin,
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password_hash, is_admin FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| PortError::NotFound(format!("user {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn create_home(&self, home: NewHome) -> PortResult<Home> {
        let record = sqlx::query_as::<_, HomeRecord>(&format!(
            "INSERT INTO homes (address, year, developer, reviewer, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) RETURNING {HOME_COLUMNS}"
        ))
        .bind(&home.address)
        .bind(home.year)
        .bind(&home.developer)
        .bind(&home.reviewer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(record.to_domain())
    }

    async fn get_home(&self, home_id: i64) -> PortResult<Home> {
        let record = sqlx::query_as::<_, HomeRecord>(&format!(
            "SELECT {HOME_COLUMNS} FROM homes WHERE id = $1"
        ))
        .bind(home_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?
        .ok_or_else(|| home_not_found(home_id))?;
        Ok(record.to_domain())
    }

    async fn home_generation(&self, home_id: i64) -> PortResult<DateTime<Utc>> {
        let (updated_at,): (DateTime<Utc>,) =
            sqlx::query_as("SELECT updated_at FROM homes WHERE id = $1")
                .bind(home_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(port_error)?
                .ok_or_else(|| home_not_found(home_id))?;
        Ok(updated_at)
    }

    async fn create_flat(&self, flat: NewFlat) -> PortResult<Flat> {
        let mut tx = self.begin().await?;
        lock_home(&mut tx, flat.home_id).await?;

        let record = sqlx::query_as::<_, FlatRecord>(&format!(
            "INSERT INTO flats (number, home_id, price, rooms, status) \
             VALUES ($1, $2, $3, $4, 'created') \
             ON CONFLICT (home_id, number) DO NOTHING RETURNING {FLAT_COLUMNS}"
        ))
        .bind(flat.number)
        .bind(flat.home_id)
        .bind(flat.price)
        .bind(flat.rooms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(port_error)?
        .ok_or_else(|| {
            PortError::Conflict(format!(
                "flat {} already exists in house {}",
                flat.number, flat.home_id
            ))
        })?;

        advance_generation(&mut tx, flat.home_id).await?;
        tx.commit().await.map_err(port_error)?;
        record.to_domain()
    }

    async fn update_flat(&self, update: FlatUpdate) -> PortResult<Flat> {
        let mut tx = self.begin().await?;
        lock_home(&mut tx, update.home_id).await?;

        let record = sqlx::query_as::<_, FlatRecord>(&format!(
            "UPDATE flats SET price = $1, rooms = $2, status = $3 \
             WHERE home_id = $4 AND number = $5 RETURNING {FLAT_COLUMNS}"
        ))
        .bind(update.price)
        .bind(update.rooms)
        .bind(update.status.as_str())
        .bind(update.home_id)
        .bind(update.number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(port_error)?
        .ok_or_else(|| {
            PortError::NotFound(format!(
                "flat {} not found in house {}",
                update.number, update.home_id
            ))
        })?;

        advance_generation(&mut tx, update.home_id).await?;
        tx.commit().await.map_err(port_error)?;
        record.to_domain()
    }

    async fn drain_and_list_flats(&self, home_id: i64) -> PortResult<DrainReport> {
        let mut tx = self.begin().await?;
        lock_home(&mut tx, home_id).await?;

        let drained = sqlx::query(
            "UPDATE flats SET status = 'on_moderation' WHERE home_id = $1 AND status = 'created'",
        )
        .bind(home_id)
        .execute(&mut *tx)
        .await
        .map_err(port_error)?
        .rows_affected();
        if drained > 0 {
            advance_generation(&mut tx, home_id).await?;
        }

        let records = sqlx::query_as::<_, FlatRecord>(&format!(
            "SELECT {FLAT_COLUMNS} FROM flats WHERE home_id = $1 ORDER BY number ASC"
        ))
        .bind(home_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(port_error)?;
        tx.commit().await.map_err(port_error)?;

        Ok(DrainReport {
            drained,
            flats: flats_to_domain(records)?,
        })
    }

    async fn list_approved_flats(&self, home_id: i64) -> PortResult<Vec<Flat>> {
        let records = sqlx::query_as::<_, FlatRecord>(&format!(
            "SELECT {FLAT_COLUMNS} FROM flats WHERE home_id = $1 AND status = 'approved' \
             ORDER BY number ASC"
        ))
        .bind(home_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        flats_to_domain(records)
    }
}
