//! crates/listings_core/src/testing.rs
//!
//! In-memory implementations of the ports, with switches for simulating an
//! outage or a slow backend. Used by the core's unit tests and, through the
//! `testing` feature, by the api service's HTTP tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{
    DrainReport, Flat, FlatUpdate, Home, ModerationStatus, NewFlat, NewHome, NewUser, User,
    UserCredentials,
};
use crate::moderation;
use crate::ports::{DatabaseService, KeyValueStore, PortError, PortResult};

//=========================================================================================
// Shared switches
//=========================================================================================

#[derive(Default)]
struct Faults {
    down: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Faults {
    async fn enter(&self, backend: &str) -> PortResult<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable(format!("{backend} is down")));
        }
        Ok(())
    }
}

//=========================================================================================
// Key-value store
//=========================================================================================

/// A TTL map keyed on tokio's clock, so paused-time tests can expire entries.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    faults: Faults,
    writes: AtomicUsize,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.faults.down.store(!available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock().unwrap() = latency;
    }

    /// Live (unexpired) keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        self.faults.enter("key-value store").await?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> PortResult<()> {
        self.faults.enter("key-value store").await?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    homes: BTreeMap<i64, Home>,
    flats: BTreeMap<(i64, i32), Flat>,
    next_home_id: i64,
}

impl Tables {
    fn home_mut(&mut self, home_id: i64) -> PortResult<&mut Home> {
        self.homes
            .get_mut(&home_id)
            .ok_or_else(|| PortError::NotFound(format!("home {home_id} not found")))
    }

    fn flats_of(&self, home_id: i64) -> impl Iterator<Item = &Flat> {
        self.flats.range((home_id, i32::MIN)..=(home_id, i32::MAX)).map(|(_, f)| f)
    }
}

/// Mirrors the PostgreSQL adapter: every method runs "in one transaction" by
/// holding the table lock for its whole body.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    faults: Faults,
    approved_reads: AtomicUsize,
    drains: AtomicUsize,
}

/// Truncates to microseconds, the resolution PostgreSQL keeps.
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap_or(now)
}

fn advance_generation(home: &mut Home) {
    let floor = home.updated_at + ChronoDuration::microseconds(1);
    home.updated_at = now_micros().max(floor);
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.faults.down.store(!available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock().unwrap() = latency;
    }

    /// Inserts a home with a chosen id, bypassing `create_home`.
    pub fn seed_home(&self, id: i64, reviewer_id: &str) -> Home {
        let now = now_micros();
        let home = Home {
            id,
            address: format!("{id} Test Street"),
            year: 2001,
            developer: String::new(),
            reviewer_id: reviewer_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.next_home_id = tables.next_home_id.max(id);
        tables.homes.insert(id, home.clone());
        home
    }

    /// Overwrites a flat's status directly, without touching the generation marker.
    pub fn force_status(&self, home_id: i64, number: i32, status: ModerationStatus) {
        if let Some(flat) = self.tables.lock().unwrap().flats.get_mut(&(home_id, number)) {
            flat.status = status;
        }
    }

    pub fn home(&self, home_id: i64) -> Option<Home> {
        self.tables.lock().unwrap().homes.get(&home_id).cloned()
    }

    pub fn flat(&self, home_id: i64, number: i32) -> Option<Flat> {
        self.tables.lock().unwrap().flats.get(&(home_id, number)).cloned()
    }

    /// Number of `list_approved_flats` calls, i.e. public cache misses.
    pub fn approved_reads(&self) -> usize {
        self.approved_reads.load(Ordering::SeqCst)
    }

    pub fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        self.faults.enter("database").await?;
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|c| c.user.email == user.email) {
            return Err(PortError::Conflict(format!("user {} already exists", user.email)));
        }
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !tables.users.iter().any(|c| c.user.id == candidate) {
                break candidate;
            }
        };
        let created = User {
            id,
            email: user.email,
            is_admin: user.is_admin,
        };
        tables.users.push(UserCredentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.faults.enter("database").await?;
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {email} not found")))
    }

    async fn create_home(&self, home: NewHome) -> PortResult<Home> {
        self.faults.enter("database").await?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_home_id += 1;
        let now = now_micros();
        let created = Home {
            id: tables.next_home_id,
            address: home.address,
            year: home.year,
            developer: home.developer,
            reviewer_id: home.reviewer_id,
            created_at: now,
            updated_at: now,
        };
        tables.homes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_home(&self, home_id: i64) -> PortResult<Home> {
        self.faults.enter("database").await?;
        Ok(self.tables.lock().unwrap().home_mut(home_id)?.clone())
    }

    async fn home_generation(&self, home_id: i64) -> PortResult<DateTime<Utc>> {
        self.faults.enter("database").await?;
        Ok(self.tables.lock().unwrap().home_mut(home_id)?.updated_at)
    }

    async fn create_flat(&self, flat: NewFlat) -> PortResult<Flat> {
        self.faults.enter("database").await?;
        let mut tables = self.tables.lock().unwrap();
        tables.home_mut(flat.home_id)?;
        if tables.flats.contains_key(&(flat.home_id, flat.number)) {
            return Err(PortError::Conflict(format!(
                "flat {} already exists in home {}",
                flat.number, flat.home_id
            )));
        }
        let created = Flat {
            number: flat.number,
            home_id: flat.home_id,
            price: flat.price,
            rooms: flat.rooms,
            status: ModerationStatus::INITIAL,
        };
        tables.flats.insert((flat.home_id, flat.number), created.clone());
        advance_generation(tables.home_mut(flat.home_id)?);
        Ok(created)
    }

    async fn update_flat(&self, update: FlatUpdate) -> PortResult<Flat> {
        self.faults.enter("database").await?;
        let mut tables = self.tables.lock().unwrap();
        tables.home_mut(update.home_id)?;
        let flat = tables
            .flats
            .get_mut(&(update.home_id, update.number))
            .ok_or_else(|| {
                PortError::NotFound(format!(
                    "flat {} not found in home {}",
                    update.number, update.home_id
                ))
            })?;
        flat.price = update.price;
        flat.rooms = update.rooms;
        flat.status = update.status;
        let updated = flat.clone();
        advance_generation(tables.home_mut(update.home_id)?);
        Ok(updated)
    }

    async fn drain_and_list_flats(&self, home_id: i64) -> PortResult<DrainReport> {
        self.faults.enter("database").await?;
        self.drains.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().unwrap();
        tables.home_mut(home_id)?;

        let mut flats: Vec<Flat> = tables.flats_of(home_id).cloned().collect();
        let drained = moderation::drain(&mut flats);
        if drained > 0 {
            for flat in &flats {
                tables.flats.insert((flat.home_id, flat.number), flat.clone());
            }
            advance_generation(tables.home_mut(home_id)?);
        }
        Ok(DrainReport {
            drained: drained as u64,
            flats,
        })
    }

    async fn list_approved_flats(&self, home_id: i64) -> PortResult<Vec<Flat>> {
        self.faults.enter("database").await?;
        self.approved_reads.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .flats_of(home_id)
            .filter(|f| f.status.is_publicly_visible())
            .cloned()
            .collect())
    }
}
