//! crates/listings_core/src/service.rs
//!
//! The listing orchestrator. Chooses between the moderator path (drain, then
//! read fresh from persistence, never cached) and the client path (read through
//! the generation-keyed cache, approved flats only), and hosts the home and
//! flat mutations.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ListingCache;
use crate::deadline::{detached, within};
use crate::domain::{Flat, FlatUpdate, GenerationMarker, Home, NewFlat, NewHome, SessionClaims};
use crate::error::{ServiceError, ServiceResult};
use crate::ports::DatabaseService;

#[derive(Clone)]
pub struct ListingService {
    db: Arc<dyn DatabaseService>,
    cache: ListingCache,
    db_deadline: Duration,
}

impl ListingService {
    pub fn new(db: Arc<dyn DatabaseService>, cache: ListingCache, db_deadline: Duration) -> Self {
        Self {
            db,
            cache,
            db_deadline,
        }
    }

    //=====================================================================================
    // Listing
    //=====================================================================================

    /// Lists the flats of a home as seen by `caller`.
    ///
    /// Moderators get every flat, after the drain. Everyone else gets the
    /// approved subset, possibly from cache.
    pub async fn list_units(&self, home_id: i64, caller: &SessionClaims) -> ServiceResult<Vec<Flat>> {
        if caller.is_admin {
            self.moderation_listing(home_id).await
        } else {
            self.public_listing(home_id).await
        }
    }

    /// Drains `created` flats into `on_moderation` and returns the home's full,
    /// post-drain flat set. Bypasses the cache in both directions.
    pub async fn moderation_listing(&self, home_id: i64) -> ServiceResult<Vec<Flat>> {
        let db = self.db.clone();
        let report = detached(self.db_deadline, "drain and list flats", async move {
            db.drain_and_list_flats(home_id).await
        })
        .await?;
        if report.drained > 0 {
            info!(home_id, drained = report.drained, "flats moved to moderation");
        }
        Ok(report.flats)
    }

    /// Approved flats of a home, read through the cache under the home's current
    /// generation marker.
    pub async fn public_listing(&self, home_id: i64) -> ServiceResult<Vec<Flat>> {
        let updated_at = within(
            self.db_deadline,
            "home generation",
            self.db.home_generation(home_id),
        )
        .await?;
        let marker = GenerationMarker::from(updated_at);

        match self.cache.get(home_id, marker).await {
            Ok(Some(flats)) => {
                debug!(home_id, %marker, "listing cache hit");
                return Ok(flats);
            }
            Ok(None) => debug!(home_id, %marker, "listing cache miss"),
            Err(e) => warn!(home_id, error = %e, "listing cache unavailable, reading from database"),
        }

        let flats = within(
            self.db_deadline,
            "list approved flats",
            self.db.list_approved_flats(home_id),
        )
        .await?;

        // The caller still gets the fresh result; a failed write only costs a
        // miss next time.
        if let Err(e) = self.cache.put(home_id, marker, &flats).await {
            warn!(home_id, %marker, error = %e, "failed to cache listing");
        }
        Ok(flats)
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Registers a home. Moderators only; the caller becomes its reviewer.
    pub async fn create_home(
        &self,
        caller: &SessionClaims,
        address: String,
        year: i32,
        developer: String,
    ) -> ServiceResult<Home> {
        if !caller.is_admin {
            return Err(ServiceError::Forbidden(
                "only moderators can create houses".to_string(),
            ));
        }
        let db = self.db.clone();
        let new_home = NewHome {
            address,
            year,
            developer,
            reviewer_id: caller.user_id.clone(),
        };
        let home = detached(self.db_deadline, "create home", async move {
            db.create_home(new_home).await
        })
        .await?;
        info!(home_id = home.id, "home created");
        Ok(home)
    }

    /// Adds a flat in the `created` state. Open to any authenticated caller.
    pub async fn create_flat(&self, _caller: &SessionClaims, flat: NewFlat) -> ServiceResult<Flat> {
        let db = self.db.clone();
        let created = detached(self.db_deadline, "create flat", async move {
            db.create_flat(flat).await
        })
        .await?;
        info!(home_id = created.home_id, number = created.number, "flat created");
        Ok(created)
    }

    /// Sets a flat's price, rooms and status. Only the moderator that reviews
    /// the home may do this; any target status is allowed.
    pub async fn update_flat(&self, caller: &SessionClaims, update: FlatUpdate) -> ServiceResult<Flat> {
        if !caller.is_admin {
            return Err(ServiceError::Forbidden(
                "only moderators can update flats".to_string(),
            ));
        }
        let home = within(self.db_deadline, "get home", self.db.get_home(update.home_id)).await?;
        if home.reviewer_id != caller.user_id {
            return Err(ServiceError::Forbidden(
                "only the house reviewer can moderate its flats".to_string(),
            ));
        }

        let db = self.db.clone();
        let updated = detached(self.db_deadline, "update flat", async move {
            db.update_flat(update).await
        })
        .await?;
        info!(
            home_id = updated.home_id,
            number = updated.number,
            status = %updated.status,
            "flat updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModerationStatus;
    use crate::testing::{InMemoryDatabase, InMemoryKeyValueStore};

    const DB_DEADLINE: Duration = Duration::from_millis(500);
    const CACHE_DEADLINE: Duration = Duration::from_millis(100);
    const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

    struct Harness {
        db: Arc<InMemoryDatabase>,
        kv: Arc<InMemoryKeyValueStore>,
        service: ListingService,
    }

    fn harness() -> Harness {
        let db = Arc::new(InMemoryDatabase::new());
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let cache = ListingCache::new(kv.clone(), CACHE_TTL, CACHE_DEADLINE);
        let service = ListingService::new(db.clone(), cache, DB_DEADLINE);
        Harness { db, kv, service }
    }

    fn moderator(id: &str) -> SessionClaims {
        SessionClaims {
            user_id: id.to_string(),
            is_admin: true,
        }
    }

    fn client() -> SessionClaims {
        SessionClaims {
            user_id: "client-1".to_string(),
            is_admin: false,
        }
    }

    fn new_flat(home_id: i64, number: i32) -> NewFlat {
        NewFlat {
            home_id,
            number,
            price: 7_500_000,
            rooms: 2,
        }
    }

    fn approve(home_id: i64, number: i32) -> FlatUpdate {
        FlatUpdate {
            home_id,
            number,
            price: 7_500_000,
            rooms: 2,
            status: ModerationStatus::Approved,
        }
    }

    fn status_of(flats: &[Flat], number: i32) -> Option<ModerationStatus> {
        flats.iter().find(|f| f.number == number).map(|f| f.status)
    }

    fn marker_of(h: &Harness, home_id: i64) -> GenerationMarker {
        h.db.home(home_id).unwrap().generation()
    }

    #[tokio::test]
    async fn new_flat_invalidates_cached_listing_by_key() {
        let h = harness();
        h.db.seed_home(42, "mod-1");
        let t0 = marker_of(&h, 42);

        assert!(h.service.list_units(42, &client()).await.unwrap().is_empty());
        assert_eq!(h.kv.keys(), vec![ListingCache::key(42, t0)]);

        h.service.create_flat(&moderator("mod-1"), new_flat(42, 7)).await.unwrap();
        let t1 = marker_of(&h, 42);
        assert!(t1 > t0);

        // Flat 7 is still `created`, so the client sees nothing, but the result
        // now lives under the new generation.
        assert!(h.service.list_units(42, &client()).await.unwrap().is_empty());
        assert_eq!(h.db.approved_reads(), 2);
        let mut expected = vec![ListingCache::key(42, t0), ListingCache::key(42, t1)];
        expected.sort();
        assert_eq!(h.kv.keys(), expected);
    }

    #[tokio::test]
    async fn repeated_client_reads_hit_the_cache() {
        let h = harness();
        h.db.seed_home(5, "mod");
        h.service.list_units(5, &client()).await.unwrap();
        h.service.list_units(5, &client()).await.unwrap();
        h.service.list_units(5, &client()).await.unwrap();
        assert_eq!(h.db.approved_reads(), 1);
    }

    #[tokio::test]
    async fn approval_is_visible_to_the_next_client_read() {
        let h = harness();
        h.db.seed_home(1, "mod-1");
        let m = moderator("mod-1");
        h.service.create_flat(&m, new_flat(1, 10)).await.unwrap();
        assert!(h.service.list_units(1, &client()).await.unwrap().is_empty());

        h.service.update_flat(&m, approve(1, 10)).await.unwrap();
        let flats = h.service.list_units(1, &client()).await.unwrap();
        assert_eq!(flats.len(), 1);
        assert_eq!(flats[0].status, ModerationStatus::Approved);

        // And un-approving hides it again.
        let mut decline = approve(1, 10);
        decline.status = ModerationStatus::Declined;
        h.service.update_flat(&m, decline).await.unwrap();
        assert!(h.service.list_units(1, &client()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn moderator_read_drains_created_flats() {
        let h = harness();
        h.db.seed_home(42, "mod-1");
        let m = moderator("mod-1");
        h.service.create_flat(&m, new_flat(42, 1)).await.unwrap();

        let first = h.service.list_units(42, &m).await.unwrap();
        assert_eq!(status_of(&first, 1), Some(ModerationStatus::OnModeration));
        assert_eq!(
            h.db.flat(42, 1).unwrap().status,
            ModerationStatus::OnModeration
        );

        let second = h.service.list_units(42, &m).await.unwrap();
        assert_eq!(status_of(&second, 1), Some(ModerationStatus::OnModeration));
    }

    #[tokio::test]
    async fn drain_advances_marker_only_when_something_changed() {
        let h = harness();
        h.db.seed_home(3, "mod");
        let m = moderator("mod");
        h.service.create_flat(&m, new_flat(3, 1)).await.unwrap();

        let before = marker_of(&h, 3);
        h.service.list_units(3, &m).await.unwrap();
        let after_drain = marker_of(&h, 3);
        assert!(after_drain > before);

        h.service.list_units(3, &m).await.unwrap();
        assert_eq!(marker_of(&h, 3), after_drain);
    }

    #[tokio::test]
    async fn draining_twice_equals_draining_once() {
        let h = harness();
        h.db.seed_home(8, "mod");
        let m = moderator("mod");
        for n in 1..=4 {
            h.service.create_flat(&m, new_flat(8, n)).await.unwrap();
        }
        h.service.update_flat(&m, approve(8, 2)).await.unwrap();

        let once = h.service.moderation_listing(8).await.unwrap();
        let twice = h.service.moderation_listing(8).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(status_of(&once, 2), Some(ModerationStatus::Approved));
        assert_eq!(status_of(&once, 1), Some(ModerationStatus::OnModeration));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_moderator_reads_agree() {
        let h = harness();
        h.db.seed_home(9, "mod");
        let m = moderator("mod");
        for n in 1..=10 {
            h.service.create_flat(&m, new_flat(9, n)).await.unwrap();
        }

        let (a, b) = tokio::join!(h.service.list_units(9, &m), h.service.list_units(9, &m));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert!(a.iter().all(|f| f.status == ModerationStatus::OnModeration));
        assert_eq!(h.db.drains(), 2);
    }

    #[tokio::test]
    async fn moderator_reads_never_touch_the_cache() {
        let h = harness();
        h.db.seed_home(4, "mod");
        let m = moderator("mod");
        h.service.create_flat(&m, new_flat(4, 1)).await.unwrap();
        h.service.list_units(4, &m).await.unwrap();
        assert_eq!(h.kv.writes(), 0);

        // A status change the marker does not know about is still seen.
        h.db.force_status(4, 1, ModerationStatus::Declined);
        let flats = h.service.list_units(4, &m).await.unwrap();
        assert_eq!(status_of(&flats, 1), Some(ModerationStatus::Declined));
    }

    #[tokio::test]
    async fn clients_only_ever_see_approved() {
        let h = harness();
        h.db.seed_home(6, "mod");
        let m = moderator("mod");
        for n in 1..=4 {
            h.service.create_flat(&m, new_flat(6, n)).await.unwrap();
        }
        h.service.update_flat(&m, approve(6, 3)).await.unwrap();
        let mut declined = approve(6, 4);
        declined.status = ModerationStatus::Declined;
        h.service.update_flat(&m, declined).await.unwrap();
        h.service.list_units(6, &m).await.unwrap();

        let flats = h.service.list_units(6, &client()).await.unwrap();
        assert_eq!(flats.iter().map(|f| f.number).collect::<Vec<_>>(), vec![3]);
        assert!(flats.iter().all(|f| f.status.is_publicly_visible()));
    }

    #[tokio::test]
    async fn duplicate_flat_is_a_conflict_and_keeps_the_original() {
        let h = harness();
        h.db.seed_home(2, "mod");
        let m = moderator("mod");
        h.service.create_flat(&m, new_flat(2, 5)).await.unwrap();
        let before = marker_of(&h, 2);

        let mut dup = new_flat(2, 5);
        dup.price = 1;
        dup.rooms = 9;
        let err = h.service.create_flat(&client(), dup).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let kept = h.db.flat(2, 5).unwrap();
        assert_eq!((kept.price, kept.rooms), (7_500_000, 2));
        assert_eq!(marker_of(&h, 2), before);
    }

    #[tokio::test]
    async fn unknown_home_is_not_found_on_both_paths() {
        let h = harness();
        assert!(matches!(
            h.service.list_units(404, &client()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            h.service.list_units(404, &moderator("m")).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            h.service.create_flat(&client(), new_flat(404, 1)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_database() {
        let h = harness();
        h.db.seed_home(7, "mod");
        let m = moderator("mod");
        h.service.create_flat(&m, new_flat(7, 1)).await.unwrap();
        h.service.update_flat(&m, approve(7, 1)).await.unwrap();

        h.kv.set_available(false);
        let flats = h.service.list_units(7, &client()).await.unwrap();
        assert_eq!(flats.len(), 1);
        assert_eq!(h.kv.writes(), 0);

        h.kv.set_available(true);
        h.service.list_units(7, &client()).await.unwrap();
        assert_eq!(h.kv.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cache_still_serves_from_database() {
        let h = harness();
        h.db.seed_home(11, "mod");
        h.kv.set_latency(Some(Duration::from_secs(5)));
        let flats = h.service.list_units(11, &client()).await.unwrap();
        assert!(flats.is_empty());
        assert_eq!(h.db.approved_reads(), 1);
    }

    #[tokio::test]
    async fn database_outage_is_internal() {
        let h = harness();
        h.db.seed_home(12, "mod");
        h.db.set_available(false);
        assert!(matches!(
            h.service.list_units(12, &client()).await,
            Err(ServiceError::Internal(_))
        ));
        assert!(matches!(
            h.service.list_units(12, &moderator("mod")).await,
            Err(ServiceError::Internal(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_database_is_internal_not_not_found() {
        let h = harness();
        h.db.set_latency(Some(Duration::from_secs(10)));
        assert!(matches!(
            h.service.list_units(13, &client()).await,
            Err(ServiceError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn only_moderators_create_homes() {
        let h = harness();
        let err = h
            .service
            .create_home(&client(), "1 Main St".into(), 1999, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let home = h
            .service
            .create_home(&moderator("mod-7"), "1 Main St".into(), 1999, "ACME".into())
            .await
            .unwrap();
        assert_eq!(home.reviewer_id, "mod-7");
        assert_eq!(home.created_at, home.updated_at);
    }

    #[tokio::test]
    async fn only_the_reviewer_updates_flats() {
        let h = harness();
        h.db.seed_home(20, "owner");
        h.service.create_flat(&client(), new_flat(20, 1)).await.unwrap();

        assert!(matches!(
            h.service.update_flat(&client(), approve(20, 1)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            h.service.update_flat(&moderator("someone-else"), approve(20, 1)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            h.service.update_flat(&moderator("owner"), approve(20, 99)).await,
            Err(ServiceError::NotFound(_))
        ));
        let updated = h.service.update_flat(&moderator("owner"), approve(20, 1)).await.unwrap();
        assert_eq!(updated.status, ModerationStatus::Approved);
    }
}
