pub mod cache;
pub mod deadline;
pub mod domain;
pub mod error;
pub mod moderation;
pub mod ports;
pub mod service;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::ListingCache;
pub use domain::{
    DrainReport, Flat, FlatUpdate, GenerationMarker, Home, ModerationStatus, NewFlat, NewHome,
    NewUser, Session, SessionClaims, User, UserCredentials,
};
pub use error::{ServiceError, ServiceResult};
pub use ports::{DatabaseService, KeyValueStore, PortError, PortResult};
pub use service::ListingService;
pub use session::SessionStore;
