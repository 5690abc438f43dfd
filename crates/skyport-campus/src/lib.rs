//! Campus and event data for the skyport portal.
//!
//! Listings are fetched with an app-level token (client credentials), so
//! browsing events never requires a signed-in user. [`CampusClient`] is the
//! entry point; [`events`] holds the normalized types and the `kind` →
//! category mapping.

pub mod client;
pub mod error;
pub mod events;

pub use client::{CampusClient, DEFAULT_EVENT_PAGE_SIZE};
pub use error::{CampusError, Result};
pub use events::{Campus, CampusEvent, EventCategory};
