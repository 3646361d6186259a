//! Data model for a harvest run
//!
//! # Components
//!
//! - `PageTask`: one page of the paginated collection, waiting to be fetched
//! - `ItemReference`: one collection member as seen on a listing page
//! - `Attributes`: the typed attribute set shared by listing and detail payloads
//! - `Record`: an item reference resolved against its detail payload

mod record;
mod task;

pub use record::{Attributes, Record};
pub use task::{ItemReference, PageTask};
