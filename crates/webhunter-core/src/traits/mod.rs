//! Core traits for WebHunter
//!
//! - [`Source`]: list the items currently visible at one origin
//! - [`Comm`]: deliver a notification through one channel
//! - [`SeenStore`]: remember which items each source already reported

pub mod comm;
pub mod seen_store;
pub mod source;

pub use comm::{Comm, CommContext, CommFactory, Delivery};
pub use seen_store::{SeenRecord, SeenStore};
pub use source::{Item, Source, SourceContext, SourceFactory};
