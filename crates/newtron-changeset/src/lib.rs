//! Ordered CONFIG_DB change sets: the unit of atomic intent against a
//! device.
//!
//! A [`ChangeSet`] is built offline, previewed, applied in declaration
//! order, verified by re-reading the device, and rolled back in reverse
//! order from the recorded old/new fields when something went wrong.

mod changeset;
mod error;

pub use changeset::ChangeSet;
pub use error::{ChangeError, ChangeResult};
