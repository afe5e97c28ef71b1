//! Sessions: identity map, pending-write tracking, and ordered flushing.

mod filter;
mod identity_map;
mod ordering;
mod unit_of_work;

pub use filter::{Condition, Filter, FindOptions};
pub use identity_map::IdentityMap;
pub use unit_of_work::Session;
