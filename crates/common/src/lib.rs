//! Strongly typed identifiers shared by every crate in the workspace.

mod types;

pub use types::{CategoryId, OrderId, PartyId, ProductId, UserId};
