pub mod cache;
pub mod recommendation;
pub mod store;
