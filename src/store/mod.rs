pub mod claims;
pub mod lock;
pub mod registry;
