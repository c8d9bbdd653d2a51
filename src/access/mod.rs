pub mod policy;
pub mod resolver;

pub use policy::{AccessList, SpecialAccessPolicy};
pub use resolver::{PRIORITY, Resolver};
