//! The action seam: the trait the core consumes and the output it produces.

pub mod trait_def;
pub mod types;

pub use trait_def::Action;
pub use types::{ActionError, ActionOutput};
