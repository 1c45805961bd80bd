pub mod forge;
pub mod vcs;

pub use forge::{Forge, PullRequest};
pub use vcs::Vcs;
