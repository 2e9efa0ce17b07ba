//! Client-side manifest: security pre-flight, file resolution, hashing

pub mod builder;
pub mod resolver;
pub mod security;

pub use builder::{build, SourceManifest};
pub use resolver::{ExplicitResolver, FileListResolver, ResolvedFile, WholeTreeResolver};
