//! Suite configuration, tool lookup, substitution and discovery

pub mod config;
pub mod discovery;
pub mod resolver;
pub mod substitution;

pub use config::{BuildOptions, TestSuiteConfig};
pub use discovery::{discover, ExpectedResult, RunLine, TestCase};
pub use substitution::{Substitution, SubstitutionTable, TestPaths, ToolSubstitution};
