// Rulescope Core Library
//
// Loads detection rule files from a rules directory, resolves which ones are
// enabled by the manager configuration, and answers filtered, sorted and
// paginated queries over the parsed rules.

pub mod types;
pub mod error;
pub mod config;
pub mod listing;
pub mod parser;
pub mod resolver;
pub mod catalog;

// Re-export main types and functions for easy use
pub use types::*;
pub use error::{Result, RulescopeError};
pub use config::{IncludeSource, RulesSection, RulescopeConfig};
pub use listing::{ListOptions, SearchSpec, SortOrder, SortSpec};
pub use parser::RuleFileParser;
pub use resolver::RuleFileResolver;
pub use catalog::{LevelFilter, RuleCatalog, RuleFilter};
