//! CLI commands for marksearch.
//!
//! - **Indexing**: index, delete, clear, optimize
//! - **Searching**: search, shell
//! - **Inspection**: list, stats
//! - **Setup**: init

use crate::record::SearchResult;

pub mod index;
pub mod init;
pub mod list;
pub mod maintain;
pub mod search;
pub mod shell;
pub mod stats;

pub use index::IndexCommand;
pub use init::InitCommand;
pub use list::ListCommand;
pub use maintain::MaintainCommand;
pub use search::SearchCommand;
pub use shell::ShellCommand;
pub use stats::StatsCommand;

/// One result line, numbered from 1.
pub fn format_hit(number: usize, result: &SearchResult) -> String {
    format!(
        "{} File: {} -- Path: {} -- Score: {}",
        number, result.name, result.full_name, result.score
    )
}
