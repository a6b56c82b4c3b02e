//! Interactive search loop.
//!
//! Reads one query per line and prints the ranked hits until the user types
//! `quit` or input ends. Queries run in the configured mode (fuzzy unless
//! changed).

use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::config::Config;
use crate::search::SearchEngine;
use crate::store::IndexStore;

use super::format_hit;

/// Typing this ends the session.
pub const QUIT_COMMAND: &str = "quit";

const PROMPT: &str = "What do you want to search?";
const RULE: &str = "==========================";

/// The shell command implementation.
pub struct ShellCommand<'a> {
    engine: SearchEngine<'a>,
}

impl<'a> ShellCommand<'a> {
    /// Create a new shell command.
    pub fn new(store: &'a IndexStore, config: &Config) -> Self {
        Self {
            engine: SearchEngine::with_config(store, config),
        }
    }

    /// Run the loop over `input`, writing to `output`. Returns the number of
    /// queries executed.
    ///
    /// A failing query is reported and the loop continues.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> io::Result<usize> {
        let mut lines = input.lines();
        let mut executed = 0;

        loop {
            writeln!(output)?;
            writeln!(output, "{}", PROMPT)?;
            output.flush()?;

            let Some(line) = lines.next() else {
                break;
            };
            let query = line?;
            if query.trim() == QUIT_COMMAND {
                break;
            }

            executed += 1;
            match self.engine.search_default(&query) {
                Ok(results) => {
                    writeln!(output, "Here are the results:")?;
                    writeln!(output)?;
                    writeln!(output, "{}", RULE)?;
                    for (i, result) in results.iter().enumerate() {
                        writeln!(output, "{}", format_hit(i + 1, result))?;
                    }
                    writeln!(output, "{}", RULE)?;
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "search failed");
                    writeln!(output, "Search failed: {}", e)?;
                }
            }
        }

        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DocumentRecord;

    fn run_session(input: &str) -> (usize, String) {
        let store = IndexStore::in_memory().unwrap();
        store
            .upsert_batch(&[
                DocumentRecord::new("/docs/hello.md", "hello.md", "Hello there"),
                DocumentRecord::new("/docs/world.md", "world.md", "World peace"),
            ])
            .unwrap();
        let shell = ShellCommand::new(&store, &Config::default());

        let mut out = Vec::new();
        let executed = shell.run(input.as_bytes(), &mut out).unwrap();
        (executed, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_quit_ends_session() {
        let (executed, out) = run_session("hel\nquit\nworld\n");
        assert_eq!(executed, 1);
        assert!(out.contains("1 File: "));
        assert!(out.contains("-- Path: /docs/hello.md -- Score: "));
        assert!(!out.contains("/docs/world.md"));
    }

    #[test]
    fn test_end_of_input_ends_session() {
        let (executed, out) = run_session("hello world\n");
        assert_eq!(executed, 1);
        assert!(out.contains("/docs/hello.md"));
        assert!(out.contains("/docs/world.md"));
        assert!(out.contains("2 File: "));
    }

    #[test]
    fn test_blank_line_prints_empty_results() {
        let (executed, out) = run_session("\nquit\n");
        assert_eq!(executed, 1);
        assert!(out.contains("Here are the results:"));
        assert!(!out.contains("File: "));
        assert_eq!(out.matches(RULE).count(), 2);
    }
}
