//! Operator interaction.
//!
//! Reports go to the terminal and confirmations are read from stdin. The
//! engine only sees the `Console` trait.

use std::io::{self, BufRead, Write};

use crate::error::Result;

/// Shows reports and asks for confirmation.
#[cfg_attr(test, mockall::automock)]
pub trait Console: Send + Sync {
    /// Shows text to the operator.
    fn show(&self, text: &str);

    /// Asks a yes/no question. Anything other than `y` or `yes` is a no.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Console backed by the process terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl TerminalConsole {
    /// Creates a terminal console.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Console for TerminalConsole {
    fn show(&self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "{text}");
        if !text.ends_with('\n') {
            let _ = writeln!(stderr);
        }
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        eprint!("{question} [y/N] ");
        io::stderr().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;

        Ok(is_yes(&input))
    }
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
