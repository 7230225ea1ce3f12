//! Some useful tools for the project.
//!
//! Usually, you don't need to use this module directly.
//! [`crate::backup`] and [`crate::restore`] draw their progress with these bars.

use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};

const PB_FINISH_MODE: ProgressFinish = ProgressFinish::Abandon;
const SPINNER_FINISH_MODE: ProgressFinish = ProgressFinish::AndClear;

/// Build a process bar with a specific length and custom style.
///
/// `prefix` names the work, `msg` is free for a status like `[done:1 failed:0]`.
pub fn build_process_bar(len: u64, prefix: impl Into<String>) -> ProgressBar {
    // see: https://docs.rs/indicatif/latest/indicatif/#templates
    const PROCESS_CHARS: &str = "#>-";
    const TEMPLATE: &str =
        "[{elapsed_precise}] {prefix} [{wide_bar:.cyan/blue}] {msg} {human_pos}/{human_len} ({eta})";

    let style = ProgressStyle::with_template(TEMPLATE)
        .unwrap()
        .progress_chars(PROCESS_CHARS);

    ProgressBar::new(len)
        .with_style(style)
        .with_prefix(prefix.into())
        .with_finish(PB_FINISH_MODE)
}

/// Build a spinner for waits of unknown length, like the login.
pub fn build_spinner() -> ProgressBar {
    ProgressBar::new_spinner()
        .with_finish(SPINNER_FINISH_MODE)
        .with_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap()
                // For more spinners check out the cli-spinners project:
                // https://github.com/sindresorhus/cli-spinners/blob/master/spinners.json
                // NOTE: use `ascii` only, because cmd/powershell maybe not support unicode.
                .tick_strings(&[".  ", ".. ", "...", " ..", "  .", "   "]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_process_bar() {
        let process_bar = build_process_bar(3, "deck_test");
        assert_eq!(process_bar.length(), Some(3));
        assert_eq!(process_bar.prefix(), "deck_test");

        process_bar.inc(3);
        process_bar.finish();
        assert!(process_bar.is_finished());
    }
}
