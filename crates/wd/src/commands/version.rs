//! `wd version` command implementation.

use crate::output::Output;

/// Print the version to stdout.
pub(crate) fn execute(output: &Output, version: &str) {
    output.result(&format!("wd {version}"));
}
