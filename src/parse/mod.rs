//! Text → record parsers. Forward-compatible with trailing whitespace,
//! extra blank lines and unknown trailing columns (§6); locale-agnostic.

pub mod generic;
pub mod linux;
pub mod qnx;

/// The reserved token used both as a forced-error path argument and
/// as the inter-record separator in concatenated per-process output
/// (§4.4). Not a valid path on any POSIX filesystem.
pub const DEFAULT_SEPARATOR_TOKEN: &str = "e39f7761903b";
