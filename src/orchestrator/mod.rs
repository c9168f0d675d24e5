//! Application-level orchestration utilities.
//!
//! This module owns post-run processing: moving the merged video out of the cache,
//! auto-save and exports. The CLI calls into this module to keep responsibilities separated.

mod persist;
mod post_process;

pub(crate) use post_process::process_run_completion;
