//! Process-wide observability environment, set lazily and idempotently on
//! first session start (spec §6, DESIGN NOTES §9 "Global process-wide
//! state"). Grounded on the teacher's one-time `CommandEnvironment` setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// `"sdk-<target>"` for a one-shot query, `"sdk-<target>-client"` for a
/// connected session (spec §6 `CLAUDE_CODE_ENTRYPOINT`).
pub fn init_observability(entrypoint: &str) {
    INIT.call_once(|| {
        std::env::set_var("CLAUDE_CODE_ENTRYPOINT", entrypoint);
        std::env::set_var("CLAUDE_AGENT_SDK_VERSION", env!("CARGO_PKG_VERSION"));
    });
}

/// Mirrors a working-directory override into `PWD`, matching the subprocess's
/// own expectation of that variable (spec §6).
pub fn set_pwd(dir: &std::path::Path) {
    std::env::set_var("PWD", dir);
}
