// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Environment variable that keeps the console open until Enter is pressed.
pub const PAUSE_ON_EXIT_VAR: &str = "VGT_PAUSE_ON_EXIT";

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// True when `VGT_PAUSE_ON_EXIT` is present in the environment (any value).
pub fn pause_on_exit_requested() -> bool {
    pause_requested_by(std::env::var_os(PAUSE_ON_EXIT_VAR))
}

fn pause_requested_by(value: Option<std::ffi::OsString>) -> bool {
    value.is_some()
}

/// Blocks on stdin when pausing was requested, so a console launched by a
/// double-click stays readable after a fatal error.
pub fn pause_on_exit() {
    if !pause_on_exit_requested() {
        return;
    }
    eprintln!("Press Enter to exit...");
    let mut line = String::new();
    if let Err(e) = std::io::stdin().read_line(&mut line) {
        tracing::warn!("pause_on_exit: stdin read failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_value_requests_pause() {
        assert!(pause_requested_by(Some("1".into())));
        assert!(pause_requested_by(Some("".into())));
        assert!(!pause_requested_by(None));
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
