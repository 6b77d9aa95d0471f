// src/exec/signal.rs

//! Signal number → name translation for exit reporting.

/// Name of a terminating signal, e.g. `SIGTERM`.
#[cfg(unix)]
pub(crate) fn signal_name(sig: i32) -> String {
    match nix::sys::signal::Signal::try_from(sig) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {sig}"),
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_name(sig: i32) -> String {
    format!("signal {sig}")
}
