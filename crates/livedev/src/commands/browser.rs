//! Best-effort browser launch for `serve --open`.

use std::process::{Command, Stdio};

/// Open `url` in the system's default browser.
///
/// Failures are logged and otherwise ignored; serving continues either way.
pub(super) fn open(url: &str) {
    let mut command = launcher(url);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match command.spawn() {
        Ok(_) => tracing::info!(url, "Opened browser"),
        Err(e) => tracing::warn!(url, error = %e, "Failed to open browser"),
    }
}

#[cfg(target_os = "macos")]
fn launcher(url: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(url);
    command
}

#[cfg(target_os = "windows")]
fn launcher(url: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn launcher(url: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_passes_url_last() {
        let command = launcher("http://localhost:8000/");
        let last = command.get_args().last().unwrap();
        assert_eq!(last, "http://localhost:8000/");
    }
}
