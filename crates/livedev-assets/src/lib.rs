//! Browser-side assets for livedev.
//!
//! Provides the live reload client script and the helper that injects a
//! reference to it into served HTML.

/// Path of the WebSocket endpoint the client script connects to.
pub const LIVE_RELOAD_PATH: &str = "/__livereload";

/// Path the client script is served from.
pub const CLIENT_SCRIPT_PATH: &str = "/__livereload.js";

/// WebSocket close code sent to a session the server gave up on.
///
/// The client stops reconnecting when it sees it; the page gets reloads
/// again only after a manual refresh.
pub const SESSION_DROPPED_CLOSE_CODE: u16 = 4000;

/// The client script, compiled into the binary.
const CLIENT_SCRIPT: &str = include_str!("../assets/livereload.js");

/// Tag inserted into HTML documents.
const SCRIPT_TAG: &str = "<script src=\"/__livereload.js\"></script>";

/// Source of the live reload client script.
pub fn client_script() -> &'static str {
    CLIENT_SCRIPT
}

/// Insert the client script tag into an HTML document.
///
/// The tag goes right before the last `</body>` (matched case-insensitively).
/// Documents without a closing body tag get it appended at the end, which
/// browsers still execute.
pub fn inject_client_script(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + SCRIPT_TAG.len() + 1);

    // ASCII lowercasing keeps byte offsets stable
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            out.push_str(&html[..idx]);
            out.push_str(SCRIPT_TAG);
            out.push_str(&html[idx..]);
        }
        None => {
            out.push_str(html);
            out.push('\n');
            out.push_str(SCRIPT_TAG);
        }
    }

    out
}
