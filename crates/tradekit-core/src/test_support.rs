//! Helpers shared by unit tests across modules.

use std::net::TcpListener;
use std::path::Path;

use crate::config::Config;

/// Start a server that accepts connections but never writes a response.
///
/// Returns its base URL. The accepting thread keeps every stream open for
/// the life of the test process.
pub(crate) fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            held.push(stream);
        }
    });
    format!("http://{}", addr)
}

/// Config rooted at `root` that gives up on requests after one second.
pub(crate) fn short_timeout_config(root: &Path, base_url: &str) -> Config {
    let mut config = Config::with_root(root.to_path_buf());
    config.base_url = base_url.to_string();
    config.request_timeout_secs = 1;
    config
}
