mod aggregate;
mod config;
mod db;
mod error;
mod ipc;
mod logging;
mod model;
mod rubric;
mod score;
mod sections;
mod standards;
mod stats;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    if let Err(e) = logging::init_tracing() {
        eprintln!("scorebookd: logging disabled: {e}");
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scorebookd starting");

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed; shutting down");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::debug!(error = %e, "rejected malformed request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed; scorebookd exiting");
}
