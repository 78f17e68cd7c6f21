//! Player-side presentation state fed by broadcast hooks.

use parking_lot::Mutex;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;

/// The panels the Player app keeps in sync with the DM.
#[derive(Debug, Default)]
pub struct App {
    /// Lines shown in the Gandor chat feed.
    pub gandor_feed: Vec<String>,
    /// Everything that happened this session.
    pub session_log: Vec<String>,
}

impl App {
    /// Appends a `gandor_chat` payload to the feed and the session log.
    ///
    /// A payload without a `text` string appends an empty line.
    pub fn receive_gandor_message(&mut self, payload: &Value) -> String {
        let text = payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.gandor_feed.push(text.clone());
        self.session_log.push(text.clone());
        text
    }
}

/// Builds the `gandor_chat` hook: update `app`, then echo the line to `out`.
pub fn gandor_chat_hook<W>(
    app: Arc<Mutex<App>>,
    out: Arc<Mutex<W>>,
) -> impl Fn(Value) + Send + Sync + 'static
where
    W: Write + Send + 'static,
{
    move |payload| {
        let text = app.lock().receive_gandor_message(&payload);
        let mut out = out.lock();
        if let Err(e) = writeln!(out, "[Gandor] {text}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write chat line");
        }
    }
}
