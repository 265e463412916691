//! Generated browser client.
//!
//! The client opens a WebSocket to the reload endpoint and reloads the page
//! when a change event concerns it. Everything it needs (port, endpoint
//! path, scheme, force-reload flag, reconnect delay) is baked in when the
//! mirror is built.

use std::time::Duration;

/// Name of the generated script at the mirror root.
pub const SCRIPT_FILENAME: &str = "delta-streamer.js";

/// Parameters baked into the generated client script.
#[derive(Clone, Debug)]
pub struct ClientScriptOptions {
    /// Port the reload endpoint listens on.
    pub port: u16,
    /// Path of the reload endpoint (e.g. `/delta-streamer-ws`).
    pub reload_path: String,
    /// Reload on every event, not only ones concerning the open page.
    pub force_reload: bool,
    /// Use `wss://` instead of `ws://`.
    pub tls: bool,
    /// Delay between reconnection attempts after the socket closes.
    pub retry_delay: Duration,
}

impl Default for ClientScriptOptions {
    fn default() -> Self {
        Self {
            port: 8080,
            reload_path: "/delta-streamer-ws".to_owned(),
            force_reload: false,
            tls: false,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ClientScriptOptions {
    /// Render the client script source.
    #[must_use]
    pub fn render(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        let port = self.port;
        let path = js_string(&self.reload_path);
        let force_reload = self.force_reload;
        let retry_ms = self.retry_delay.as_millis();

        format!(
            r"/**
 * This file has been generated by the wd web development
 * hot reload tool.
 */

const FORCE_RELOAD = {force_reload};
const RETRY_MS = {retry_ms};
const ENDPOINT = `{scheme}://${{window.location.hostname}}:{port}${{{path}}}`;

function currentPage() {{
  const path = window.location.pathname;
  return path.endsWith('/') ? path + 'index.html' : path;
}}

function shouldReload(changed) {{
  return FORCE_RELOAD ||
    changed === currentPage() ||
    // Stylesheets and scripts may be used by any page
    changed.includes('.js') ||
    changed.includes('.css');
}}

function connect() {{
  if (typeof WebSocket !== 'function') {{
    console.error('wd: WebSocket is not supported by this browser.');
    return;
  }}

  const socket = new WebSocket(ENDPOINT);

  socket.addEventListener('open', () => {{
    console.log('wd: connected to', ENDPOINT);
  }});

  socket.addEventListener('message', (event) => {{
    console.log('wd: changed', event.data);
    if (shouldReload(event.data)) {{
      window.location.reload();
    }}
  }});

  socket.addEventListener('close', () => {{
    console.log(`wd: disconnected, retrying in ${{RETRY_MS}}ms`);
    setTimeout(connect, RETRY_MS);
  }});

  socket.addEventListener('error', (event) => {{
    console.error('wd: websocket error', event);
  }});
}}

connect();
"
        )
    }
}

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' | '\\' | '`' | '$' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '<' => out.push_str("\\x3c"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
