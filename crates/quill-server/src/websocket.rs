//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to clients for live reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HmrMessage {
    /// Full page reload
    Reload,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct HmrHub {
    sender: broadcast::Sender<HmrMessage>,
}

impl HmrHub {
    /// Create a new hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: HmrMessage) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(msg);
    }

    /// Subscribe to messages.
    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the client-side reload script.
///
/// The script reloads the page on `reload`. When the connection drops it
/// polls the server and reloads once the server answers again.
pub fn hmr_client_script(ws_url: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var url = '{}';
  var retries = 0;
  var maxRetries = 20;

  function connect(reloadOnOpen) {{
    var ws = new WebSocket(url);

    ws.onopen = function() {{
      if (reloadOnOpen) {{
        location.reload();
        return;
      }}
      console.log('[quill] Live reload connected');
      retries = 0;
    }};

    ws.onmessage = function(event) {{
      var msg = JSON.parse(event.data);

      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;

        case 'connected':
          console.log('[quill] Server acknowledged connection');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (retries < maxRetries) {{
        retries++;
        setTimeout(function() {{
          connect(true);
        }}, 500 * retries);
      }}
    }};
  }}

  connect(false);
}})();
"#,
        ws_url
    )
}
