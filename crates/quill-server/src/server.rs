//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::sync::RwLock;
use tower_http::services::ServeDir;

use quill_static::{is_page, PageProcessor, ProcessorConfig};

use crate::watcher::{FileWatcher, WatchEvent};
use crate::websocket::{hmr_client_script, HmrHub, HmrMessage};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory containing the pages
    pub source_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Page processing options
    pub processor: ProcessorConfig,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("pages"),
            port: 7777,
            host: "127.0.0.1".to_string(),
            open: true,
            processor: ProcessorConfig::default(),
        }
    }
}

impl DevServerConfig {
    /// URL of the live reload WebSocket endpoint.
    pub fn hmr_url(&self) -> String {
        format!("ws://{}:{}/__hmr", self.host, self.port)
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
struct ServerState {
    config: DevServerConfig,
    hmr: HmrHub,
    processor: Arc<PageProcessor>,
}

type SharedState = Arc<RwLock<ServerState>>;

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self { config }
    }

    /// Start the development server.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let state = Arc::new(RwLock::new(ServerState {
            processor: Arc::new(PageProcessor::new(self.config.processor.clone())),
            config: self.config.clone(),
            hmr: HmrHub::new(),
        }));

        // Set up file watcher
        let (watcher, mut rx) = FileWatcher::new(&[self.config.source_dir.clone()])
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        // Spawn file watch handler
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_watch_event(&state_clone, event).await;
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(state, &self.config.source_dir);

        tracing::info!("Starting dev server at http://{}", addr);

        // Open browser if configured
        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

/// Build the application router.
///
/// HTML pages are rendered on every request; anything else is served as-is.
fn router(state: SharedState, source_dir: &Path) -> Router {
    Router::new()
        .route("/__hmr", get(ws_handler))
        .route("/__hmr.js", get(hmr_script_handler))
        .fallback_service(ServeDir::new(source_dir))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            render_pages,
        ))
        .with_state(state)
}

/// Handle file watch events.
async fn handle_watch_event(state: &SharedState, event: WatchEvent) {
    let state = state.read().await;

    match &event {
        WatchEvent::PageModified(path) => tracing::info!("Page modified: {}", path.display()),
        WatchEvent::AssetModified(path) => tracing::debug!("File modified: {}", path.display()),
        WatchEvent::Created(path) => tracing::debug!("File created: {}", path.display()),
        WatchEvent::Deleted(path) => tracing::debug!("File deleted: {}", path.display()),
    }

    state.hmr.send(HmrMessage::Reload);
}

/// Middleware rendering HTML pages from the source directory.
///
/// Lookup and rendering run on the blocking pool, after the state lock is
/// released.
async fn render_pages(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let (root, processor) = {
        let state = state.read().await;
        (state.config.source_dir.clone(), Arc::clone(&state.processor))
    };
    let request_path = request.uri().path().to_string();

    let rendered = tokio::task::spawn_blocking(move || {
        resolve_page(&root, &request_path).map(|path| render_page(&processor, &path))
    })
    .await;

    match rendered {
        Ok(Some(response)) => response,
        Ok(None) => next.run(request).await,
        Err(e) => {
            tracing::warn!("Page render task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Map a request path to a page under `root`, if it names one.
///
/// Directory requests resolve to their `index.html`.
fn resolve_page(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let candidate = root.join(relative);
    let candidate = if candidate.is_dir() {
        candidate.join("index.html")
    } else {
        candidate
    };

    (candidate.is_file() && is_page(&candidate)).then_some(candidate)
}

fn render_page(processor: &PageProcessor, path: &Path) -> Response {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read {}: {}", path.display(), e),
            )
                .into_response();
        }
    };

    match processor.process(&source) {
        Ok(page) => {
            if !page.report.is_clean() {
                tracing::warn!(
                    "{}: {} marked elements did not render",
                    path.display(),
                    page.report.failed() + page.report.skipped()
                );
            }
            Html(inject_client(&page.html)).into_response()
        }
        Err(e) => {
            tracing::warn!("Failed to render {}: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Add the live reload client to a page, before `</body>` when there is one.
fn inject_client(html: &str) -> String {
    const CLIENT_TAG: &str = r#"<script src="/__hmr.js"></script>"#;

    match html.to_ascii_lowercase().rfind("</body") {
        Some(at) => format!("{}{}\n{}", &html[..at], CLIENT_TAG, &html[at..]),
        None => format!("{}\n{}", html, CLIENT_TAG),
    }
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: SharedState) {
    let mut rx = {
        let state = state.read().await;
        state.hmr.subscribe()
    };

    if send_message(&mut socket, &HmrMessage::Connected).await.is_err() {
        return;
    }

    // Forward messages to the client
    while let Ok(msg) = rx.recv().await {
        if send_message(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &HmrMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the live reload client script.
async fn hmr_script_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let url = state.read().await.config.hmr_url();
    (
        [("content-type", "application/javascript")],
        hmr_client_script(&url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default());
        assert_eq!(server.config.port, 7777);
        assert_eq!(server.config.hmr_url(), "ws://127.0.0.1:7777/__hmr");
    }

    #[test]
    fn resolves_pages_and_directory_indexes() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("guide")).unwrap();
        fs::write(root.join("index.html"), "<p>home</p>").unwrap();
        fs::write(root.join("guide/index.html"), "<p>guide</p>").unwrap();
        fs::write(root.join("guide/intro.htm"), "<p>intro</p>").unwrap();
        fs::write(root.join("style.css"), "p {}").unwrap();

        assert_eq!(resolve_page(root, "/"), Some(root.join("index.html")));
        assert_eq!(
            resolve_page(root, "/guide/"),
            Some(root.join("guide/index.html"))
        );
        assert_eq!(
            resolve_page(root, "/guide/intro.htm"),
            Some(root.join("guide/intro.htm"))
        );
        assert_eq!(resolve_page(root, "/style.css"), None);
        assert_eq!(resolve_page(root, "/missing.html"), None);
        assert_eq!(resolve_page(root, "/../index.html"), None);
    }

    #[test]
    fn injects_client_before_body_end() {
        assert_eq!(
            inject_client("<html><BODY><p>x</p></BODY></html>"),
            "<html><BODY><p>x</p><script src=\"/__hmr.js\"></script>\n</BODY></html>"
        );
        assert_eq!(
            inject_client("<p>x</p>"),
            "<p>x</p>\n<script src=\"/__hmr.js\"></script>"
        );
    }

    #[tokio::test]
    async fn renders_marked_pages() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index.html");
        fs::write(&path, "<body><div data-markup=\"md\">**hi**</div></body>").unwrap();

        let processor = PageProcessor::new(ProcessorConfig::default());
        let response = render_page(&processor, &path);
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();

        assert!(html.contains("<strong>hi</strong>"));
        assert!(html.contains("<script src=\"/__hmr.js\"></script>\n</body>"));
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_rendered_pages_and_plain_files() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<body><div data-markup=\"md\">*hi*</div></body>",
        )
        .unwrap();
        fs::write(temp.path().join("site.css"), "p { margin: 0 }").unwrap();

        let state = Arc::new(RwLock::new(ServerState {
            config: DevServerConfig {
                source_dir: temp.path().to_path_buf(),
                ..Default::default()
            },
            hmr: HmrHub::new(),
            processor: Arc::new(PageProcessor::new(ProcessorConfig::default())),
        }));
        let app = router(state, temp.path());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let page = get(addr, "/").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("<em>hi</em>"));
        assert!(page.contains("<script src=\"/__hmr.js\"></script>"));

        let css = get(addr, "/site.css").await;
        assert!(css.starts_with("HTTP/1.1 200"));
        assert!(css.ends_with("p { margin: 0 }"));
    }

    #[test]
    fn missing_page_is_a_server_error() {
        let temp = tempdir().unwrap();
        let processor = PageProcessor::new(ProcessorConfig::default());

        let response = render_page(&processor, &temp.path().join("gone.html"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn watch_events_trigger_reload() {
        let state = Arc::new(RwLock::new(ServerState {
            config: DevServerConfig::default(),
            hmr: HmrHub::new(),
            processor: Arc::new(PageProcessor::new(ProcessorConfig::default())),
        }));
        let mut rx = state.read().await.hmr.subscribe();

        handle_watch_event(
            &state,
            WatchEvent::PageModified(PathBuf::from("pages/index.html")),
        )
        .await;

        assert_eq!(rx.try_recv().unwrap(), HmrMessage::Reload);
    }
}
