//! Static file server for the output directory.
//!
//! Built on `tiny_http`. The server runs on its own thread so `default` can
//! go on to build and watch; the output directory may still be empty when
//! the first request arrives.
//!
//! Request resolution order:
//! 1. Exact file match → serve file
//! 2. Directory with index.html → serve index.html
//! 3. Directory without index.html → generate listing
//! 4. Nothing found → 404

use crate::{config::PipelineConfig, log};
use anyhow::{Context, Result, anyhow};
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
    thread::JoinHandle,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Directory listing HTML template (embedded at compile time)
const DIRECTORY_TEMPLATE: &str = include_str!("embed/serve/directory.html");

/// Welcome page HTML template (shown when output directory is empty)
const WELCOME_TEMPLATE: &str = include_str!("embed/serve/welcome.html");

/// A running server thread.
pub struct ServerHandle {
    addr: SocketAddr,
    #[cfg(test)]
    server: Arc<Server>,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the server stops.
    pub fn join(self) {
        let _ = self.thread.join();
    }

    /// Stop accepting requests and wait for the server thread.
    #[cfg(test)]
    pub fn shutdown(self) {
        self.server.unblock();
        self.join();
    }
}

/// Bind `[serve.interface]:[serve.port]` and serve `[paths.dest]` on a
/// background thread.
///
/// A port that is already in use is a startup error.
pub fn start_server(config: &'static PipelineConfig) -> Result<ServerHandle> {
    let interface: IpAddr = config.serve.interface.parse()?;
    let addr = SocketAddr::new(interface, config.serve.port);

    let server = Server::http(addr).map_err(|e| anyhow!("Failed to bind {addr}: {e}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .context("Server is not listening on an IP address")?;
    let server = Arc::new(server);

    log!("connect"; "serving {} at http://{}", config.dest().display(), addr);

    let thread = std::thread::Builder::new()
        .name("connect".into())
        .spawn({
            let server = Arc::clone(&server);
            move || {
                for request in server.incoming_requests() {
                    if let Err(e) = handle_request(request, config.dest()) {
                        log!("connect"; "request error: {e}");
                    }
                }
            }
        })
        .context("Failed to spawn server thread")?;

    Ok(ServerHandle {
        addr,
        #[cfg(test)]
        server,
        thread,
    })
}

fn handle_request(request: Request, serve_root: &Path) -> Result<()> {
    let url_path = decode_path(request.url());
    let request_path = url_path.trim_matches('/');

    let Some(local_path) = resolve(serve_root, request_path) else {
        return serve_not_found(request);
    };

    if local_path.is_file() {
        return serve_file(request, &local_path);
    }

    if local_path.is_dir() {
        let index_path = local_path.join("index.html");
        if index_path.is_file() {
            return serve_file(request, &index_path);
        }

        if let Ok(listing) = generate_directory_listing(&local_path, request_path) {
            return serve_html(request, listing);
        }
    }

    serve_not_found(request)
}

/// Strip the query string (e.g. `?t=123456`), then percent-decode the path.
///
/// Decoding last keeps an encoded `%3F` in a file name intact.
fn decode_path(url: &str) -> String {
    let raw_path = url.split_once('?').map_or(url, |(path, _)| path);
    urlencoding::decode(raw_path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default()
}

/// Join a request path onto the document root, refusing anything that could
/// climb out of it.
fn resolve(serve_root: &Path, request_path: &str) -> Option<PathBuf> {
    let rel = Path::new(request_path);
    rel.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| serve_root.join(rel))
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type_header(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("invalid header value: {value}"))
}

fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response =
        Response::from_data(content).with_header(content_type_header(guess_content_type(path))?);

    request.respond(response)?;
    Ok(())
}

fn serve_html(request: Request, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_header(content_type_header("text/html; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain")?],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Guess MIME content type from file extension.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("map") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        _ => "application/octet-stream",
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// HTML listing of a directory without `index.html`.
///
/// Hidden entries are skipped. An empty directory (nothing built yet)
/// renders the welcome page instead.
fn generate_directory_listing(dir_path: &Path, request_path: &str) -> std::io::Result<String> {
    let mut names: Vec<(String, bool)> = fs::read_dir(dir_path)?
        .filter_map(Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            (name, is_dir)
        })
        .filter(|(name, _)| !name.starts_with('.'))
        .collect();
    names.sort();

    if names.is_empty() {
        return Ok(WELCOME_TEMPLATE
            .replace("{title}", "Nothing built yet")
            .replace("{version}", env!("CARGO_PKG_VERSION")));
    }

    let entries: Vec<String> = names
        .iter()
        .map(|(name, is_dir)| {
            let icon = if *is_dir { "📁" } else { "📄" };
            let href = if request_path.is_empty() {
                format!("/{name}")
            } else {
                format!("/{request_path}/{name}")
            };
            format!(r#"<li><span class="icon">{icon}</span><a href="{href}">{name}</a></li>"#)
        })
        .collect();

    let parent_link = if request_path.is_empty() {
        String::new()
    } else {
        let parent_path = Path::new(request_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            r#"<li class="parent"><span class="icon">📂</span><a href="/{parent_path}">..</a></li>"#
        )
    };

    // Template placeholders, not format args
    #[allow(clippy::literal_string_with_formatting_args)]
    let html = DIRECTORY_TEMPLATE
        .replace("{path}", request_path)
        .replace("{parent_link}", &parent_link)
        .replace("{entries}", &entries.join("\n            "));
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{test_config, write_file};
    use std::{
        io::{Read, Write},
        net::TcpStream,
    };
    use tempfile::tempdir;

    /// Minimal HTTP/1.1 GET returning (status code, body).
    fn get(addr: SocketAddr, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = raw.split_once("\r\n\r\n").map(|(_, b)| b.to_owned()).unwrap_or_default();
        (status, body)
    }

    fn serve(root: &Path) -> ServerHandle {
        let mut config = test_config(root);
        config.serve.port = 0;
        start_server(Box::leak(Box::new(config))).unwrap()
    }

    #[test]
    fn test_root_serves_index() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "dist/index.html", "<h1>home</h1>");

        let server = serve(dir.path());
        let (status, body) = get(server.addr(), "/");
        assert_eq!(status, 200);
        assert_eq!(body, "<h1>home</h1>");
        server.shutdown();
    }

    #[test]
    fn test_serves_files_and_query_strings() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "dist/Main.js", "var Elm = {};");
        write_file(dir.path(), "dist/my page.html", "spaced");

        let server = serve(dir.path());
        assert_eq!(get(server.addr(), "/Main.js?t=1").1, "var Elm = {};");
        assert_eq!(get(server.addr(), "/my%20page.html").1, "spaced");
        server.shutdown();
    }

    #[test]
    fn test_encoded_question_mark_in_file_name() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "dist/what?.txt", "answer");

        let server = serve(dir.path());
        assert_eq!(get(server.addr(), "/what%3F.txt?v=2"), (200, "answer".to_owned()));
        server.shutdown();
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/Main.js?t=1"), "/Main.js");
        assert_eq!(decode_path("/my%20page.html"), "/my page.html");
        assert_eq!(decode_path("/what%3F.txt?v=2"), "/what?.txt");
        assert_eq!(decode_path("/"), "/");
    }

    #[test]
    fn test_missing_file_is_404() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "dist/index.html", "x");

        let server = serve(dir.path());
        assert_eq!(get(server.addr(), "/nope.js").0, 404);
        server.shutdown();
    }

    #[test]
    fn test_parent_traversal_is_404() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "secret.txt", "hidden");
        write_file(dir.path(), "dist/index.html", "x");

        let server = serve(dir.path());
        assert_eq!(get(server.addr(), "/%2E%2E/secret.txt").0, 404);
        server.shutdown();
    }

    #[test]
    fn test_directory_listing() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "dist/pages/about.html", "about");
        write_file(dir.path(), "dist/pages/.hidden", "x");

        let server = serve(dir.path());
        let (status, body) = get(server.addr(), "/pages/");
        assert_eq!(status, 200);
        assert!(body.contains(r#"<a href="/pages/about.html">about.html</a>"#));
        assert!(!body.contains(".hidden"));
        assert!(body.contains(r#"<a href="/">..</a>"#));
        server.shutdown();
    }

    #[test]
    fn test_empty_output_shows_welcome() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();

        let server = serve(dir.path());
        let (status, body) = get(server.addr(), "/");
        assert_eq!(status, 200);
        assert!(body.contains("Nothing built yet"));
        server.shutdown();
    }

    #[test]
    fn test_port_in_use_is_fatal() {
        let dir = tempdir().unwrap();
        let first = serve(dir.path());

        let mut config = test_config(dir.path());
        config.serve.port = first.addr().port();
        assert!(start_server(Box::leak(Box::new(config))).is_err());
        first.shutdown();
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/site/dist");
        assert_eq!(resolve(root, "a/b.html"), Some(PathBuf::from("/site/dist/a/b.html")));
        assert_eq!(resolve(root, ""), Some(PathBuf::from("/site/dist")));
        assert_eq!(resolve(root, "a/../../etc/passwd"), None);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("Main.js")), "application/javascript; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("index.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }
}
