//! Integration tests for the conversion pipeline

use ampify::{Console, ConvertConfig, Converter, Error};
use std::fs;
use std::path::Path;
use std::process::Command;
use tiny_http::{Header, Response, Server};

const SHOP_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Test Shop</title>
<link rel="stylesheet" href="/static/site.css">
<script src="/static/app.js"></script>
</head>
<body>
<shop-banner onclick="track()">Sale</shop-banner>
<a href="/cart" onclick="track()">Cart</a>
<a href="more.html">More</a>
<img src="//cdn.test/logo.png" alt="logo">
</body>
</html>"#;

/// Start a test HTTP server on a free port and return its base URL
fn start_test_server() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = match request.url() {
                "/shop/index.html" => Response::from_string(SHOP_PAGE).with_header(
                    "Content-Type: text/html; charset=utf-8"
                        .parse::<Header>()
                        .unwrap(),
                ),
                "/redirect" => Response::from_string("").with_status_code(302).with_header(
                    "Location: /shop/index.html".parse::<Header>().unwrap(),
                ),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    base
}

fn converter(dir: &Path) -> Converter {
    let config = ConvertConfig {
        out_dir: dir.to_path_buf(),
        css_path: dir.join("inline.css"),
        ..Default::default()
    };
    Converter::new(config, Console::with_writer("Test", std::io::sink())).unwrap()
}

#[cfg(feature = "http")]
#[tokio::test]
async fn test_converts_served_page() {
    let base = start_test_server();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("inline.css"), "h1 { color: red !important; }").unwrap();

    let url = format!("{}/shop/index.html", base);
    let conversion = converter(dir.path()).run(&url).await.unwrap();

    let original = fs::read_to_string(dir.path().join("original.html")).unwrap();
    assert_eq!(original, SHOP_PAGE);
    assert!(!conversion.input_report.passed());

    let modified = fs::read_to_string(dir.path().join("modified.html")).unwrap();
    assert!(modified.starts_with("<!DOCTYPE html>\n<html amp lang=\"en\">"));
    assert!(!modified.contains("app.js"));
    assert!(!modified.contains("site.css"));
    assert!(!modified.contains("onclick"));
    assert!(!modified.contains("shop-banner"));
    assert!(modified.contains("<div>Sale</div>"));
    assert!(modified.contains(&format!(r#"<a href="{}/cart">Cart</a>"#, base)));
    assert!(modified.contains(&format!(r#"<a href="{}/shop/more.html">More</a>"#, base)));
    assert!(modified.contains(r#"<img src="https://cdn.test/logo.png" alt="logo">"#));
    assert!(modified.contains(&format!(r#"<link rel="canonical" href="{}">"#, url)));
    assert!(modified.contains("<title>Test Shop</title>"));
    assert_eq!(modified.matches("<title>").count(), 1);
    assert!(modified.contains("<style amp-custom>h1 { color: red; }</style>"));
}

#[cfg(feature = "http")]
#[tokio::test]
async fn test_follows_redirects() {
    let base = start_test_server();
    let dir = tempfile::tempdir().unwrap();

    let conversion = converter(dir.path())
        .run(&format!("{}/redirect", base))
        .await
        .unwrap();
    assert_eq!(conversion.page_url.path(), "/shop/index.html");

    let modified = fs::read_to_string(&conversion.modified_path).unwrap();
    assert!(modified.contains(&format!(r#"<a href="{}/shop/more.html">More</a>"#, base)));
    assert!(modified.contains("<style amp-custom></style>"));
}

#[cfg(feature = "http")]
#[tokio::test]
async fn test_missing_page_is_a_load_error() {
    let base = start_test_server();
    let dir = tempfile::tempdir().unwrap();

    let res = converter(dir.path())
        .run(&format!("{}/nope", base))
        .await;
    assert!(matches!(res, Err(Error::LoadError(_))));
    assert!(!dir.path().join("original.html").exists());
}

#[cfg(feature = "cdp")]
#[test]
#[ignore] // Requires Chrome to be installed
fn test_cdp_renderer_load_url() {
    use ampify::{RenderConfig, Renderer};

    let base = start_test_server();
    let mut renderer =
        ampify::new_renderer(RenderConfig::default()).expect("Failed to create renderer");
    renderer
        .load_url(&format!("{}/shop/index.html", base))
        .expect("Failed to load URL");
    let html = renderer.content().unwrap();
    assert!(html.contains("Test Shop"));
    renderer.close().unwrap();
}

#[test]
fn test_cli_without_url_prints_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_ampify"))
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run ampify");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Must provide a url parameter. Example:"));
    assert!(stdout.contains("ampify --url https://www.example.com"));
}

#[test]
fn test_cli_rejects_bad_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_ampify"))
        .args(["--url", "not a url", "--out-dir"])
        .arg(dir.path())
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run ampify");

    assert!(!output.status.success());
    assert!(!dir.path().join("modified.html").exists());
}
