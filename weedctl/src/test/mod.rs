//! End-to-end tests: the real reqwest client against a mocked detection service.

use crate::config::Config;
use crate::console::save_downloads;
use crate::http::ReqwestHttpClient;
use crate::page::{Region, SharedPage};
use crate::registration::{RegistrationForm, RegistrationOutcome, SUCCESS_MESSAGE};
use crate::task::RedirectOutcome;
use crate::upload::{ArchiveUploadForm, CoordinateUploadForm, Corners, SelectedFile, UploadOutcome};
use crate::{Client, Error};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        server_url: Url::parse(&format!("{}/", server.uri())).unwrap(),
        redirect_delay: std::time::Duration::from_millis(20),
        ..Default::default()
    }
}

fn client_for(config: &Config) -> Client<ReqwestHttpClient> {
    Client::new(ReqwestHttpClient::new(config.request_timeout).unwrap(), config).unwrap()
}

/// Accept one connection, read the whole request and answer with `response` verbatim.
///
/// Used where the status line itself matters, which wiremock always writes canonically.
pub(crate) async fn serve_raw_once(response: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
            let complete = if head.contains("transfer-encoding: chunked") {
                request.ends_with(b"0\r\n\r\n")
            } else {
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                request.len() >= end + 4 + length
            };
            if complete {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_e2e_geotiff_upload_and_save() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload_geotiff/"))
        .and(header("accept", "application/json"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"field.tif\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .insert_header("content-disposition", "attachment; filename=weed_detections.zip")
                .set_body_bytes(b"PK\x03\x04shapes".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("field.tif");
    std::fs::write(&source, b"II*\x00tiff").unwrap();

    let config = Config {
        download_dir: dir.path().join("downloads"),
        ..config_for(&server)
    };
    let client = client_for(&config);
    let page = SharedPage::default();

    let file = SelectedFile::open(&source).await.unwrap();
    assert_eq!(file.content_type, "image/tiff");

    let outcome = client
        .upload_archive(ArchiveUploadForm { files: vec![file] }, &page, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, UploadOutcome::Downloaded { size: 10, .. }));

    let snapshot = page.snapshot();
    assert_eq!(snapshot.progress().text(), "100%");
    assert_eq!(snapshot.downloads()[0].filename, "weed_detections.zip");

    let written = save_downloads(&page, &config.download_dir).await.unwrap();
    assert_eq!(written, vec![config.download_dir.join("weed_detections.zip")]);
    assert_eq!(std::fs::read(&written[0]).unwrap(), b"PK\x03\x04shapes");
}

#[tokio::test]
async fn test_e2e_coordinate_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload-image/"))
        .and(body_string_contains("name=\"top_right\""))
        .and(body_string_contains("52.1,4.4"))
        .and(body_string_contains("name=\"image\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Image processed successfully",
            "download_url": "/download/shapefile.zip"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = client_for(&config);
    let page = SharedPage::default();

    let form = CoordinateUploadForm {
        corners: Corners {
            top_left: "52.1,4.3".to_string(),
            top_right: "52.1,4.4".to_string(),
            bottom_right: "52.0,4.4".to_string(),
            bottom_left: "52.0,4.3".to_string(),
        },
        // wiremock's string matchers only see bodies that are valid UTF-8
        images: vec![SelectedFile::new("drone.png", "image/png", b"PNG drone frame".to_vec())],
    };
    client
        .upload_with_coordinates(form, &page, &CancellationToken::new())
        .await
        .unwrap();

    let snapshot = page.snapshot();
    assert_eq!(snapshot.paragraphs(Region::Result), vec!["Image processed successfully"]);
    assert_eq!(snapshot.links(Region::Result)[0].1, "/download/shapefile.zip");
}

#[test_log::test(tokio::test)]
async fn test_e2e_upload_renders_server_reason_phrase() {
    let server_url =
        serve_raw_once("HTTP/1.1 499 Client Closed Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
    let config = Config {
        server_url,
        ..Default::default()
    };
    let client = client_for(&config);
    let page = SharedPage::default();

    let err = client
        .upload_archive(
            ArchiveUploadForm {
                files: vec![SelectedFile::new("field.tif", "image/tiff", b"tiff".to_vec())],
            },
            &page,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 499, .. }));
    assert_eq!(
        page.snapshot().paragraphs(Region::Message),
        vec!["Error uploading file: Client Closed Request"]
    );
}

#[tokio::test]
async fn test_e2e_upload_not_found() {
    let server = MockServer::start().await;
    let config = config_for(&server);
    let client = client_for(&config);
    let page = SharedPage::default();

    let err = client
        .upload_archive(
            ArchiveUploadForm {
                files: vec![SelectedFile::new("field.tif", "image/tiff", b"tiff".to_vec())],
            },
            &page,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    assert_eq!(
        page.snapshot().paragraphs(Region::Message),
        vec!["Error uploading file: Not Found"]
    );
}

#[tokio::test]
async fn test_e2e_registration_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_json(serde_json::json!({
            "Name": "Ada",
            "Email": "ada@example.com",
            "Address": "12 Field Lane",
            "Phone Number": "555-0100"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"detail": "User registered successfully"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "Email already used"})))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = client_for(&config);
    let form = RegistrationForm {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        phone: "555-0100".to_string(),
        address: "12 Field Lane".to_string(),
    };

    let page = SharedPage::default();
    let outcome = client
        .register(form.clone(), &page, &CancellationToken::new())
        .await
        .unwrap();
    let RegistrationOutcome::Registered(redirect) = outcome else {
        panic!("expected first registration to be accepted");
    };
    assert_eq!(page.snapshot().text(Region::Message), SUCCESS_MESSAGE);
    assert_eq!(redirect.run(&page).await, RedirectOutcome::Navigated);
    assert_eq!(page.snapshot().location(), "/app");

    let page = SharedPage::default();
    let outcome = client.register(form, &page, &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, RegistrationOutcome::Rejected { .. }));
    assert!(page.snapshot().text(Region::Message).contains("Email already used"));
}
