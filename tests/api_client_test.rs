use mockito::Server;

use simple_video_downloader::api::{
    ApiClient, ApiConfig, ApiError, ByteSource, MetadataProvider, PlayabilityStatus,
};
use simple_video_downloader::{EngineError, StreamCatalogResolver, VideoIdentifier};
use std::sync::Arc;

const VIDEO_ID: &str = "dQw4w9WgXcQ";

fn client_for(server: &Server) -> ApiClient {
    ApiClient::new(ApiConfig {
        base_url: server.url(),
        ..ApiConfig::default()
    })
    .unwrap()
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_metadata_lookup() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/videos/dQw4w9WgXcQ")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "title": "Sample YouTube Video Title",
                "playability_status": "OK",
                "streams": [
                    {"resolution": "720p", "codec": "avc1", "container": "mp4",
                     "content_length": 3000, "url": "http://cdn.invalid/720.mp4"},
                    {"resolution": "audio", "codec": "opus", "container": "webm",
                     "url": "http://cdn.invalid/audio.webm"}
                ]
            }"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let id = VideoIdentifier::parse(VIDEO_ID).unwrap();
    let metadata = client.lookup(&id).await.unwrap();
    assert_eq!(metadata.title, "Sample YouTube Video Title");
    assert_eq!(metadata.playability_status, PlayabilityStatus::Ok);
    assert_eq!(metadata.streams.len(), 2);
    assert_eq!(metadata.streams[0].content_length, Some(3000));
    mock.assert_async().await;

    // the audio-only entry is not a resolution
    let catalog = StreamCatalogResolver::new(Arc::new(client))
        .resolve(&id)
        .await
        .unwrap();
    assert_eq!(catalog.resolution_labels(), vec!["720p".to_string()]);
    assert_eq!(
        catalog.thumbnail_url,
        "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
    );
}

#[tokio::test]
async fn test_metadata_error_statuses() {
    let mut server = Server::new_async().await;
    let _missing = server
        .mock("GET", "/videos/dQw4w9WgXcQ")
        .with_status(404)
        .create_async()
        .await;
    let _blocked = server
        .mock("GET", "/videos/abc123def45")
        .with_status(403)
        .create_async()
        .await;
    let _broken = server
        .mock("GET", "/videos/zzzzzzzzzzz")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let client = Arc::new(client_for(&server));
    let id = VideoIdentifier::parse(VIDEO_ID).unwrap();
    assert!(matches!(
        client.lookup(&id).await,
        Err(ApiError::Status(404))
    ));

    let resolver = StreamCatalogResolver::new(client);
    assert!(matches!(
        resolver.resolve(&id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        resolver.resolve_url("https://youtu.be/abc123def45").await,
        Err(EngineError::Restricted(_))
    ));
    assert!(matches!(
        resolver.resolve_url("zzzzzzzzzzz").await,
        Err(EngineError::Unreachable(_))
    ));
}

#[tokio::test]
async fn test_unreachable_service() {
    let client = Arc::new(
        ApiClient::new(ApiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ApiConfig::default()
        })
        .unwrap(),
    );
    let resolver = StreamCatalogResolver::new(client);
    assert!(matches!(
        resolver.resolve_url(VIDEO_ID).await,
        Err(EngineError::Unreachable(_))
    ));
}

#[tokio::test]
async fn test_probe_ranged_source() {
    let mut server = Server::new_async().await;
    let data = body(3000);
    let mock = server
        .mock("GET", "/media/720.mp4")
        .match_header("range", "bytes=0-0")
        .with_status(206)
        .with_header("content-range", "bytes 0-0/3000")
        .with_body(&data[..1])
        .create_async()
        .await;

    let client = client_for(&server);
    let info = client
        .probe(&format!("{}/media/720.mp4", server.url()))
        .await
        .unwrap();
    assert_eq!(info.content_length, Some(3000));
    assert!(info.supports_range);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_probe_without_range_support() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/media/720.mp4")
        .with_status(200)
        .with_body(body(3000))
        .create_async()
        .await;

    let client = client_for(&server);
    let info = client
        .probe(&format!("{}/media/720.mp4", server.url()))
        .await
        .unwrap();
    assert_eq!(info.content_length, Some(3000));
    assert!(!info.supports_range);
}

#[tokio::test]
async fn test_fetch_range() {
    let mut server = Server::new_async().await;
    let data = body(3000);
    let _mock = server
        .mock("GET", "/media/720.mp4")
        .match_header("range", "bytes=1024-2047")
        .with_status(206)
        .with_header("content-range", "bytes 1024-2047/3000")
        .with_body(&data[1024..2048])
        .create_async()
        .await;

    let client = client_for(&server);
    let bytes = client
        .fetch_range(&format!("{}/media/720.mp4", server.url()), 1024, 2047)
        .await
        .unwrap();
    assert_eq!(&bytes[..], &data[1024..2048]);
}

#[tokio::test]
async fn test_fetch_range_ignored_by_server() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/media/720.mp4")
        .with_status(200)
        .with_body(body(3000))
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .fetch_range(&format!("{}/media/720.mp4", server.url()), 0, 1023)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_probe_empty_resource() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/media/empty.mp4")
        .match_header("range", "bytes=0-0")
        .with_status(416)
        .with_header("content-range", "bytes */0")
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/media/other.mp4")
        .with_status(416)
        .with_header("content-range", "bytes */5000")
        .create_async()
        .await;

    let client = client_for(&server);
    let info = client
        .probe(&format!("{}/media/empty.mp4", server.url()))
        .await
        .unwrap();
    assert_eq!(info.content_length, Some(0));
    assert!(info.supports_range);

    // a non-empty resource refusing `bytes=0-0` is still an error
    let err = client
        .probe(&format!("{}/media/other.mp4", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status(416)));
}
