//! Defines routes for the gateway's bucket, file and listing operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /buckets`: create bucket
//!   - `GET    /buckets`: list buckets
//!   - `GET    /buckets/{bucket}/orphans`: blobs with no file record
//!
//! - **File-level endpoints**
//!   - `POST   /buckets/{bucket}/files`: upload (multipart `file`)
//!   - `GET    /buckets/{bucket}/files`: list files
//!   - `GET    /buckets/{bucket}/files/{file_id}`: download
//!   - `PUT    /buckets/{bucket}/files/{file_id}`: replace content
//!   - `DELETE /buckets/{bucket}/files/{file_id}`: delete
//!   - `GET    /buckets/{bucket}/files/{file_id}/link`: signed link
//!   - `PUT    /buckets/{bucket}/keys/{*key}`: replace content by blob key
//!
//! - **Namespace endpoints**
//!   - `GET    /list/files`: one hierarchy level
//!   - `GET    /list/files/v2`: full tree with links
//!   - `GET    /blobs/{*key}`: signed-link download

use crate::handlers::{
    AppState,
    file_handlers::{
        create_bucket, delete_file, download_file, file_link, list_buckets, list_files,
        list_orphans, update_file, update_file_by_key, upload_file,
    },
    health_handlers::{healthz, readyz},
    listing_handlers::{download_signed_blob, list_hierarchy, list_tree},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router for every gateway route.
///
/// Request bodies are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", post(create_bucket).get(list_buckets))
        .route("/buckets/{bucket}/orphans", get(list_orphans))
        // File-level routes
        .route(
            "/buckets/{bucket}/files",
            post(upload_file).get(list_files),
        )
        .route(
            "/buckets/{bucket}/files/{file_id}",
            get(download_file).put(update_file).delete(delete_file),
        )
        .route("/buckets/{bucket}/files/{file_id}/link", get(file_link))
        .route("/buckets/{bucket}/keys/{*key}", put(update_file_by_key))
        // Namespace routes
        .route("/list/files", get(list_hierarchy))
        .route("/list/files/v2", get(list_tree))
        .route("/blobs/{*key}", get(download_signed_blob))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::signing::UrlSigner,
        testing::{MemoryBlobStore, MemoryMetadataIndex, memory_gateway},
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "gateway-test-boundary";

    struct Harness {
        app: Router,
        signer: UrlSigner,
        blobs: Arc<MemoryBlobStore>,
        index: Arc<MemoryMetadataIndex>,
    }

    fn harness(max_upload_bytes: usize) -> Harness {
        let (gateway, blobs, index) = memory_gateway(100);
        let signer = UrlSigner::new("router-secret", "http://gateway.test");
        let app = routes(max_upload_bytes).with_state(AppState {
            gateway,
            signer: signer.clone(),
        });
        Harness {
            app,
            signer,
            blobs,
            index,
        }
    }

    fn multipart_body(file_name: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(method: &str, uri: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, "image/png", content)))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_assets(app: &Router) {
        let resp = send(app, json_request("POST", "/buckets", json!({"name": "assets"}))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    async fn upload_logo(app: &Router, content: &[u8]) -> Value {
        let resp = send(
            app,
            multipart_request("POST", "/buckets/assets/files", "logo.png", content),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        json_body(resp).await
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let h = harness(1024);
        let resp = send(&h.app, get("/healthz")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn readyz_reports_each_check() {
        let h = harness(1024);
        let resp = send(&h.app, get("/readyz")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["checks"]["index"]["ok"], json!(true));
        assert_eq!(body["checks"]["blob_store"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn bucket_errors_use_the_error_envelope() {
        let h = harness(1024);
        create_assets(&h.app).await;

        let resp = send(&h.app, json_request("POST", "/buckets", json!({"name": "assets"}))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "BucketExists");

        let resp = send(&h.app, get("/buckets/ghost/files")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "BucketNotFound");
    }

    #[tokio::test]
    async fn upload_download_update_delete_over_http() {
        let h = harness(1024);
        create_assets(&h.app).await;

        let body = upload_logo(&h.app, b"png-v1").await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["verification"]["state"], "confirmed");
        assert_eq!(body["data"]["file"]["file_name"], "logo.png");
        let id = body["data"]["file"]["file_id"].as_str().unwrap().to_string();
        let blob_key = body["data"]["file"]["blob_key"].as_str().unwrap().to_string();

        let resp = send(&h.app, get(&format!("/buckets/assets/files/{id}"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"logo.png\""
        );
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"png-v1");

        let resp = send(
            &h.app,
            multipart_request("PUT", &format!("/buckets/assets/files/{id}"), "logo.png", b"png-v1"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["data"]["status"], "unchanged");

        let resp = send(
            &h.app,
            multipart_request("PUT", &format!("/buckets/assets/keys/{blob_key}"), "logo.png", b"png-v2"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "updated");
        assert_eq!(body["data"]["file"]["file_id"], id.as_str());

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/buckets/assets/files/{id}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, delete).await.status(), StatusCode::OK);

        let resp = send(&h.app, get(&format!("/buckets/assets/files/{id}"))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["error"], "FileNotFound");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let h = harness(1024);
        create_assets(&h.app).await;
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/buckets/assets/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let resp = send(&h.app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "InvalidArgument");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let h = harness(64);
        create_assets(&h.app).await;
        let resp = send(
            &h.app,
            multipart_request("POST", "/buckets/assets/files", "big.bin", &[0u8; 256]),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(h.blobs.put_count(), 0);
    }

    #[tokio::test]
    async fn metadata_failure_surfaces_and_orphan_is_reported() {
        let h = harness(1024);
        create_assets(&h.app).await;
        h.index.fail_file_inserts(true);

        let resp = send(
            &h.app,
            multipart_request("POST", "/buckets/assets/files", "logo.png", b"png"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"], "MetadataWriteFailed");

        let resp = send(&h.app, get("/buckets/assets/orphans")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["orphaned_blob_keys"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn link_endpoint_validates_ttl() {
        let h = harness(1024);
        create_assets(&h.app).await;
        let body = upload_logo(&h.app, b"png").await;
        let id = body["data"]["file"]["file_id"].as_str().unwrap().to_string();

        let resp = send(&h.app, get(&format!("/buckets/assets/files/{id}/link?ttl=60"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let url = json_body(resp).await["data"]["url"].as_str().unwrap().to_string();
        assert!(url.ends_with("?ttl=60"));

        let resp = send(&h.app, get(&format!("/buckets/assets/files/{id}/link?ttl=-5"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_endpoints_merge_pages() {
        let h = harness(1024);
        create_assets(&h.app).await;
        upload_logo(&h.app, b"one").await;
        upload_logo(&h.app, b"two").await;

        let resp = send(&h.app, get("/list/files?prefix=files/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["prefixes"], json!(["files/assets/"]));

        let resp = send(&h.app, get("/list/files/v2")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["files"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["prefixes"], json!(["files/"]));
    }

    #[tokio::test]
    async fn signed_blob_route_checks_signature() {
        let h = harness(1024);
        create_assets(&h.app).await;
        let body = upload_logo(&h.app, b"signed-bytes").await;
        let key = body["data"]["file"]["blob_key"].as_str().unwrap().to_string();

        let expires = chrono::Utc::now().timestamp() + 300;
        let url = h.signer.signed_url(&key, expires);
        let path = url.trim_start_matches("http://gateway.test");
        let resp = send(&h.app, get(path)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"signed-bytes");

        let forged = format!("/blobs/{key}?expires={expires}&signature=00ff");
        let resp = send(&h.app, get(&forged)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "SignatureMismatch");

        let stale = h.signer.signed_url(&key, 1);
        let resp = send(&h.app, get(stale.trim_start_matches("http://gateway.test"))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
