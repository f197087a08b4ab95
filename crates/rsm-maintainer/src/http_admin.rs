//! Administration API adapter speaking JSON over HTTP.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET /membership` - the membership document, or `null`
//! - `PUT /membership` - submit a replacement; `409` on a stale version
//!   with body `{"current": <version>}`
//! - `GET /status` - cluster status snapshot

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rsm_protocol::{ClusterStatus, MembershipDocument};
use serde::Deserialize;

use crate::{AdminApi, AdminError};

pub struct HttpAdmin {
    base: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ConflictBody {
    current: u64,
}

fn unavailable(e: reqwest::Error) -> AdminError {
    AdminError::Unavailable(e.to_string())
}

impl HttpAdmin {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, AdminError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }
}

#[async_trait]
impl AdminApi for HttpAdmin {
    async fn read_membership_document(&self) -> Result<Option<serde_json::Value>, AdminError> {
        let resp = self
            .client
            .get(self.url("membership"))
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let value: serde_json::Value = resp.json().await.map_err(unavailable)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn submit_membership_document(&self, doc: &MembershipDocument) -> Result<(), AdminError> {
        let resp = self
            .client
            .put(self.url("membership"))
            .json(doc)
            .send()
            .await
            .map_err(unavailable)?;
        if resp.status() == StatusCode::CONFLICT {
            let current = resp
                .json::<ConflictBody>()
                .await
                .map(|b| b.current)
                .unwrap_or_else(|_| doc.version.saturating_sub(1));
            return Err(AdminError::Conflict {
                submitted: doc.version,
                current,
            });
        }
        resp.error_for_status().map_err(unavailable)?;
        Ok(())
    }

    async fn query_cluster_status(&self) -> Result<ClusterStatus, AdminError> {
        self.client
            .get(self.url("status"))
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json::<ClusterStatus>()
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as Code;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Serve `router` on an ephemeral port and point an adapter at it.
    async fn stub(router: Router) -> HttpAdmin {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        HttpAdmin::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap()
    }

    fn doc(version: u64) -> MembershipDocument {
        MembershipDocument::new(version)
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let admin = HttpAdmin::new("http://127.0.0.1:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(admin.url("status"), "http://127.0.0.1:8080/status");
    }

    #[tokio::test]
    async fn null_document_reads_as_none() {
        let admin = stub(Router::new().route("/membership", get(|| async { Json(Value::Null) }))).await;
        assert_eq!(admin.read_membership_document().await.unwrap(), None);
    }

    #[tokio::test]
    async fn document_is_returned_verbatim() {
        let body = json!({"version": 3, "members": [{"_id": 1, "host": "a:27017"}]});
        let served = body.clone();
        let admin = stub(Router::new().route(
            "/membership",
            get(move || async move { Json(served) }),
        ))
        .await;
        assert_eq!(admin.read_membership_document().await.unwrap(), Some(body));
    }

    #[tokio::test]
    async fn conflict_reports_current_version_from_body() {
        let admin = stub(Router::new().route(
            "/membership",
            axum::routing::put(|| async { (Code::CONFLICT, Json(json!({"current": 7}))) }),
        ))
        .await;
        let err = admin.submit_membership_document(&doc(5)).await.unwrap_err();
        assert!(matches!(
            err,
            AdminError::Conflict {
                submitted: 5,
                current: 7
            }
        ));
    }

    #[tokio::test]
    async fn conflict_without_body_assumes_previous_version() {
        let admin = stub(Router::new().route(
            "/membership",
            axum::routing::put(|| async { Code::CONFLICT }),
        ))
        .await;
        let err = admin.submit_membership_document(&doc(5)).await.unwrap_err();
        assert!(matches!(
            err,
            AdminError::Conflict {
                submitted: 5,
                current: 4
            }
        ));
    }

    #[tokio::test]
    async fn accepted_submission_is_ok() {
        let admin = stub(Router::new().route(
            "/membership",
            axum::routing::put(|Json(body): Json<Value>| async move {
                if body["version"] == 2 {
                    Code::NO_CONTENT
                } else {
                    Code::BAD_REQUEST
                }
            }),
        ))
        .await;
        admin.submit_membership_document(&doc(2)).await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let admin = stub(
            Router::new()
                .route(
                    "/membership",
                    get(|| async { Code::SERVICE_UNAVAILABLE })
                        .put(|| async { Code::INTERNAL_SERVER_ERROR }),
                )
                .route("/status", get(|| async { Code::BAD_GATEWAY })),
        )
        .await;
        assert!(matches!(
            admin.read_membership_document().await,
            Err(AdminError::Unavailable(_))
        ));
        assert!(matches!(
            admin.submit_membership_document(&doc(2)).await,
            Err(AdminError::Unavailable(_))
        ));
        assert!(matches!(
            admin.query_cluster_status().await,
            Err(AdminError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let admin = HttpAdmin::new(&format!("http://{addr}"), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            admin.query_cluster_status().await,
            Err(AdminError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn status_snapshot_is_decoded() {
        let admin = stub(Router::new().route(
            "/status",
            get(|| async {
                Json(json!({
                    "ok": 1,
                    "date": "2024-05-01T12:00:00Z",
                    "members": [
                        {"_id": 0, "name": "a:27017", "state": 1, "health": 1},
                        {"_id": 1, "name": "b:27017", "state": 8, "health": 0,
                         "lastHeartbeatRecv": "2024-05-01T10:00:00Z"}
                    ]
                }))
            }),
        ))
        .await;
        let status = admin.query_cluster_status().await.unwrap();
        assert!(status.is_ok());
        assert!(status.has_primary());
        let members = status.members.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].name, "b:27017");
        assert!(members[1].looks_dead(
            status.date.unwrap(),
            Duration::from_secs(3600)
        ));
    }
}
