//! HTTP 入口
//!
//! - `POST /api/plugins/:action/:id`、`POST /api/plugins/:action`：dispatch，返回信封与状态码；
//!   not-found 信号映射为不带信封的 404
//! - `GET /api/jobs`、`GET /api/jobs/:id`：作业记录查询

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::core::{ActionDispatcher, DispatchReply, RequestContext};
use crate::jobs::{JobQueue, JobRecord};

pub struct WebState {
    pub dispatcher: Arc<ActionDispatcher>,
    pub queue: Arc<JobQueue>,
    pub default_site: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DispatchQuery {
    pub site: Option<String>,
    /// 卸载时本节点是否作为集群发起者
    pub cluster: Option<bool>,
}

impl WebState {
    fn request_context(&self, query: &DispatchQuery) -> RequestContext {
        RequestContext::resolve(query.site.as_deref(), &self.default_site, query.cluster)
    }
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/api/plugins/:action", post(dispatch_without_id))
        .route("/api/plugins/:action/:id", post(dispatch_with_id))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .with_state(state)
}

fn into_response(reply: DispatchReply) -> Response {
    match reply {
        DispatchReply::Envelope { code, envelope } => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(envelope)).into_response()
        }
        DispatchReply::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn dispatch_with_id(
    State(state): State<Arc<WebState>>,
    Path((action, id)): Path<(String, String)>,
    Query(query): Query<DispatchQuery>,
) -> Response {
    let ctx = state.request_context(&query);
    into_response(state.dispatcher.dispatch(&action, Some(&id), &ctx).await)
}

async fn dispatch_without_id(
    State(state): State<Arc<WebState>>,
    Path(action): Path<String>,
    Query(query): Query<DispatchQuery>,
) -> Response {
    let ctx = state.request_context(&query);
    into_response(state.dispatcher.dispatch(&action, None, &ctx).await)
}

async fn list_jobs(State(state): State<Arc<WebState>>) -> Json<Vec<JobRecord>> {
    Json(state.queue.list().await)
}

async fn get_job(
    State(state): State<Arc<WebState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, StatusCode> {
    state
        .queue
        .get(&id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::{in_memory_services, ControllerBuilder};
    use crate::services::memory::CatalogEntry;
    use crate::services::{InMemoryPluginStore, ThemeDefinition};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> (Router, crate::core::Controller) {
        let store = Arc::new(InMemoryPluginStore::with_entries([
            CatalogEntry::new("aurora").with_theme(ThemeDefinition::default()),
        ]));
        let controller =
            ControllerBuilder::new(AppConfig::default(), in_memory_services(store)).build();
        let state = Arc::new(WebState {
            dispatcher: Arc::clone(&controller.dispatcher),
            queue: Arc::clone(&controller.queue),
            default_site: "default".into(),
        });
        (router(state), controller)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_install_returns_job_id_and_record() {
        let (app, _controller) = app();
        let (status, body) = call(app.clone(), "POST", "/api/plugins/install/plugin-x").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "success");
        let job_id = json["data"].as_str().unwrap().to_string();

        let (status, body) = call(app, "GET", &format!("/api/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        let record: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(record["name"], "install-plugin-plugin-x");
        assert_eq!(record["initiator"], true);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_bad_request() {
        let (app, _controller) = app();
        let (status, body) = call(app, "POST", "/api/plugins/uninstall").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "failure");
    }

    #[tokio::test]
    async fn test_unknown_theme_is_bare_not_found() {
        let (app, _controller) = app();
        let (status, body) = call(app, "POST", "/api/plugins/set_theme/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_cluster_query_flag() {
        let (app, controller) = app();
        let (status, body) =
            call(app, "POST", "/api/plugins/uninstall/aurora?cluster=false").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        let record = controller
            .queue
            .get(json["data"].as_str().unwrap())
            .await
            .unwrap();
        assert!(!record.initiator);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (app, _controller) = app();
        let (status, _) = call(app, "GET", "/api/jobs/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
