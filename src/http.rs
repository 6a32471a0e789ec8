//! HTTP API for roadmap progression
//!
//! Identity is supplied by the upstream auth gateway in the `X-User-Id` and
//! `X-User-Role` headers and turned into a [`Caller`] before any service call.
//!
//! ## Admin
//! - `GET|POST /admin/roadmaps`
//! - `GET|PATCH|DELETE /admin/roadmaps/{id}` (`?cascade=true` to drop progress)
//! - `POST /admin/roadmaps/{id}/steps`
//! - `PUT /admin/roadmaps/{id}/steps/order` - `{"stepIds": [...]}`
//! - `PATCH|DELETE /admin/steps/{id}`
//! - `GET|POST /admin/roadmaps/{id}/reviewers`, `DELETE .../reviewers/{teacherProfileId}`
//! - `GET /admin/roadmaps/{id}/progress`
//! - `GET /admin/submissions/pending`
//! - `GET /admin/statistics`
//!
//! ## Student
//! - `GET /student/roadmaps?page&limit&recommended=true`
//! - `POST /student/roadmaps/{id}/start`
//! - `GET /student/roadmaps/{id}/progress`
//! - `POST /student/steps/{stepProgressId}/start`
//! - `POST /student/steps/{stepProgressId}/submit`
//! - `GET /student/progress`
//!
//! ## Teacher
//! - `GET /teacher/submissions/pending?page&limit&mine=true`
//! - `POST /teacher/submissions/{stepProgressId}/review`
//!
//! ```bash
//! curl -X POST -H "X-User-Id: u-42" -H "X-User-Role: student" \
//!      http://localhost:8095/student/roadmaps/<roadmap-id>/start
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::caller::{Caller, Role};
use crate::db::roadmaps::RoadmapQuery;
use crate::error::RoadmapError;
use crate::pagination::PageRequest;
use crate::services::response::{
    bad_request, created, error_response, from_delete_bool_result, not_found, ok,
};
use crate::services::Services;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Query string parameters shared by the list and delete routes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub recommended: Option<bool>,
    pub mine: Option<bool>,
    pub cascade: Option<bool>,
    pub status: Option<String>,
    pub target_role_id: Option<String>,
}

impl ListParams {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderBody {
    step_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewerBody {
    teacher_profile_id: String,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), RoadmapError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        let caller = caller_from_headers(req.headers());

        debug!(method = %method, path = %path, "Incoming request");

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return Ok(bad_request(&format!("Failed to read body: {}", e))),
        };

        Ok(route(&self.services, method, &path, &query, caller, &body))
    }
}

/// Resolve the caller from gateway headers
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, RoadmapError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let user_id = header(USER_ID_HEADER)
        .ok_or_else(|| RoadmapError::Unauthorized("missing X-User-Id header".into()))?;
    let role: Role = header(USER_ROLE_HEADER)
        .ok_or_else(|| RoadmapError::Unauthorized("missing X-User-Role header".into()))?
        .parse()?;

    Ok(Caller::new(user_id, role))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, RoadmapError> {
    Ok(serde_json::from_slice(body)?)
}

fn parse_query(query: &str) -> Result<ListParams, RoadmapError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| RoadmapError::InvalidInput(format!("Invalid query string: {}", e)))
}

/// Route one request to its service call
///
/// Kept free of socket types so it can be driven directly from tests.
pub fn route(
    services: &Services,
    method: Method,
    path: &str,
    query: &str,
    caller: Result<Caller, RoadmapError>,
    body: &Bytes,
) -> Response<Full<Bytes>> {
    match dispatch(services, method, path, query, caller, body) {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

fn dispatch(
    services: &Services,
    method: Method,
    path: &str,
    query: &str,
    caller: Result<Caller, RoadmapError>,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>, RoadmapError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let params = parse_query(query)?;
    let page = params.page_request();

    let response = match (method, segments.as_slice()) {
        (Method::GET, ["health"]) => ok(&serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "db": services.db.stats()?,
        })),

        // Admin: roadmaps
        (Method::GET, ["admin", "roadmaps"]) => {
            let query = RoadmapQuery {
                status: params.status.clone(),
                target_role_id: params.target_role_id.clone(),
            };
            ok(&services.catalog.list(&caller?, &query, page)?)
        }
        (Method::POST, ["admin", "roadmaps"]) => {
            created(&services.catalog.create(&caller?, parse_body(body)?)?)
        }
        (Method::GET, ["admin", "roadmaps", id]) => ok(&services.catalog.get(&caller?, id)?),
        (Method::PATCH, ["admin", "roadmaps", id]) => {
            ok(&services.catalog.update(&caller?, id, parse_body(body)?)?)
        }
        (Method::DELETE, ["admin", "roadmaps", id]) => from_delete_bool_result(
            services
                .catalog
                .delete(&caller?, id, params.cascade.unwrap_or(false)),
            "Roadmap not found",
        ),

        // Admin: steps
        (Method::POST, ["admin", "roadmaps", id, "steps"]) => {
            created(&services.catalog.add_step(&caller?, id, parse_body(body)?)?)
        }
        (Method::PUT, ["admin", "roadmaps", id, "steps", "order"]) => {
            let order: ReorderBody = parse_body(body)?;
            ok(&services.catalog.reorder_steps(&caller?, id, &order.step_ids)?)
        }
        (Method::PATCH, ["admin", "steps", id]) => {
            ok(&services.catalog.update_step(&caller?, id, parse_body(body)?)?)
        }
        (Method::DELETE, ["admin", "steps", id]) => from_delete_bool_result(
            services.catalog.delete_step(&caller?, id),
            "Step not found",
        ),

        // Admin: reviewers
        (Method::GET, ["admin", "roadmaps", id, "reviewers"]) => {
            ok(&services.catalog.reviewers(&caller?, id)?)
        }
        (Method::POST, ["admin", "roadmaps", id, "reviewers"]) => {
            let reviewer: ReviewerBody = parse_body(body)?;
            created(&services.catalog.assign_reviewer(
                &caller?,
                id,
                &reviewer.teacher_profile_id,
            )?)
        }
        (Method::DELETE, ["admin", "roadmaps", id, "reviewers", teacher_id]) => {
            from_delete_bool_result(
                services.catalog.unassign_reviewer(&caller?, id, teacher_id),
                "Reviewer assignment not found",
            )
        }

        // Admin: dashboards
        (Method::GET, ["admin", "roadmaps", id, "progress"]) => {
            ok(&services.review.roadmap_enrolments(&caller?, id, page)?)
        }
        (Method::GET, ["admin", "submissions", "pending"]) => {
            let caller = caller?;
            caller.require(&[Role::Admin])?;
            ok(&services.review.pending(&caller, page, false)?)
        }
        (Method::GET, ["admin", "statistics"]) => ok(&services.review.statistics(&caller?)?),

        // Student
        (Method::GET, ["student", "roadmaps"]) => ok(&services.progress.available_roadmaps(
            &caller?,
            page,
            params.recommended.unwrap_or(false),
        )?),
        (Method::POST, ["student", "roadmaps", id, "start"]) => {
            created(&services.progress.start_roadmap(&caller?, id)?)
        }
        (Method::GET, ["student", "roadmaps", id, "progress"]) => {
            ok(&services.progress.roadmap_progress(&caller?, id)?)
        }
        (Method::POST, ["student", "steps", id, "start"]) => {
            ok(&services.progress.start_step(&caller?, id)?)
        }
        (Method::POST, ["student", "steps", id, "submit"]) => {
            ok(&services.progress.submit_evidence(&caller?, id, parse_body(body)?)?)
        }
        (Method::GET, ["student", "progress"]) => ok(&services.progress.my_progress(&caller?)?),

        // Teacher
        (Method::GET, ["teacher", "submissions", "pending"]) => {
            let caller = caller?;
            caller.require(&[Role::Teacher])?;
            ok(&services
                .review
                .pending(&caller, page, params.mine.unwrap_or(false))?)
        }
        (Method::POST, ["teacher", "submissions", id, "review"]) => {
            ok(&services.review.review(&caller?, id, parse_body(body)?)?)
        }

        _ => not_found("Not found"),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RoadmapDb;
    use hyper::header::HeaderValue;
    use hyper::StatusCode;

    fn services() -> Services {
        Services::new(Arc::new(RoadmapDb::open_in_memory().unwrap()), false)
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            caller_from_headers(&headers),
            Err(RoadmapError::Unauthorized(_))
        ));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-1"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("Teacher"));
        assert_eq!(caller_from_headers(&headers).unwrap(), Caller::teacher("u-1"));

        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("root"));
        assert!(caller_from_headers(&headers).is_err());
    }

    #[test]
    fn test_health_needs_no_identity() {
        let services = services();
        let resp = route(
            &services,
            Method::GET,
            "/health",
            "",
            Err(RoadmapError::Unauthorized("none".into())),
            &Bytes::new(),
        );
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_status_codes() {
        let services = services();
        let anonymous = || -> Result<Caller, RoadmapError> {
            Err(RoadmapError::Unauthorized("missing X-User-Id header".into()))
        };

        let resp = route(&services, Method::GET, "/admin/statistics", "", anonymous(), &Bytes::new());
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = route(
            &services,
            Method::GET,
            "/admin/statistics",
            "",
            Ok(Caller::student("u-1")),
            &Bytes::new(),
        );
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = route(
            &services,
            Method::POST,
            "/admin/roadmaps",
            "",
            Ok(Caller::admin("a-1")),
            &Bytes::from_static(b"{not json"),
        );
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = route(
            &services,
            Method::GET,
            "/student/roadmaps",
            "page=abc",
            Ok(Caller::student("u-1")),
            &Bytes::new(),
        );
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = route(&services, Method::GET, "/nowhere", "", anonymous(), &Bytes::new());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_admin_pending_requires_admin() {
        let services = services();
        let resp = route(
            &services,
            Method::GET,
            "/admin/submissions/pending",
            "",
            Ok(Caller::teacher("t-1")),
            &Bytes::new(),
        );
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
