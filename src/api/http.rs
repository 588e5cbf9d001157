use crate::api::render::{parse_body, render, ApiError, Format, PeopleXml, RelationshipsXml};
use crate::config::HttpServerConfig;
use crate::error::{FamilyTreeError, Result};
use crate::service::FamilyService;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type HandlerResult = std::result::Result<Response, ApiError>;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(host: &str, port: u16) -> bool {
    tokio::net::TcpListener::bind((host, port)).await.is_ok()
}

/// REST server over a [`FamilyService`]
pub struct HttpServer {
    service: Arc<FamilyService>,
    config: HttpServerConfig,
}

impl HttpServer {
    pub fn new(service: FamilyService, config: HttpServerConfig) -> Self {
        Self {
            service: Arc::new(service),
            config,
        }
    }

    /// Bind and serve until the process is stopped
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        if !check_port_available(&self.config.host, self.config.port).await {
            return Err(FamilyTreeError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                self.config.port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            FamilyTreeError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting family tree API on http://{}", addr);
        axum::serve(listener, router(Arc::clone(&self.service), &self.config.allowed_origins))
            .await
            .map_err(|e| {
                FamilyTreeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;

        Ok(())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    service: Arc<FamilyService>,
}

/// Build the axum router.
///
/// An empty `allowed_origins` allows any origin.
pub fn router(service: Arc<FamilyService>, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/familytree/person", get(handle_list_people).post(handle_create_person))
        .route(
            "/familytree/person/:id",
            get(handle_family_tree)
                .put(handle_rename_person)
                .delete(handle_delete_person),
        )
        .route("/familytree/person/:id/tree", get(handle_nested_tree))
        .route("/familytree/people", post(handle_create_people))
        .route("/familytree/relationship", post(handle_add_relationship))
        .route(
            "/familytree/relationship/:id",
            put(handle_relink_relationship).delete(handle_delete_relationship),
        )
        .route(
            "/familytree/relationships",
            get(handle_list_relationships).post(handle_add_relationships),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(AppState { service })
}

#[derive(Debug, Deserialize)]
struct PersonBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RelationshipBody {
    parent: String,
    child: String,
}

/// Token cancelled when the returned guard drops, i.e. when the handler
/// finishes or the client goes away mid-request.
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "familytree",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_list_people(State(state): State<AppState>, headers: HeaderMap) -> HandlerResult {
    let people = state.service.list_people().await?;
    match Format::from_headers(&headers) {
        Format::Xml => render(Format::Xml, StatusCode::OK, "people", &PeopleXml { person: &people }),
        Format::Json => render(Format::Json, StatusCode::OK, "people", &people),
    }
}

async fn handle_create_person(State(state): State<AppState>, body: Bytes) -> HandlerResult {
    let PersonBody { name } = parse_body(&body)?;
    let person = state.service.create_person(name).await?;
    Ok((StatusCode::CREATED, person.id).into_response())
}

async fn handle_create_people(State(state): State<AppState>, body: Bytes) -> HandlerResult {
    let people: Vec<PersonBody> = parse_body(&body)?;
    let created = state
        .service
        .create_people(people.into_iter().map(|p| p.name).collect())
        .await?;
    let ids: Vec<String> = created.into_iter().map(|p| p.id).collect();
    Ok((StatusCode::CREATED, Json(ids)).into_response())
}

async fn handle_family_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let (token, _cancel_on_drop) = request_token();
    let tree = state.service.build_ancestry(id, token).await?;
    render(
        Format::from_headers(&headers),
        StatusCode::OK,
        "familyTree",
        &tree.to_family_tree(),
    )
}

async fn handle_nested_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let (token, _cancel_on_drop) = request_token();
    let tree = state.service.build_ancestry(id, token).await?;
    render(Format::from_headers(&headers), StatusCode::OK, "person", &tree.to_nested())
}

async fn handle_rename_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let PersonBody { name } = parse_body(&body)?;
    state.service.rename_person(id, name).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn handle_delete_person(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    state.service.delete_person(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn handle_list_relationships(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult {
    let edges = state.service.list_relationships().await?;
    match Format::from_headers(&headers) {
        Format::Xml => render(
            Format::Xml,
            StatusCode::OK,
            "relationships",
            &RelationshipsXml { relationship: &edges },
        ),
        Format::Json => render(Format::Json, StatusCode::OK, "relationships", &edges),
    }
}

async fn handle_add_relationship(State(state): State<AppState>, body: Bytes) -> HandlerResult {
    let RelationshipBody { parent, child } = parse_body(&body)?;
    let (token, _cancel_on_drop) = request_token();
    let id = state.service.add_relationship(parent, child, token).await?;
    Ok((StatusCode::CREATED, id).into_response())
}

async fn handle_add_relationships(State(state): State<AppState>, body: Bytes) -> HandlerResult {
    let edges: Vec<RelationshipBody> = parse_body(&body)?;
    let pairs = edges.into_iter().map(|e| (e.parent, e.child)).collect();
    let (token, _cancel_on_drop) = request_token();
    let ids = state.service.add_relationships(pairs, token).await?;
    Ok((StatusCode::CREATED, Json(ids)).into_response())
}

async fn handle_relink_relationship(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let RelationshipBody { parent, child } = parse_body(&body)?;
    let (token, _cancel_on_drop) = request_token();
    let new_id = state
        .service
        .relink_relationship(id, parent, child, token)
        .await?;
    Ok((StatusCode::OK, new_id).into_response())
}

async fn handle_delete_relationship(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    state.service.delete_relationship(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_support::migrated_db;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app() -> (Router, TempDir) {
        let (db, temp) = migrated_db().await;
        let service = FamilyService::new(db, EngineConfig::default());
        (router(Arc::new(service), &[]), temp)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn create(app: &Router, name: &str) -> String {
        let (status, id) = send(app, "POST", "/familytree/person", Some(&format!(r#"{{"name":"{}"}}"#, name))).await;
        assert_eq!(status, StatusCode::CREATED);
        id
    }

    async fn link(app: &Router, parent: &str, child: &str) -> (StatusCode, String) {
        let body = format!(r#"{{"parent":"{}","child":"{}"}}"#, parent, child);
        send(app, "POST", "/familytree/relationship", Some(&body)).await
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _temp) = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"ok\""));
    }

    #[tokio::test]
    async fn test_family_tree_view() {
        let (app, _temp) = app().await;
        let p1 = create(&app, "P1").await;
        let c1 = create(&app, "C1").await;
        assert_eq!(link(&app, &p1, &c1).await.0, StatusCode::CREATED);

        let (status, body) = send(&app, "GET", &format!("/familytree/person/{}", c1), None).await;
        assert_eq!(status, StatusCode::OK);
        let tree: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tree["members"][0]["name"], "C1");
        assert_eq!(tree["members"][0]["relationships"][0]["name"], "P1");
        assert_eq!(tree["members"][0]["relationships"][0]["relationship"], "parent");

        let (status, body) = send(&app, "GET", &format!("/familytree/person/{}/tree", c1), None).await;
        assert_eq!(status, StatusCode::OK);
        let nested: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(nested["parents"][0]["id"], p1.as_str());
    }

    #[tokio::test]
    async fn test_sibling_edge_is_422() {
        let (app, _temp) = app().await;
        let p1 = create(&app, "P1").await;
        let c1 = create(&app, "C1").await;
        let c2 = create(&app, "C2").await;
        link(&app, &p1, &c1).await;
        link(&app, &p1, &c2).await;

        let (status, body) = link(&app, &c1, &c2).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"], "incestuous_offspring");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _temp) = app().await;
        let x = create(&app, "X").await;

        assert_eq!(link(&app, &x, &x).await.0, StatusCode::BAD_REQUEST);
        assert_eq!(link(&app, &x, "ghost").await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            send(&app, "GET", "/familytree/person/ghost", None).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(&app, "DELETE", "/familytree/relationship/ghost", None).await.0,
            StatusCode::NOT_FOUND
        );

        let (status, body) = send(&app, "POST", "/familytree/person", Some("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid_input"));
    }

    #[tokio::test]
    async fn test_batch_and_relink() {
        let (app, _temp) = app().await;
        let (status, body) = send(
            &app,
            "POST",
            "/familytree/people",
            Some(r#"[{"name":"P"},{"name":"Q"},{"name":"C"}]"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let ids: Vec<String> = serde_json::from_str(&body).unwrap();
        let (p, q, c) = (&ids[0], &ids[1], &ids[2]);

        let batch = format!(r#"[{{"parent":"{}","child":"{}"}}]"#, p, c);
        let (status, body) = send(&app, "POST", "/familytree/relationships", Some(&batch)).await;
        assert_eq!(status, StatusCode::CREATED);
        let edge_ids: Vec<String> = serde_json::from_str(&body).unwrap();

        let relink = format!(r#"{{"parent":"{}","child":"{}"}}"#, q, c);
        let (status, new_id) = send(
            &app,
            "PUT",
            &format!("/familytree/relationship/{}", edge_ids[0]),
            Some(&relink),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(new_id, edge_ids[0]);

        let (_, body) = send(&app, "GET", "/familytree/relationships", None).await;
        let edges: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(edges.as_array().unwrap().len(), 1);
        assert_eq!(edges[0]["parent"], q.as_str());
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let (app, _temp) = app().await;
        let x = create(&app, "X").await;
        let uri = format!("/familytree/person/{}", x);

        assert_eq!(send(&app, "PUT", &uri, Some(r#"{"name":"Xavier"}"#)).await.0, StatusCode::NO_CONTENT);
        let (_, body) = send(&app, "GET", "/familytree/person", None).await;
        assert!(body.contains("Xavier"));

        assert_eq!(send(&app, "DELETE", &uri, None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &uri, None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_xml_listing() {
        let (app, _temp) = app().await;
        create(&app, "Ann").await;

        let request = Request::builder()
            .uri("/familytree/person")
            .header(header::ACCEPT, "application/xml")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.starts_with("<people>"));
        assert!(body.contains("<name>Ann</name>"));
    }
}
