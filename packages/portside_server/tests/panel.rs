//! End-to-end exercises of the panel router without a network listener.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use portside_protocol::{Envelope, kind};
use portside_server::state::NoopLauncher;
use portside_server::store::HistoryStore;
use portside_server::{AppState, build_router};

fn panel_app() -> (Router, AppState) {
    let store = HistoryStore::ephemeral();
    store.append("-project=alpha -local_port=5432").unwrap();
    store.append("-project=beta -proxy_type=pod").unwrap();
    let state = AppState::new(store, Box::new(NoopLauncher));
    (build_router(state.clone()), state)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn index_serves_the_panel_page() {
    let (app, _) = panel_app();
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains(r#"id="history-commands-list""#));
    assert!(page.contains(r#"id="history-search""#));
    assert!(page.contains(r#"id="heart""#));
    assert!(page.contains("-project=alpha -local_port=5432"));
}

#[tokio::test]
async fn list_fragment_is_filtered_by_query() {
    let (app, _) = panel_app();
    let response = app
        .oneshot(
            Request::get("/history-commands-list?query=beta")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fragment = body_text(response).await;
    assert!(fragment.contains("-project=beta -proxy_type=pod"));
    assert!(!fragment.contains("-project=alpha"));
}

#[tokio::test]
async fn connect_marks_active_and_broadcasts() {
    let (app, state) = panel_app();
    let mut rx = state.hub.subscribe();

    let response = app
        .oneshot(
            Request::post("/connect-history-item")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"raw":"-project=alpha -local_port=5432","query":"alpha"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fragment = body_text(response).await;
    assert!(fragment.contains(r#"data-action="history-item-raw/{id}/disconnect""#));
    assert!(state.panel.is_active("-project=alpha -local_port=5432"));

    let frame = rx.recv().await.unwrap();
    let envelope = Envelope::from_json(&frame).unwrap();
    assert_eq!(envelope.kind, kind::CONNECTIONS_CHANGED);
}

#[tokio::test]
async fn disconnect_restores_the_connect_control() {
    let (app, state) = panel_app();
    state.panel.connect("-project=beta -proxy_type=pod");

    let response = app
        .oneshot(
            Request::post("/disconnect-history-item")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"raw":"-project=beta -proxy_type=pod","query":null}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fragment = body_text(response).await;
    assert!(fragment.contains(r#"data-action="history-item-raw/{id}/connect""#));
    assert!(!state.panel.is_active("-project=beta -proxy_type=pod"));
}

#[tokio::test]
async fn malformed_action_body_is_rejected() {
    let (app, _) = panel_app();
    let response = app
        .oneshot(
            Request::post("/connect-history-item")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"query":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
