#![allow(dead_code)]

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use super::fixtures;

/// How one catalog resource answers.
#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Status(StatusCode),
    Raw(&'static str),
}

fn route(router: Router, path: &str, reply: Reply) -> Router {
    router.route(
        path,
        get(move || {
            let reply = reply.clone();
            async move {
                match reply {
                    Reply::Json(value) => (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "application/json")],
                        value.to_string(),
                    ),
                    Reply::Raw(body) => (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "application/json")],
                        body.to_string(),
                    ),
                    Reply::Status(status) => (
                        status,
                        [(header::CONTENT_TYPE, "text/plain")],
                        String::from("unavailable"),
                    ),
                }
            }
        }),
    )
}

/// Catalog served from the fixtures, with per-resource overrides such as
/// `("feeds.json", Reply::Status(StatusCode::INTERNAL_SERVER_ERROR))`.
pub fn catalog_router(overrides: Vec<(&'static str, Reply)>) -> Router {
    let mut resources = vec![
        ("channels.json", Reply::Json(fixtures::channels_json())),
        ("streams.json", Reply::Json(fixtures::streams_json())),
        ("feeds.json", Reply::Json(fixtures::feeds_json())),
        ("categories.json", Reply::Json(fixtures::categories_json())),
        ("countries.json", Reply::Json(fixtures::countries_json())),
        ("languages.json", Reply::Json(fixtures::languages_json())),
        ("regions.json", Reply::Json(fixtures::regions_json())),
    ];
    for (name, reply) in overrides {
        if let Some(slot) = resources.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = reply;
        }
    }

    resources
        .into_iter()
        .fold(Router::new(), |router, (name, reply)| {
            route(router, &format!("/api/{name}"), reply)
        })
}

/// Serve `router` on an ephemeral port; returns the catalog base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}/api")
}
