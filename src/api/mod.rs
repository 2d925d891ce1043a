//! Query API (spec §6, out of core scope but named as the bounding external
//! interface): a thin `axum` router over the Store Façade. No profile/trace
//! web UI rendering — that collaborator is explicitly out of scope.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::CollectorError;
use crate::store::{Condition, Label, LabelFilter, ProfileStore};

type SharedStore = Arc<dyn ProfileStore>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/healthz", get(healthz))
        .route("/api/targets", get(list_targets))
        .route("/api/group_labels", get(list_group_labels))
        .route("/api/sample_types", get(list_sample_types))
        .route("/api/group_sample_types", get(list_group_sample_types))
        .route("/api/profile_meta/{sample_type}", get(list_profile_meta))
        .route("/api/download/{id}", get(download_profile))
        .with_state(store)
}

async fn healthz() -> &'static str {
    "I'm fine"
}

async fn list_targets(State(store): State<SharedStore>) -> Response {
    match store.list_applications().await {
        Ok(apps) => Json(apps).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_group_labels(State(store): State<SharedStore>) -> Response {
    match store.list_labels().await {
        Ok(labels) => {
            let mut grouped: HashMap<String, Vec<Label>> = HashMap::new();
            for label in labels {
                grouped.entry(label.key.clone()).or_default().push(label);
            }
            Json(grouped).into_response()
        }
        Err(err) => internal_error(err),
    }
}

async fn list_sample_types(State(store): State<SharedStore>) -> Response {
    match store.list_sample_types().await {
        Ok(types) => Json(types).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn list_group_sample_types(State(store): State<SharedStore>) -> Response {
    match store.list_sample_types().await {
        Ok(types) => {
            let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
            for sample_type in types {
                let group = sample_type
                    .split('_')
                    .next()
                    .unwrap_or(&sample_type)
                    .to_string();
                grouped.entry(group).or_default().push(sample_type);
            }
            Json(grouped).into_response()
        }
        Err(err) => internal_error(err),
    }
}

async fn list_profile_meta(
    State(store): State<SharedStore>,
    Path(sample_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(start_raw) = params.get("start_time") else {
        return (StatusCode::BAD_REQUEST, "start_time or end_time is empty").into_response();
    };
    let Some(end_raw) = params.get("end_time") else {
        return (StatusCode::BAD_REQUEST, "start_time or end_time is empty").into_response();
    };

    let start = match parse_time(start_raw) {
        Ok(t) => t,
        Err(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
    };
    let end = match parse_time(end_raw) {
        Ok(t) => t,
        Err(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
    };

    let default_condition = params
        .get("condition")
        .map(|c| Condition::parse(c))
        .unwrap_or(Condition::Or);

    let filters: Vec<LabelFilter> = params
        .iter()
        .filter_map(|(key, value)| {
            let label_key = key.strip_prefix("lbs[")?.strip_suffix(']')?;
            Some(LabelFilter {
                key: label_key.to_string(),
                value: value.clone(),
                condition: default_condition,
            })
        })
        .collect();

    match store.list_metas(&sample_type, start, end, &filters).await {
        Ok(metas) => Json(metas).into_response(),
        Err(err) => internal_error(err),
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("the time format must be RFC3339, {e}"))
}

async fn download_profile(State(store): State<SharedStore>, Path(id): Path<String>) -> Response {
    match store.get_payload(&id).await {
        Ok(payload) => {
            let disposition = format!("attachment;filename={}-{}.prof", payload.display_name, id);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                payload.bytes,
            )
                .into_response()
        }
        Err(CollectorError::ProfileNotFound(_)) => {
            (StatusCode::NOT_FOUND, "Profile not found").into_response()
        }
        Err(err) => internal_error(err),
    }
}

fn internal_error(err: CollectorError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::moka_store::MokaStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_store() -> SharedStore {
        Arc::new(MokaStore::new())
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = router(test_store());
        let response = app
            .oneshot(Request::get("/api/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn download_missing_profile_is_404() {
        let app = router(test_store());
        let response = app
            .oneshot(
                Request::get("/api/download/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn profile_meta_requires_time_window() {
        let app = router(test_store());
        let response = app
            .oneshot(
                Request::get("/api/profile_meta/heap")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
