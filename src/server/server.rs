use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use tracing::info;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{log_requests, metrics, state::*, RequestsLoggingLevel, ServerConfig};
use crate::review::{Opinion, RankingError, RankingListManager, Review, Tier};
use crate::server::session::Session;
use std::sync::Arc;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct SubmitReviewBody {
    pub opinion: Opinion,
    #[serde(default)]
    pub description: String,
    pub position: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct EditDescriptionBody {
    pub description: String,
}

#[derive(Deserialize, Debug)]
struct ChangeOpinionBody {
    pub opinion: Opinion,
    pub position: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct ReorderBody {
    pub position: i64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SubjectsBody {
    pub subject_ids: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
struct RankedListQuery {
    pub tier: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct UserReviewsQuery {
    /// Comma separated opinions.
    pub opinions: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn ranking_error_response(err: RankingError) -> Response {
    let status = match &err {
        RankingError::Validation(_) => StatusCode::BAD_REQUEST,
        RankingError::NotFound(_) => StatusCode::NOT_FOUND,
        RankingError::Conflict(_) => StatusCode::CONFLICT,
        RankingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match err {
        // Storage details stay in the server log.
        RankingError::Storage(_) => error_response(status, "Storage error"),
        err => error_response(status, err.to_string()),
    }
}

fn review_response(result: Result<Review, RankingError>) -> Response {
    match result {
        Ok(review) => Json(review).into_response(),
        Err(err) => ranking_error_response(err),
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(value)| value)
        .map_err(|rejection| error_response(StatusCode::BAD_REQUEST, rejection.body_text()))
}

/// Negative positions mean "top of the tier".
fn clamp_position(position: i64) -> usize {
    position.max(0) as usize
}

fn parse_tier(raw: Option<&str>) -> Result<Option<Tier>, Response> {
    match raw {
        None => Ok(None),
        Some(raw) => Tier::from_str(raw).map(Some).ok_or_else(|| {
            error_response(StatusCode::BAD_REQUEST, format!("Unknown tier '{}'", raw))
        }),
    }
}

fn parse_opinions(raw: Option<&str>) -> Result<Option<Vec<Opinion>>, Response> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Opinion::from_str(s).ok_or_else(|| {
                error_response(StatusCode::BAD_REQUEST, format!("Unknown opinion '{}'", s))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Resolves a review and makes sure the caller owns it.
fn owned_review(
    manager: &RankingListManager,
    session: &Session,
    review_id: &str,
) -> Result<Review, Response> {
    let review = manager
        .get_review(review_id)
        .map_err(ranking_error_response)?;
    if !session.owns(&review.user_id) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            format!("Review {} belongs to another user", review_id),
        ));
    }
    Ok(review)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

async fn put_subject_review(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(subject_id): Path<String>,
    body: Result<Json<SubmitReviewBody>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    review_response(
        manager
            .submit_review(
                &session.user_id,
                &subject_id,
                body.opinion,
                &body.description,
                body.position.map(clamp_position),
            )
            .await,
    )
}

async fn get_subject_review(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(subject_id): Path<String>,
) -> Response {
    review_response(manager.get_user_review(&session.user_id, &subject_id))
}

async fn delete_subject_review(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(subject_id): Path<String>,
) -> Response {
    review_response(
        manager
            .delete_review_by_subject(&session.user_id, &subject_id)
            .await,
    )
}

async fn get_review(
    _session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(review_id): Path<String>,
) -> Response {
    review_response(manager.get_review(&review_id))
}

async fn delete_review(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(review_id): Path<String>,
) -> Response {
    if let Err(response) = owned_review(&manager, &session, &review_id) {
        return response;
    }
    review_response(manager.delete_review(&review_id).await)
}

async fn put_review_description(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(review_id): Path<String>,
    body: Result<Json<EditDescriptionBody>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    if let Err(response) = owned_review(&manager, &session, &review_id) {
        return response;
    }
    review_response(manager.edit_description(&review_id, &body.description).await)
}

async fn put_review_opinion(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(review_id): Path<String>,
    body: Result<Json<ChangeOpinionBody>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    if let Err(response) = owned_review(&manager, &session, &review_id) {
        return response;
    }
    review_response(
        manager
            .change_opinion(&review_id, body.opinion, body.position.map(clamp_position))
            .await,
    )
}

async fn put_review_rank(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(review_id): Path<String>,
    body: Result<Json<ReorderBody>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    if let Err(response) = owned_review(&manager, &session, &review_id) {
        return response;
    }
    review_response(
        manager
            .reorder_review(&session.user_id, &review_id, clamp_position(body.position))
            .await,
    )
}

async fn ranked_list_response(
    manager: &RankingListManager,
    user_id: &str,
    query: &RankedListQuery,
) -> Response {
    let tier = match parse_tier(query.tier.as_deref()) {
        Ok(tier) => tier,
        Err(response) => return response,
    };
    match manager.get_ranked_list(user_id, tier).await {
        Ok(reviews) => Json(reviews).into_response(),
        Err(err) => ranking_error_response(err),
    }
}

async fn get_own_ranked_list(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Query(query): Query<RankedListQuery>,
) -> Response {
    ranked_list_response(&manager, &session.user_id, &query).await
}

async fn get_user_ranked_list(
    _session: Session,
    State(manager): State<GuardedRankingManager>,
    Path(user_id): Path<String>,
    Query(query): Query<RankedListQuery>,
) -> Response {
    ranked_list_response(&manager, &user_id, &query).await
}

async fn get_own_reviews(
    session: Session,
    State(manager): State<GuardedRankingManager>,
    Query(query): Query<UserReviewsQuery>,
) -> Response {
    let opinions = match parse_opinions(query.opinions.as_deref()) {
        Ok(opinions) => opinions,
        Err(response) => return response,
    };
    match manager.get_user_reviews(&session.user_id, opinions.as_deref()) {
        Ok(reviews) => Json(reviews).into_response(),
        Err(err) => ranking_error_response(err),
    }
}

async fn post_subjects_reviews(
    _session: Session,
    State(manager): State<GuardedRankingManager>,
    body: Result<Json<SubjectsBody>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    match manager.get_reviews_for_subjects(&body.subject_ids) {
        Ok(reviews) => Json::<HashMap<String, Vec<Review>>>(reviews).into_response(),
        Err(err) => ranking_error_response(err),
    }
}

pub fn make_app(config: ServerConfig, ranking_manager: Arc<RankingListManager>) -> Router {
    let state = ServerState::new(config, ranking_manager);

    let review_routes: Router = Router::new()
        .route("/v1/reviews/mine", get(get_own_reviews))
        .route("/v1/reviews/ranked", get(get_own_ranked_list))
        .route("/v1/reviews/subjects", post(post_subjects_reviews))
        .route(
            "/v1/reviews/subject/{subject_id}",
            get(get_subject_review)
                .put(put_subject_review)
                .delete(delete_subject_review),
        )
        .route(
            "/v1/reviews/{review_id}",
            get(get_review).delete(delete_review),
        )
        .route(
            "/v1/reviews/{review_id}/description",
            put(put_review_description),
        )
        .route("/v1/reviews/{review_id}/opinion", put(put_review_opinion))
        .route("/v1/reviews/{review_id}/rank", put(put_review_rank))
        .route("/v1/users/{user_id}/ranked", get(get_user_ranked_list))
        .route_layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
        .merge(review_routes)
}

pub async fn run_server(
    ranking_manager: Arc<RankingListManager>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
    };
    let app = make_app(config, ranking_manager);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}
