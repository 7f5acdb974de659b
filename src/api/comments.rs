//! Comment API endpoints
//!
//! Threads on categories and items, posting, deletion and the live
//! change feed (server-sent events).

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get},
};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Attachment, Comment, Profile};
use crate::error::AppError;
use crate::events::COMMENT_CREATED;
use crate::metrics::FEED_SUBSCRIBERS;
use crate::service::CommentNode;

/// Create comment router
///
/// Routes:
/// - GET/POST /categories/:id/comments
/// - GET/POST /items/:id/comments
/// - DELETE /comments/:id
/// - GET /comments/stream
pub fn comments_router() -> Router<AppState> {
    Router::new()
        .route(
            "/categories/:id/comments",
            get(category_thread).post(post_category_comment),
        )
        .route(
            "/items/:id/comments",
            get(item_thread).post(post_item_comment),
        )
        .route("/comments/stream", get(comment_stream))
        .route("/comments/:id", delete(delete_comment))
}

/// Body for posting a comment or reply
#[derive(Debug, Deserialize)]
pub struct PostCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Scope for GET /api/comments/stream
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub category_id: Option<String>,
    pub item_id: Option<String>,
}

impl StreamQuery {
    fn scope(self) -> Result<Option<Attachment>, AppError> {
        match (self.category_id, self.item_id) {
            (None, None) => Ok(None),
            (category_id, item_id) => Attachment::from_columns(category_id, item_id).map(Some),
        }
    }
}

async fn thread(state: &AppState, attachment: Attachment) -> Result<Json<Vec<CommentNode>>, AppError> {
    Ok(Json(state.comment_service().thread(&attachment).await?))
}

async fn post(
    state: &AppState,
    attachment: Attachment,
    author: &Profile,
    request: PostCommentRequest,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state
        .comment_service()
        .post(
            attachment,
            author,
            &request.content,
            request.parent_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/categories/:id/comments
async fn category_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommentNode>>, AppError> {
    thread(&state, Attachment::Category(id)).await
}

/// POST /api/categories/:id/comments
async fn post_category_comment(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<PostCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    post(&state, Attachment::Category(id), &profile, request).await
}

/// GET /api/items/:id/comments
async fn item_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommentNode>>, AppError> {
    thread(&state, Attachment::Item(id)).await
}

/// POST /api/items/:id/comments
async fn post_item_comment(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<PostCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    post(&state, Attachment::Item(id), &profile, request).await
}

/// DELETE /api/comments/:id
///
/// Author or admin only; replies are removed with the comment.
async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.comment_service().delete(&id, &profile).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Keeps the subscriber gauge in step with open streams.
struct FeedSubscription;

impl FeedSubscription {
    fn open() -> Self {
        FEED_SUBSCRIBERS.with_label_values(&["comments"]).inc();
        Self
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        FEED_SUBSCRIBERS.with_label_values(&["comments"]).dec();
    }
}

/// GET /api/comments/stream
///
/// Streams `comment.created` events, optionally for one category or item.
/// Subscribers that fall behind skip the events they missed.
async fn comment_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let scope = query.scope()?;
    let receiver = state.comment_service().subscribe();
    let subscription = FeedSubscription::open();

    let stream = BroadcastStream::new(receiver).filter_map(move |message| {
        let _open = &subscription;
        match message {
            Ok(event) if scope.as_ref().is_none_or(|scope| *scope == event.attachment) => {
                Event::default()
                    .event(COMMENT_CREATED)
                    .id(event.comment.id.clone())
                    .json_data(&event)
                    .map_err(|error| {
                        tracing::warn!(%error, "failed to encode comment event");
                    })
                    .ok()
                    .map(Ok::<Event, Infallible>)
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "comment feed subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
