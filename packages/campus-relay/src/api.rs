//! Messaging REST API handlers.
//!
//! History retrieval, unread accounting, read marking and chat group
//! membership. Every response uses the `{ok, data?, error?}` envelope.

use std::collections::BTreeSet;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use campus_core::{
    time, ChatGroup, DirectMessage, Error, GroupId, GroupMessage, MessageId, UnreadSummary, UserId,
};

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::RelayState;

// ── Request / Response Types ─────────────────────────────────────────────────

/// `?limit=` on history endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /api/groups
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub creator_id: UserId,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
}

/// POST /api/groups/:group_id/members and POST /api/groups/:group_id/read
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub user_id: UserId,
}

/// POST /api/messages/:message_id/read
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub message_id: MessageId,
    /// False if the message had already been read.
    pub updated: bool,
}

/// POST /api/groups/:group_id/read
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkGroupReadResponse {
    pub group_id: GroupId,
    pub marked: usize,
}

/// Generic response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

impl<T: Serialize> ApiResponse<T> {
    fn success(status: StatusCode, data: T) -> ApiReply<T> {
        (
            status,
            Json(Self {
                ok: true,
                data: Some(data),
                error: None,
            }),
        )
    }
}

pub(crate) fn error_response<T: Serialize>(status: StatusCode, msg: &str) -> ApiReply<T> {
    (
        status,
        Json(ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for a domain error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::MalformedFrame(_)
        | Error::MissingField(_)
        | Error::EmptyContent
        | Error::ContentTooLong { .. }
        | Error::InvalidRequest(_)
        | Error::CannotRemoveCreator(_) => StatusCode::BAD_REQUEST,
        Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
        Error::AlreadyAuthenticated => StatusCode::CONFLICT,
        Error::NotGroupMember { .. } => StatusCode::FORBIDDEN,
        Error::GroupNotFound(_) | Error::MessageNotFound(_) => StatusCode::NOT_FOUND,
        Error::DatabaseError(_) | Error::StorageCorrupted(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reply<T: Serialize>(status: StatusCode, result: campus_core::Result<T>) -> ApiReply<T> {
    match result {
        Ok(data) => ApiResponse::success(status, data),
        Err(err) if err.is_internal() => {
            tracing::error!(code = err.code(), error = %err, "[Api] Request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        Err(err) => error_response(status_for(&err), &err.to_string()),
    }
}

// ── Direct Messages ──────────────────────────────────────────────────────────

/// GET /api/users/:user_id/messages/:peer_id: Conversation history.
///
/// Returns the most recent messages between the two users, oldest first.
/// The peer's messages on the returned page are marked read; older unread
/// ones stay unread. The rows are returned as they were before marking.
pub async fn get_conversation(
    State(state): State<RelayState>,
    ApiPath((user_id, peer_id)): ApiPath<(UserId, UserId)>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiReply<Vec<DirectMessage>> {
    let limit = state.config.page_limit(query.limit);

    let result = state
        .with_store(move |store| store.read_conversation(user_id, peer_id, Some(limit)))
        .await;

    reply(StatusCode::OK, result)
}

/// POST /api/messages/:message_id/read: Mark one direct message read.
pub async fn mark_message_read(
    State(state): State<RelayState>,
    ApiPath(message_id): ApiPath<MessageId>,
) -> ApiReply<MarkReadResponse> {
    let result = state
        .with_store(move |store| store.mark_message_as_read(message_id))
        .await
        .map(|updated| MarkReadResponse {
            message_id,
            updated,
        });

    reply(StatusCode::OK, result)
}

/// GET /api/users/:user_id/unread: Unread counters.
pub async fn get_unread(
    State(state): State<RelayState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiReply<UnreadSummary> {
    let result = state
        .with_store(move |store| store.unread_summary(user_id))
        .await;

    reply(StatusCode::OK, result)
}

// ── Groups ───────────────────────────────────────────────────────────────────

/// GET /api/users/:user_id/groups: Groups the user belongs to.
pub async fn get_user_groups(
    State(state): State<RelayState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiReply<Vec<ChatGroup>> {
    let result = state
        .with_store(move |store| store.groups_for_user(user_id))
        .await;

    reply(StatusCode::OK, result)
}

/// POST /api/groups: Create a chat group.
///
/// The creator is always a member, whether or not they are listed.
pub async fn create_group(
    State(state): State<RelayState>,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> ApiReply<ChatGroup> {
    let result = state
        .with_store(move |store| {
            store.create_chat_group(&req.name, req.creator_id, &req.members, time::now())
        })
        .await;

    reply(StatusCode::CREATED, result)
}

/// GET /api/groups/:group_id: Fetch one group.
pub async fn get_group(
    State(state): State<RelayState>,
    ApiPath(group_id): ApiPath<GroupId>,
) -> ApiReply<ChatGroup> {
    let result = state
        .with_store(move |store| {
            store
                .get_chat_group(group_id)?
                .ok_or(Error::GroupNotFound(group_id))
        })
        .await;

    reply(StatusCode::OK, result)
}

/// POST /api/groups/:group_id/members: Add a member.
pub async fn add_member(
    State(state): State<RelayState>,
    ApiPath(group_id): ApiPath<GroupId>,
    ApiJson(req): ApiJson<UserRequest>,
) -> ApiReply<ChatGroup> {
    let result = state
        .with_store(move |store| store.add_group_member(group_id, req.user_id, time::now()))
        .await;

    reply(StatusCode::OK, result)
}

/// DELETE /api/groups/:group_id/members/:user_id: Remove a member.
///
/// The creator cannot be removed. Messages already delivered stay where
/// they are; later posts no longer reach the removed user.
pub async fn remove_member(
    State(state): State<RelayState>,
    ApiPath((group_id, user_id)): ApiPath<(GroupId, UserId)>,
) -> ApiReply<ChatGroup> {
    let result = state
        .with_store(move |store| store.remove_group_member(group_id, user_id))
        .await;

    reply(StatusCode::OK, result)
}

/// GET /api/groups/:group_id/messages: Group history, oldest first.
pub async fn get_group_messages(
    State(state): State<RelayState>,
    ApiPath(group_id): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiReply<Vec<GroupMessage>> {
    let limit = state.config.page_limit(query.limit);

    let result = state
        .with_store(move |store| store.get_messages_by_chat_group(group_id, Some(limit)))
        .await;

    reply(StatusCode::OK, result)
}

/// POST /api/groups/:group_id/read: Mark every message in the group read
/// by `userId`.
pub async fn mark_group_read(
    State(state): State<RelayState>,
    ApiPath(group_id): ApiPath<GroupId>,
    ApiJson(req): ApiJson<UserRequest>,
) -> ApiReply<MarkGroupReadResponse> {
    let result = state
        .with_store(move |store| store.mark_group_read(group_id, req.user_id, time::now()))
        .await
        .map(|marked| MarkGroupReadResponse { group_id, marked });

    reply(StatusCode::OK, result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::Router;
    use campus_core::{Database, MessageStore};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::state::RelayConfig;

    fn test_state() -> RelayState {
        let db = Database::open(None).unwrap();
        RelayState::new(RelayConfig::default(), Arc::new(db))
    }

    fn app(state: &RelayState) -> Router {
        crate::router(state.clone())
    }

    async fn call(
        state: &RelayState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seed_messages(state: &RelayState) {
        let at = time::now();
        state.store.insert_direct_message(1, 2, "hi", at).unwrap();
        state.store.insert_direct_message(2, 1, "hey", at).unwrap();
        state.store.insert_direct_message(2, 1, "lunch?", at).unwrap();
    }

    #[tokio::test]
    async fn test_history_returns_rows_then_marks_read() {
        let state = test_state();
        seed_messages(&state);

        let (status, body) = call(&state, Method::GET, "/api/users/1/messages/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["content"], "hi");
        // Rows come back as they were before the fetch
        assert_eq!(rows[1]["read"], false);

        let history = state.store.get_messages_between_users(1, 2, None).unwrap();
        let read: Vec<bool> = history.iter().map(|m| m.read).collect();
        assert_eq!(read, vec![false, true, true]);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let state = test_state();
        seed_messages(&state);

        let (status, body) =
            call(&state, Method::GET, "/api/users/2/messages/1?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["content"], "lunch?");
    }

    #[tokio::test]
    async fn test_paged_history_marks_only_returned_messages() {
        let state = test_state();
        let base = time::now();
        for i in 0..3 {
            let at = base + chrono::Duration::seconds(i);
            state
                .store
                .insert_direct_message(2, 1, &format!("m{}", i), at)
                .unwrap();
        }

        let (status, body) =
            call(&state, Method::GET, "/api/users/1/messages/2?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["content"], "m2");

        let read: Vec<bool> = state
            .store
            .get_messages_between_users(1, 2, None)
            .unwrap()
            .iter()
            .map(|m| m.read)
            .collect();
        assert_eq!(read, vec![false, false, true]);

        let (_, body) = call(&state, Method::GET, "/api/users/1/unread", None).await;
        assert_eq!(body["data"]["total"], 2);
    }

    #[tokio::test]
    async fn test_unread_counts_follow_history_fetch() {
        let state = test_state();
        seed_messages(&state);

        let (_, body) = call(&state, Method::GET, "/api/users/1/unread", None).await;
        assert_eq!(body["data"]["direct"]["2"], 2);
        assert_eq!(body["data"]["total"], 2);

        call(&state, Method::GET, "/api/users/1/messages/2", None).await;

        let (_, body) = call(&state, Method::GET, "/api/users/1/unread", None).await;
        assert_eq!(body["data"]["total"], 0);
        assert_eq!(body["data"]["direct"], json!({}));
    }

    #[tokio::test]
    async fn test_mark_message_read() {
        let state = test_state();
        let msg = state
            .store
            .insert_direct_message(1, 2, "hi", time::now())
            .unwrap();

        let uri = format!("/api/messages/{}/read", msg.id);
        let (status, body) = call(&state, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["updated"], true);

        let (_, body) = call(&state, Method::POST, &uri, None).await;
        assert_eq!(body["data"]["updated"], false);

        let (status, body) = call(&state, Method::POST, "/api/messages/999/read", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Message 999 not found");
    }

    #[tokio::test]
    async fn test_group_lifecycle() {
        let state = test_state();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/groups",
            Some(json!({"name": "Capstone", "creatorId": 1, "members": [2, 3]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["members"], json!([1, 2, 3]));
        let group_id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = call(
            &state,
            Method::POST,
            &format!("/api/groups/{}/members", group_id),
            Some(json!({"userId": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["members"], json!([1, 2, 3, 4]));

        let (status, body) = call(
            &state,
            Method::DELETE,
            &format!("/api/groups/{}/members/2", group_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["members"], json!([1, 3, 4]));

        let (status, _) = call(&state, Method::GET, "/api/users/3/groups", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, Method::GET, "/api/users/2/groups", None).await;
        assert_eq!(body["data"], json!([]));

        let (status, body) =
            call(&state, Method::GET, &format!("/api/groups/{}", group_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Capstone");
    }

    #[tokio::test]
    async fn test_creator_removal_rejected() {
        let state = test_state();
        let group = state
            .store
            .create_chat_group("g", 1, &BTreeSet::from([2]), time::now())
            .unwrap();

        let (status, body) = call(
            &state,
            Method::DELETE,
            &format!("/api/groups/{}/members/1", group.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_create_group_requires_name() {
        let state = test_state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/groups",
            Some(json!({"name": "  ", "creatorId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Invalid request: group name must not be empty");
        assert_eq!(state.store.stats().unwrap().chat_groups, 0);
    }

    #[tokio::test]
    async fn test_malformed_body_uses_envelope() {
        let state = test_state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/groups",
            Some(json!({"name": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("creatorId"));
    }

    #[tokio::test]
    async fn test_non_numeric_path_uses_envelope() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/api/users/abc/unread", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_bad_limit_uses_envelope() {
        let state = test_state();
        let (status, body) =
            call(&state, Method::GET, "/api/users/1/messages/2?limit=lots", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_missing_group_is_404() {
        let state = test_state();
        let (status, _) = call(&state, Method::GET, "/api/groups/77", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, Method::GET, "/api/groups/77/messages", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_group_messages_and_read() {
        let state = test_state();
        let group = state
            .store
            .create_chat_group("g", 1, &BTreeSet::from([2]), time::now())
            .unwrap();
        state
            .store
            .post_group_message(group.id, 1, "agenda attached", time::now())
            .unwrap();

        let (status, body) = call(
            &state,
            Method::POST,
            &format!("/api/groups/{}/read", group.id),
            Some(json!({"userId": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["marked"], 1);

        let (_, body) = call(
            &state,
            Method::GET,
            &format!("/api/groups/{}/messages", group.id),
            None,
        )
        .await;
        assert_eq!(body["data"][0]["readBy"], json!([1, 2]));

        let (status, _) = call(
            &state,
            Method::POST,
            &format!("/api/groups/{}/read", group.id),
            Some(json!({"userId": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::EmptyContent), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::GroupNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::NotGroupMember {
                group_id: 1,
                user_id: 2
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&Error::DatabaseError("locked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
