use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use scribe_db::Database;
use scribe_types::api::{Claims, MessageListQuery, SendMessageRequest, UnreadCountResponse};
use scribe_types::message::{Draft, Message};

use crate::error::ApiError;
use crate::message as done;
use crate::state::{AppState, blocking};
use crate::uploads::UploadCategory;

const MAX_LIMIT: u32 = 200;

pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(bad) = req
        .attachments
        .iter()
        .find(|a| !state.storage.holds(UploadCategory::Messages.as_str(), &a.stored_path))
    {
        return Err(ApiError::BadRequest(format!(
            "attachment {} was not uploaded as a message attachment",
            bad.filename
        )));
    }

    let sender = claims.sub;
    let msg = blocking(&state, move |db| {
        if db.get_user(req.recipient_id)?.is_none() {
            return Err(ApiError::NotFound("recipient"));
        }
        if let Some(parent_id) = req.parent_id {
            visible(db, parent_id, sender)?;
        }

        let msg = Message::compose(
            sender,
            Draft {
                recipient_id: req.recipient_id,
                subject: req.subject,
                content: req.content,
                attachments: req.attachments,
                priority: req.priority,
                message_type: req.message_type,
                related_job: req.related_job,
                parent_id: req.parent_id,
            },
        )?;
        db.insert_message(&msg)?;
        Ok(msg)
    })
    .await?;

    info!("Message {} sent from {} to {}", msg.id, msg.sender_id, msg.recipient_id);
    Ok((StatusCode::CREATED, Json(msg)))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit);
    let list = blocking(&state, move |db| Ok(db.inbox(claims.sub, limit)?)).await?;
    Ok(Json(list))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = blocking(&state, move |db| Ok(db.unread_count(claims.sub)?)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Both directions between the caller and `other`, newest first.
pub async fn conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other): Path<Uuid>,
    Query(query): Query<MessageListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit);
    let list = blocking(&state, move |db| Ok(db.conversation(claims.sub, other, limit)?)).await?;
    Ok(Json(list))
}

/// Fetch one message. The recipient opening it marks it read.
pub async fn get_one(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = claims.sub;
    let msg = blocking(&state, move |db| {
        let mut msg = visible(db, id, reader)?;
        if msg.recipient_id == reader && msg.mark_as_read() {
            db.update_message(&mut msg)?;
        }
        Ok(msg)
    })
    .await?;
    Ok(Json(msg))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reader = claims.sub;
    let msg = blocking(&state, move |db| {
        let mut msg = visible(db, id, reader)?;
        if msg.recipient_id != reader {
            return Err(ApiError::Forbidden("only the recipient can mark a message read"));
        }
        if msg.mark_as_read() {
            db.update_message(&mut msg)?;
        }
        Ok(msg)
    })
    .await?;
    Ok(Json(msg))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = claims.sub;
    blocking(&state, move |db| {
        let mut msg = visible(db, id, user)?;
        msg.soft_delete();
        db.update_message(&mut msg)?;
        Ok(())
    })
    .await?;
    info!("Message {} deleted by {}", id, user);
    Ok(done("message deleted"))
}

pub async fn replies(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = claims.sub;
    let list = blocking(&state, move |db| {
        visible(db, id, user)?;
        Ok(db.replies(id)?)
    })
    .await?;
    Ok(Json(list))
}

/// A message that exists, is not deleted, and involves `user`.
/// Anything else is reported as not found.
fn visible(db: &Database, id: Uuid, user: Uuid) -> Result<Message, ApiError> {
    db.get_message(id)?
        .filter(|m| !m.is_deleted && m.involves(user))
        .ok_or(ApiError::NotFound("message"))
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_types::api::default_limit;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(default_limit()), 50);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(10_000), MAX_LIMIT);
    }
}
