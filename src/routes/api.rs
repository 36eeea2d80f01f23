use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/videos/{id}/view", post(register_view))
        .route("/api/videos/{id}/comment", post(create_comment))
        .route("/api/comments/{id}", delete(delete_comment))
}

/// Count a playback. The increment happens in a single UPDATE so concurrent
/// viewers never lose counts to a read-modify-write race.
pub async fn register_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let changed = conn.execute(
        "UPDATE videos SET views = views + 1 WHERE id = ?1",
        params![id],
    )?;

    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::OK.into_response())
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct CreateCommentResponse {
    pub new_comment_id: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(video_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let body = req.text.trim().to_string();
    if body.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }

    let comment_id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;

    // Verify the video exists before attaching anything to it
    let _: String = conn
        .query_row(
            "SELECT id FROM videos WHERE id = ?1",
            params![video_id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    conn.execute(
        "INSERT INTO comments (id, video_id, user_id, body) VALUES (?1, ?2, ?3, ?4)",
        params![comment_id, video_id, user.id, body],
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCommentResponse {
            new_comment_id: comment_id,
        }),
    )
        .into_response())
}

pub async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let owner_id: String = conn
        .query_row(
            "SELECT user_id FROM comments WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if owner_id != user.id {
        return Err(AppError::Forbidden);
    }

    conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(StatusCode::OK.into_response())
}

#[cfg(test)]
mod tests {
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;
    use rusqlite::params;

    fn seeded_pool() -> crate::state::DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        crate::db::run_migrations(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, name) VALUES ('u1', 'alice', 'a@b.c', 'Alice')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO videos (id, owner_id, title, file_path, thumb_path)
             VALUES ('v1', 'u1', 'First', 'f.mp4', 't.jpg')",
            [],
        )
        .unwrap();
        pool
    }

    #[test]
    fn view_increment_is_a_single_update() {
        let pool = seeded_pool();
        let conn = pool.get().unwrap();

        for _ in 0..3 {
            let changed = conn
                .execute("UPDATE videos SET views = views + 1 WHERE id = 'v1'", [])
                .unwrap();
            assert_eq!(changed, 1);
        }

        let views: i64 = conn
            .query_row("SELECT views FROM videos WHERE id = 'v1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(views, 3);
    }

    #[test]
    fn view_increment_on_missing_video_touches_nothing() {
        let pool = seeded_pool();
        let conn = pool.get().unwrap();
        let changed = conn
            .execute(
                "UPDATE videos SET views = views + 1 WHERE id = ?1",
                params!["missing"],
            )
            .unwrap();
        assert_eq!(changed, 0);
    }
}
