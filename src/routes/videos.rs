use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::params;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::routes::home::{not_found_page, parse_and_format_time, Html};
use crate::state::AppState;

// --- View structs ---

pub struct WatchVideo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub file_path: String,
    pub hashtags: String,
    pub views: i64,
    pub created_at: String,
    pub author: String,
    pub owner_id: String,
}

pub struct CommentView {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
    pub can_delete: bool,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/watch.html")]
pub struct WatchTemplate {
    pub video: WatchVideo,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/upload.html")]
pub struct UploadTemplate {
    pub error_message: Option<String>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/edit_video.html")]
pub struct EditVideoTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub hashtags: String,
    pub error_message: Option<String>,
    pub username: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos/upload", get(upload_page).post(upload_submit))
        .route("/videos/{id}", get(watch))
        .route("/videos/{id}/edit", get(edit_page).post(edit_submit))
        .route("/videos/{id}/delete", get(delete_video))
        .route("/uploads/{*path}", get(serve_upload))
}

// --- Handlers ---

pub async fn watch(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let viewer_id = user.as_ref().map(|u| u.id.clone());
    let username = user.map(|u| u.username);

    let conn = state.db.get()?;
    let video = match query_watch_video(&conn, &id)? {
        Some(v) => v,
        None => return Ok(not_found_page(username)),
    };

    let comments = query_comments(&conn, &id, viewer_id.as_deref())?;
    let can_edit = viewer_id.as_deref() == Some(video.owner_id.as_str());

    Ok(Html(WatchTemplate {
        video,
        comments,
        can_edit,
        username,
    })
    .into_response())
}

pub async fn upload_page(user: CurrentUser) -> Html<UploadTemplate> {
    Html(UploadTemplate {
        error_message: None,
        username: Some(user.username),
    })
}

pub async fn upload_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut title = String::new();
    let mut description = String::new();
    let mut hashtags = String::new();
    let mut video_file: Option<(String, Vec<u8>)> = None;
    let mut thumb_file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = read_text(field).await?,
            "description" => description = read_text(field).await?,
            "hashtags" => hashtags = read_text(field).await?,
            "video" => video_file = read_file(field).await?,
            "thumb" => thumb_file = read_file(field).await?,
            _ => {}
        }
    }

    let title = title.trim().to_string();
    if title.is_empty() {
        return Ok(upload_form_error(
            "Title is required.".to_string(),
            user.username,
        ));
    }
    let (video_name, video_bytes) = match video_file {
        Some(file) => file,
        None => {
            return Ok(upload_form_error(
                "A video file is required.".to_string(),
                user.username,
            ))
        }
    };
    let (thumb_name, thumb_bytes) = match thumb_file {
        Some(file) => file,
        None => {
            return Ok(upload_form_error(
                "A thumbnail image is required.".to_string(),
                user.username,
            ))
        }
    };

    let file_path = stored_name(&video_name);
    let thumb_path = stored_name(&thumb_name);

    let uploads_dir = state.config.uploads_path().clone();
    if let Err(e) = store_upload(&uploads_dir, &file_path, &video_bytes).await {
        tracing::error!("Failed to store video file: {}", e);
        return Ok(upload_form_error(
            "Could not store the uploaded video.".to_string(),
            user.username,
        ));
    }
    if let Err(e) = store_upload(&uploads_dir, &thumb_path, &thumb_bytes).await {
        tracing::error!("Failed to store thumbnail: {}", e);
        return Ok(upload_form_error(
            "Could not store the uploaded thumbnail.".to_string(),
            user.username,
        ));
    }

    let video_id = uuid::Uuid::now_v7().to_string();
    let tags = format_hashtags(&hashtags).join(" ");
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO videos (id, owner_id, title, description, file_path, thumb_path, hashtags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                video_id,
                user.id,
                title,
                description.trim(),
                file_path,
                thumb_path,
                tags
            ],
        )?;
    }

    Ok(Redirect::to("/").into_response())
}

pub async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (owner_id, title, description, hashtags) = conn
        .query_row(
            "SELECT owner_id, title, description, hashtags FROM videos WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .map_err(|_| AppError::NotFound)?;

    if owner_id != user.id {
        return Err(AppError::Forbidden);
    }

    Ok(Html(EditVideoTemplate {
        id,
        title,
        description,
        hashtags,
        error_message: None,
        username: Some(user.username),
    })
    .into_response())
}

#[derive(serde::Deserialize)]
pub struct EditVideoForm {
    pub title: String,
    pub description: String,
    pub hashtags: String,
}

pub async fn edit_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    axum::Form(form): axum::Form<EditVideoForm>,
) -> AppResult<Response> {
    let title = form.title.trim().to_string();

    let conn = state.db.get()?;
    let owner_id: String = conn
        .query_row(
            "SELECT owner_id FROM videos WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if owner_id != user.id {
        return Err(AppError::Forbidden);
    }

    if title.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Html(EditVideoTemplate {
                id,
                title,
                description: form.description,
                hashtags: form.hashtags,
                error_message: Some("Title is required.".to_string()),
                username: Some(user.username),
            }),
        )
            .into_response());
    }

    let tags = format_hashtags(&form.hashtags).join(" ");
    conn.execute(
        "UPDATE videos SET title = ?1, description = ?2, hashtags = ?3 WHERE id = ?4",
        params![title, form.description.trim(), tags, id],
    )?;

    Ok(Redirect::to(&format!("/videos/{}", id)).into_response())
}

pub async fn delete_video(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (owner_id, file_path, thumb_path) = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT owner_id, file_path, thumb_path FROM videos WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .map_err(|_| AppError::NotFound)?
    };

    if owner_id != user.id {
        return Err(AppError::Forbidden);
    }

    {
        let conn = state.db.get()?;
        conn.execute("DELETE FROM videos WHERE id = ?1", params![id])?;
    }

    // Media removal is best-effort; the row is already gone.
    let uploads_dir = state.config.uploads_path();
    for name in [&file_path, &thumb_path] {
        if let Err(e) = tokio::fs::remove_file(uploads_dir.join(name)).await {
            tracing::warn!("Could not remove {}: {}", name, e);
        }
    }

    Ok(Redirect::to("/").into_response())
}

/// Serve uploaded media from the storage directory.
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Response {
    // Reject anything that could escape the uploads dir
    if path.split('/').any(|part| part == ".." || part.is_empty()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let full = state.config.uploads_path().join(&path);
    match tokio::fs::read(&full).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                data,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

// --- Helpers ---

fn upload_form_error(message: String, username: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Html(UploadTemplate {
            error_message: Some(message),
            username: Some(username),
        }),
    )
        .into_response()
}

pub(crate) async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid field: {}", e)))
}

pub(crate) async fn read_file(
    field: axum::extract::multipart::Field<'_>,
) -> AppResult<Option<(String, Vec<u8>)>> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid file upload: {}", e)))?;

    if file_name.is_empty() || bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some((file_name, bytes.to_vec())))
}

/// Storage name for an upload: fresh uuid, original extension (letters and
/// digits only) when one exists.
pub(crate) fn stored_name(original: &str) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let ext = std::path::Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", id, ext.to_ascii_lowercase()),
        None => id,
    }
}

pub(crate) async fn store_upload(
    dir: &std::path::Path,
    name: &str,
    bytes: &[u8],
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(name), bytes).await
}

/// Normalize comma-separated hashtag input: trim, drop empties, ensure a
/// single leading '#'.
pub fn format_hashtags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().trim_start_matches('#'))
        .filter(|part| !part.is_empty())
        .map(|part| format!("#{}", part))
        .collect()
}

// --- Query helpers ---

fn query_watch_video(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<WatchVideo>, AppError> {
    let video = conn
        .query_row(
            "SELECT v.id, v.title, v.description, v.file_path, v.hashtags, v.views,
                    v.created_at, u.username, v.owner_id
             FROM videos v
             JOIN users u ON u.id = v.owner_id
             WHERE v.id = ?1",
            params![id],
            |row| {
                Ok(WatchVideo {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    file_path: row.get(3)?,
                    hashtags: row.get(4)?,
                    views: row.get(5)?,
                    created_at: row.get(6)?,
                    author: row.get(7)?,
                    owner_id: row.get(8)?,
                })
            },
        )
        .map(|mut v| {
            v.created_at = parse_and_format_time(&v.created_at);
            v
        });

    match video {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_comments(
    conn: &rusqlite::Connection,
    video_id: &str,
    viewer_id: Option<&str>,
) -> Result<Vec<CommentView>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, u.username, c.body, c.created_at, c.user_id
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.video_id = ?1
         ORDER BY c.created_at ASC",
    )?;

    let comments = stmt
        .query_map(params![video_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .map(|(id, author, body, created_at, user_id)| CommentView {
            id,
            author,
            body,
            created_at: parse_and_format_time(&created_at),
            can_delete: viewer_id == Some(user_id.as_str()),
        })
        .collect();

    Ok(comments)
}

// --- Tests ---
