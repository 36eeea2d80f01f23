use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::params;

use crate::auth::handlers;
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::routes::home::{not_found_page, query_user_video_cards, Html, VideoCard};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub profile_name: String,
    pub profile_username: String,
    pub avatar_path: Option<String>,
    pub videos: Vec<VideoCard>,
    pub username: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/join", get(handlers::join_page).post(handlers::join_submit))
        .route(
            "/login",
            get(handlers::login_page).post(handlers::login_submit),
        )
        .route("/users/logout", get(handlers::logout))
        .route(
            "/users/edit",
            get(handlers::edit_profile_page).post(handlers::edit_profile_submit),
        )
        .route(
            "/users/change-password",
            get(handlers::change_password_page).post(handlers::change_password_submit),
        )
        .route("/users/github/start", get(handlers::github_start))
        .route("/users/github/finish", get(handlers::github_finish))
        .route("/users/{id}", get(profile))
}

/// Public profile: the user's display name and their videos.
pub async fn profile(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let username = viewer.map(|u| u.username);

    let conn = state.db.get()?;
    let profile = conn.query_row(
        "SELECT name, username, avatar_path FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        },
    );

    let (profile_name, profile_username, avatar_path) = match profile {
        Ok(p) => p,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(not_found_page(username)),
        Err(e) => return Err(AppError::from(e)),
    };

    let videos = query_user_video_cards(&conn, &id)?;

    Ok(Html(ProfileTemplate {
        profile_name,
        profile_username,
        avatar_path,
        videos,
        username,
    })
    .into_response())
}
