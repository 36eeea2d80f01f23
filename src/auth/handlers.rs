use askama::Template;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use rusqlite::params;
use serde::Deserialize;

use crate::auth::github::{primary_verified_email, GithubProfile};
use crate::auth::{password, session};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::home::Html;
use crate::routes::videos::{read_file, read_text, store_upload, stored_name};
use crate::state::{AppState, DbPool};

// -- Templates --

#[derive(Template)]
#[template(path = "pages/join.html")]
pub struct JoinTemplate {
    pub error_message: Option<String>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error_message: Option<String>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/edit_profile.html")]
pub struct EditProfileTemplate {
    pub name: String,
    pub email: String,
    pub account_username: String,
    pub location: String,
    pub social_only: bool,
    pub error_message: Option<String>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/change_password.html")]
pub struct ChangePasswordTemplate {
    pub error_message: Option<String>,
    pub username: Option<String>,
}

// -- Forms --

#[derive(Deserialize)]
pub struct JoinForm {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub new_password2: String,
}

#[derive(Deserialize)]
pub struct GithubCallback {
    pub code: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

fn form_error<T: Template>(template: T) -> Response {
    (StatusCode::BAD_REQUEST, Html(template)).into_response()
}

// -- Join --

/// GET /join
pub async fn join_page() -> Html<JoinTemplate> {
    Html(JoinTemplate {
        error_message: None,
        username: None,
    })
}

/// POST /join
pub async fn join_submit(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<JoinForm>,
) -> AppResult<Response> {
    let name = form.name.trim().to_string();
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    let location = form.location.trim().to_string();

    let join_error = |message: &str| {
        form_error(JoinTemplate {
            error_message: Some(message.to_string()),
            username: None,
        })
    };

    if form.password != form.password2 {
        return Ok(join_error("Password confirmation does not match."));
    }
    if name.is_empty() || username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Ok(join_error("All fields except location are required."));
    }

    let conn = state.db.get()?;
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 OR email = ?2",
        params![username, email],
        |row| row.get(0),
    )?;
    if taken {
        return Ok(join_error("This username/email is already taken."));
    }

    let password_hash = password::hash(&form.password)?;
    let user_id = uuid::Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT INTO users (id, username, email, name, password_hash, location)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            username,
            email,
            name,
            password_hash,
            if location.is_empty() { None } else { Some(location) }
        ],
    );

    if let Err(e) = inserted {
        tracing::error!("Failed to create account: {}", e);
        return Ok(join_error("Could not create the account."));
    }

    Ok(Redirect::to("/login").into_response())
}

// -- Local login --

/// GET /login
pub async fn login_page() -> Html<LoginTemplate> {
    Html(LoginTemplate {
        error_message: None,
        username: None,
    })
}

/// POST /login
pub async fn login_submit(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<LoginForm>,
) -> AppResult<Response> {
    let username = form.username.trim();

    let login_error = |message: &str| {
        form_error(LoginTemplate {
            error_message: Some(message.to_string()),
            username: None,
        })
    };

    let row: Option<(String, Option<String>, bool)> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, password_hash, social_only FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .ok()
    };

    // A social-only account has no password to check, so it fails the same
    // way as an unknown username no matter what was typed.
    let (user_id, password_hash) = match row {
        Some((_, _, true)) | None => {
            return Ok(login_error("An account with this username does not exist."));
        }
        Some((id, hash, false)) => (id, hash),
    };

    if !password::verify(&form.password, password_hash.as_deref()) {
        return Ok(login_error("Wrong password."));
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        StatusCode::SEE_OTHER,
        [(header::SET_COOKIE, cookie), (header::LOCATION, "/".into())],
    )
        .into_response())
}

// -- Logout --

/// GET /users/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = get_cookie_value(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (
                header::SET_COOKIE,
                clear_session_cookie(&state.config.auth.cookie_name),
            ),
            (header::LOCATION, "/".into()),
        ],
    )
        .into_response())
}

// -- OAuth --

/// GET /users/github/start - redirect step of the handshake
pub async fn github_start(State(state): State<AppState>) -> AppResult<Response> {
    let url = state.github.authorization_url()?;
    Ok(Redirect::to(&url).into_response())
}

/// GET /users/github/finish - callback step. Any gap in the handshake (no
/// code, no token, no usable email) falls back to the login page without a
/// session.
pub async fn github_finish(
    State(state): State<AppState>,
    Query(query): Query<GithubCallback>,
) -> AppResult<Response> {
    let code = match query.code {
        Some(code) => code,
        None => return Ok(Redirect::to("/login").into_response()),
    };

    let access_token = match state.github.exchange_code(&code).await? {
        Some(token) => token,
        None => {
            tracing::warn!("OAuth code exchange returned no access token");
            return Ok(Redirect::to("/login").into_response());
        }
    };

    let profile = state.github.fetch_profile(&access_token).await?;
    let emails = state.github.fetch_emails(&access_token).await?;

    let email = match primary_verified_email(&emails) {
        Some(email) => email.to_string(),
        None => {
            tracing::warn!("OAuth account has no primary verified email");
            return Ok(Redirect::to("/login").into_response());
        }
    };

    let user_id = find_or_create_social_user(&state.db, &email, &profile)?;
    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        StatusCode::SEE_OTHER,
        [(header::SET_COOKIE, cookie), (header::LOCATION, "/".into())],
    )
        .into_response())
}

/// Link by verified email; first OAuth login creates a social-only account
/// with no password hash.
fn find_or_create_social_user(
    pool: &DbPool,
    email: &str,
    profile: &GithubProfile,
) -> AppResult<String> {
    let conn = pool.get()?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )
        .ok();
    if let Some(id) = existing {
        return Ok(id);
    }

    // The provider login is the preferred username; dodge collisions with a
    // short random suffix.
    let mut username = profile.login.clone();
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    if taken {
        let suffix = uuid::Uuid::now_v7().simple().to_string();
        username = format!("{}-{}", username, &suffix[..8]);
    }

    let name = profile
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| profile.login.clone());

    let user_id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, email, name, password_hash, location, avatar_path, social_only)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, 1)",
        params![user_id, username, email, name, profile.location, profile.avatar_url],
    )?;

    tracing::info!("Created social-only account for {}", username);
    Ok(user_id)
}

// -- Profile edit --

/// GET /users/edit
pub async fn edit_profile_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let location: Option<String> = conn.query_row(
        "SELECT location FROM users WHERE id = ?1",
        params![user.id],
        |r| r.get(0),
    )?;

    Ok(Html(EditProfileTemplate {
        name: user.name,
        email: user.email,
        account_username: user.username.clone(),
        location: location.unwrap_or_default(),
        social_only: user.social_only,
        error_message: None,
        username: Some(user.username),
    })
    .into_response())
}

/// POST /users/edit - multipart so an avatar file can ride along
pub async fn edit_profile_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut name = String::new();
    let mut email = String::new();
    let mut new_username = String::new();
    let mut location = String::new();
    let mut avatar: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid form: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = read_text(field).await?,
            "email" => email = read_text(field).await?,
            "username" => new_username = read_text(field).await?,
            "location" => location = read_text(field).await?,
            "avatar" => avatar = read_file(field).await?,
            _ => {}
        }
    }

    let name = name.trim().to_string();
    let email = email.trim().to_string();
    let new_username = new_username.trim().to_string();
    let location = location.trim().to_string();

    let edit_error = |message: &str, user: &CurrentUser| {
        form_error(EditProfileTemplate {
            name: name.clone(),
            email: email.clone(),
            account_username: new_username.clone(),
            location: location.clone(),
            social_only: user.social_only,
            error_message: Some(message.to_string()),
            username: Some(user.username.clone()),
        })
    };

    if name.is_empty() || email.is_empty() || new_username.is_empty() {
        return Ok(edit_error("Name, username and email are required.", &user));
    }

    {
        let conn = state.db.get()?;
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE (username = ?1 OR email = ?2) AND id != ?3",
            params![new_username, email, user.id],
            |row| row.get(0),
        )?;
        if taken {
            return Ok(edit_error("This username/email is already taken.", &user));
        }
    }

    let avatar_path = match avatar {
        Some((original_name, bytes)) => {
            let stored = stored_name(&original_name);
            if let Err(e) = store_upload(state.config.uploads_path(), &stored, &bytes).await {
                tracing::error!("Failed to store avatar: {}", e);
                return Ok(edit_error("Could not store the avatar image.", &user));
            }
            Some(stored)
        }
        None => None,
    };

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, username = ?3, location = ?4,
                avatar_path = COALESCE(?5, avatar_path)
         WHERE id = ?6",
        params![
            name,
            email,
            new_username,
            if location.is_empty() { None } else { Some(location.clone()) },
            avatar_path,
            user.id
        ],
    )?;

    Ok(Redirect::to("/users/edit").into_response())
}

// -- Password change --

/// GET /users/change-password
pub async fn change_password_page(user: CurrentUser) -> Response {
    // Social-only accounts have no local password to change
    if user.social_only {
        return Redirect::to("/").into_response();
    }

    Html(ChangePasswordTemplate {
        error_message: None,
        username: Some(user.username),
    })
    .into_response()
}

/// POST /users/change-password
pub async fn change_password_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    axum::Form(form): axum::Form<ChangePasswordForm>,
) -> AppResult<Response> {
    if user.social_only {
        return Ok(Redirect::to("/").into_response());
    }

    let password_error = |message: &str| {
        form_error(ChangePasswordTemplate {
            error_message: Some(message.to_string()),
            username: Some(user.username.clone()),
        })
    };

    let stored_hash: Option<String> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT password_hash FROM users WHERE id = ?1",
            params![user.id],
            |r| r.get(0),
        )?
    };

    if !password::verify(&form.old_password, stored_hash.as_deref()) {
        return Ok(password_error("The current password is incorrect."));
    }
    if form.new_password != form.new_password2 {
        return Ok(password_error(
            "The new password does not match the confirmation.",
        ));
    }

    let new_hash = password::hash(&form.new_password)?;
    {
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![new_hash, user.id],
        )?;
    }

    Ok(Redirect::to("/users/edit").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_token_and_max_age() {
        let cookie = session_cookie("retube_session", "tok123", 2);
        assert!(cookie.starts_with("retube_session=tok123;"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie("retube_session");
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn get_cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "a=1; retube_session=tok; b=2".parse().unwrap(),
        );
        assert_eq!(get_cookie_value(&headers, "retube_session"), Some("tok"));
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }
}
