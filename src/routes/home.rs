use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDateTime, Utc};
use rusqlite::params;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

// --- View structs ---

/// One video in a listing grid (home, search, profile).
pub struct VideoCard {
    pub id: String,
    pub title: String,
    pub thumb_path: String,
    pub author: String,
    pub views: i64,
    pub created_at: String,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub videos: Vec<VideoCard>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/search.html")]
pub struct SearchTemplate {
    pub videos: Vec<VideoCard>,
    pub keyword: String,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/not_found.html")]
pub struct NotFoundTemplate {
    pub username: Option<String>,
}

/// Render the 404 page with the right status code.
pub fn not_found_page(username: Option<String>) -> Response {
    (StatusCode::NOT_FOUND, Html(NotFoundTemplate { username })).into_response()
}

// --- Handlers ---

pub async fn index(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> AppResult<Response> {
    let username = user.map(|u| u.username);

    let videos = {
        let conn = state.db.get()?;
        query_video_cards(&conn, None)?
    };

    Ok(Html(HomeTemplate { videos, username }).into_response())
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Response> {
    let username = user.map(|u| u.username);
    let keyword = query.keyword.unwrap_or_default().trim().to_string();

    let videos = if keyword.is_empty() {
        Vec::new()
    } else {
        let conn = state.db.get()?;
        query_video_cards(&conn, Some(&keyword))?
    };

    Ok(Html(SearchTemplate {
        videos,
        keyword,
        username,
    })
    .into_response())
}

// --- Query helpers ---

/// Newest-first video cards; a keyword narrows to case-insensitive
/// substring matches on the title.
pub fn query_video_cards(
    conn: &rusqlite::Connection,
    keyword: Option<&str>,
) -> Result<Vec<VideoCard>, AppError> {
    let sql = "SELECT v.id, v.title, v.thumb_path, v.views, v.created_at, u.username
         FROM videos v
         JOIN users u ON u.id = v.owner_id
         WHERE ?1 = '' OR v.title LIKE '%' || ?1 || '%' COLLATE NOCASE
         ORDER BY v.created_at DESC";

    let mut stmt = conn.prepare(sql)?;
    let cards = stmt
        .query_map(params![keyword.unwrap_or("")], |row| {
            Ok(VideoCard {
                id: row.get(0)?,
                title: row.get(1)?,
                thumb_path: row.get(2)?,
                views: row.get(3)?,
                created_at: row.get(4)?,
                author: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .map(|mut card| {
            card.created_at = parse_and_format_time(&card.created_at);
            card
        })
        .collect();

    Ok(cards)
}

/// Video cards owned by one user, for the profile page.
pub fn query_user_video_cards(
    conn: &rusqlite::Connection,
    owner_id: &str,
) -> Result<Vec<VideoCard>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT v.id, v.title, v.thumb_path, v.views, v.created_at, u.username
         FROM videos v
         JOIN users u ON u.id = v.owner_id
         WHERE v.owner_id = ?1
         ORDER BY v.created_at DESC",
    )?;

    let cards = stmt
        .query_map(params![owner_id], |row| {
            Ok(VideoCard {
                id: row.get(0)?,
                title: row.get(1)?,
                thumb_path: row.get(2)?,
                views: row.get(3)?,
                created_at: row.get(4)?,
                author: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .map(|mut card| {
            card.created_at = parse_and_format_time(&card.created_at);
            card
        })
        .collect();

    Ok(cards)
}

// --- Time formatting ---

pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    fn test_conn() -> crate::state::DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        crate::db::run_migrations(&pool).unwrap();
        pool
    }

    fn seed_videos(conn: &rusqlite::Connection) {
        conn.execute(
            "INSERT INTO users (id, username, email, name) VALUES ('u1', 'alice', 'a@b.c', 'Alice')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO videos (id, owner_id, title, file_path, thumb_path, created_at)
             VALUES ('v1', 'u1', 'Crab racing highlights', 'v1.mp4', 'v1.jpg', '2025-01-01 10:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO videos (id, owner_id, title, file_path, thumb_path, created_at)
             VALUES ('v2', 'u1', 'Sourdough basics', 'v2.mp4', 'v2.jpg', '2025-01-02 10:00:00')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn listing_is_newest_first() {
        let pool = test_conn();
        let conn = pool.get().unwrap();
        seed_videos(&conn);

        let cards = query_video_cards(&conn, None).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].id, "v2");
        assert_eq!(cards[1].id, "v1");
        assert_eq!(cards[0].author, "alice");
    }

    #[test]
    fn search_matches_substring_case_insensitively() {
        let pool = test_conn();
        let conn = pool.get().unwrap();
        seed_videos(&conn);

        let cards = query_video_cards(&conn, Some("CRAB")).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, "v1");

        let none = query_video_cards(&conn, Some("zebra")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn format_relative_time_just_now() {
        let now = Utc::now().naive_utc();
        assert_eq!(format_relative_time(&now), "just now");
    }

    #[test]
    fn format_relative_time_minutes() {
        let dt = Utc::now().naive_utc() - chrono::Duration::minutes(5);
        assert_eq!(format_relative_time(&dt), "5m ago");
    }

    #[test]
    fn format_relative_time_old_date() {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(format_relative_time(&dt), "Jan 15, 2025");
    }

    #[test]
    fn parse_and_format_bad_input_returns_raw() {
        assert_eq!(parse_and_format_time("not-a-date"), "not-a-date");
    }
}
