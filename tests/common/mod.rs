// Shared harness: each test boots the real router on an ephemeral port with
// a throwaway data directory, then drives it over HTTP with a cookie-keeping
// reqwest client.
#![allow(dead_code)]

use tempfile::TempDir;

use retube::auth::github::GithubClient;
use retube::config::Config;
use retube::state::{AppState, DbPool};

pub struct TestApp {
    pub base_url: String,
    pub db: DbPool,
    pub uploads_dir: std::path::PathBuf,
    _data_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let data_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = Some(data_dir.path().join("test.db"));
    config.storage.path = Some(data_dir.path().join("uploads"));
    tweak(&mut config);

    let pool = retube::db::create_pool(config.db_path()).expect("create pool");
    retube::db::run_migrations(&pool).expect("run migrations");

    let uploads_dir = config.uploads_path().clone();
    let state = AppState {
        db: pool.clone(),
        github: GithubClient::new(config.oauth.clone()),
        config,
    };
    let app = retube::app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", addr),
        db: pool,
        uploads_dir,
        _data_dir: data_dir,
    }
}

/// Cookie-keeping client that does not follow redirects, so tests can assert
/// on the redirect responses themselves.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Register a local account through the join form and log it in. Returns the
/// new user's id.
pub async fn register_and_login(
    app: &TestApp,
    http: &reqwest::Client,
    username: &str,
    password: &str,
) -> String {
    let response = http
        .post(app.url("/join"))
        .form(&[
            ("name", username),
            ("username", username),
            ("email", &format!("{}@example.com", username)),
            ("password", password),
            ("password2", password),
            ("location", ""),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303, "join should redirect to /login");

    let response = http
        .post(app.url("/login"))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303, "login should redirect home");

    let conn = app.db.get().unwrap();
    conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        rusqlite::params![username],
        |r| r.get(0),
    )
    .unwrap()
}

/// Insert a video row directly, for tests that do not care about the upload
/// path itself.
pub fn seed_video(app: &TestApp, id: &str, owner_id: &str, title: &str) {
    let conn = app.db.get().unwrap();
    conn.execute(
        "INSERT INTO videos (id, owner_id, title, file_path, thumb_path)
         VALUES (?1, ?2, ?3, 'seed.mp4', 'seed.jpg')",
        rusqlite::params![id, owner_id, title],
    )
    .unwrap();
}
