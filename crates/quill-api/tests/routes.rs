//! End-to-end checks against the full router with an in-memory database.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tempfile::TempDir;
use tower::ServiceExt;

use quill_api::flash::FLASH_COOKIE;
use quill_api::middleware::SESSION_COOKIE;
use quill_api::storage::AvatarStore;
use quill_api::{AppState, AppStateInner, router};
use quill_db::Database;
use quill_types::models::{Flash, FlashKind};

const PASSWORD: &str = "password123";

struct TestApp {
    state: AppState,
    router: Router,
    static_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_session_days(30).await
    }

    async fn with_session_days(session_days: i64) -> Self {
        let static_dir = tempfile::tempdir().unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            avatars: AvatarStore::new(static_dir.path().to_path_buf()).await.unwrap(),
            session_days,
            cookie_secure: false,
        });
        let router = router(state.clone());
        Self { state, router, static_dir }
    }

    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut req = Request::get(uri);
        if let Some(cookie) = session {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, session: Option<&str>, body: &str) -> Response<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = session {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn register(&self, username: &str) -> Response<Body> {
        let body = format!("username={username}&email={username}%40example.com&password={PASSWORD}");
        self.post_form("/register", None, &body).await
    }

    /// Registers and logs in, returning the `Cookie` header value to reuse.
    async fn sign_up(&self, username: &str) -> String {
        let resp = self.register(username).await;
        assert_eq!(location(&resp), Some("/login"));
        self.login(username, PASSWORD).await.expect("login should succeed")
    }

    async fn login(&self, username: &str, password: &str) -> Option<String> {
        let resp = self
            .post_form("/login", None, &format!("username={username}&password={password}"))
            .await;
        session_cookie(&resp)
    }

    fn user_id(&self, username: &str) -> i64 {
        self.state.db.get_user_by_username(username).unwrap().unwrap().id
    }

    fn create_post(&self, author: &str, title: &str) -> i64 {
        self.state.db.create_post(self.user_id(author), title, "body text").unwrap()
    }

    fn create_comment(&self, post_id: i64, author: &str) -> i64 {
        self.state.db.create_comment(post_id, self.user_id(author), "a comment").unwrap()
    }

    fn avatar(&self, username: &str) -> Option<String> {
        self.state.db.get_user_by_username(username).unwrap().unwrap().avatar
    }

    fn stored_avatar_files(&self) -> usize {
        std::fs::read_dir(self.static_dir.path().join("avatars")).unwrap().count()
    }
}

fn location(resp: &Response<Body>) -> Option<&str> {
    resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
}

fn set_cookie_value<'a>(resp: &'a Response<Body>, name: &str) -> Option<&'a str> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn session_cookie(resp: &Response<Body>) -> Option<String> {
    set_cookie_value(resp, SESSION_COOKIE).map(|value| format!("{SESSION_COOKIE}={value}"))
}

fn flash(resp: &Response<Body>) -> Option<Flash> {
    let raw = URL_SAFE_NO_PAD.decode(set_cookie_value(resp, FLASH_COOKIE)?).ok()?;
    serde_json::from_slice(&raw).ok()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn avatar_upload(session: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let (content_type, body) = multipart(file_name, data);
    Request::post("/profile")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::COOKIE, session)
        .body(Body::from(body))
        .unwrap()
}

fn multipart(file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "quill-test-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// -- Authentication --

#[tokio::test]
async fn register_rejects_existing_username_or_email() {
    let app = TestApp::new().await;

    let resp = app.register("alice").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), Some("/login"));
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Success));

    let resp = app
        .post_form("/register", None, &format!("username=alice&email=other%40example.com&password={PASSWORD}"))
        .await;
    assert_eq!(location(&resp), Some("/register"));
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error));

    let resp = app
        .post_form("/register", None, &format!("username=bob&email=alice%40example.com&password={PASSWORD}"))
        .await;
    assert_eq!(location(&resp), Some("/register"));
    assert!(app.state.db.get_user_by_username("bob").unwrap().is_none());
}

#[tokio::test]
async fn password_is_stored_hashed() {
    let app = TestApp::new().await;
    app.register("alice").await;

    let user = app.state.db.get_user_by_username("alice").unwrap().unwrap();
    assert_ne!(user.password_hash, PASSWORD);
    assert!(user.password_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn correct_credentials_log_in_and_wrong_ones_do_not() {
    let app = TestApp::new().await;
    app.register("alice").await;

    let resp = app.post_form("/login", None, "username=alice&password=not-the-password").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_cookie(&resp).is_none());
    assert!(body_text(resp).await.contains("Invalid username or password."));

    let resp = app.post_form("/login", None, "username=nobody&password=whatever").await;
    assert!(session_cookie(&resp).is_none());

    let session = app.login("alice", PASSWORD).await.expect("session cookie");
    let page = body_text(app.get("/", Some(&session)).await).await;
    assert!(page.contains("Log out"));
    assert!(page.contains("alice"));
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    let resp = app.get("/logout", Some(&session)).await;
    assert_eq!(location(&resp), Some("/login"));

    // The old cookie no longer authenticates
    let resp = app.get("/create", Some(&session)).await;
    assert_eq!(location(&resp), Some("/login"));
}

#[tokio::test]
async fn anonymous_users_are_sent_to_login() {
    let app = TestApp::new().await;

    for uri in ["/create", "/profile"] {
        let resp = app.get(uri, None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&resp), Some("/login"), "{uri}");
    }

    app.register("alice").await;
    let post_id = app.create_post("alice", "Hello");
    let resp = app.post_form(&format!("/post/{post_id}"), None, "content=drive-by").await;
    assert_eq!(location(&resp), Some("/login"));
    assert!(app.state.db.list_comments(post_id).unwrap().is_empty());

    let comment_id = app.create_comment(post_id, "alice");
    for uri in [
        format!("/edit/{post_id}"),
        format!("/delete/{post_id}"),
        format!("/comment/delete/{comment_id}"),
    ] {
        let resp = app.post_form(&uri, None, "title=Hijacked&content=x").await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&resp), Some("/login"), "{uri}");
    }
    assert_eq!(app.state.db.get_post(post_id).unwrap().unwrap().title, "Hello");
    assert!(app.state.db.get_comment(comment_id).unwrap().is_some());

    // Reading stays public
    let resp = app.get(&format!("/post/{post_id}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unrepresentable_session_expiry_fails_login_cleanly() {
    let app = TestApp::with_session_days(200_000_000).await;
    app.register("alice").await;

    let resp = app
        .post_form("/login", None, &format!("username=alice&password={PASSWORD}"))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(session_cookie(&resp).is_none());
}

// -- Posts --

#[tokio::test]
async fn create_and_edit_post() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    let resp = app.post_form("/create", Some(&session), "title=First&content=Hello+world").await;
    assert_eq!(location(&resp), Some("/"));

    let post = app.state.db.list_posts().unwrap().pop().unwrap();
    assert_eq!(post.title, "First");
    assert_eq!(post.author_username, "alice");

    let resp = app
        .post_form(&format!("/edit/{}", post.id), Some(&session), "title=Renamed&content=New+body")
        .await;
    assert_eq!(location(&resp), Some(format!("/post/{}", post.id).as_str()));

    let post = app.state.db.get_post(post.id).unwrap().unwrap();
    assert_eq!((post.title.as_str(), post.content.as_str()), ("Renamed", "New body"));

    let page = body_text(app.get("/", None).await).await;
    assert!(page.contains("Renamed"));
}

#[tokio::test]
async fn invalid_post_is_bounced_back_to_form() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    let resp = app.post_form("/create", Some(&session), "title=&content=body").await;
    assert_eq!(location(&resp), Some("/create"));
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error));
    assert!(app.state.db.list_posts().unwrap().is_empty());
}

#[tokio::test]
async fn only_the_author_can_edit_a_post() {
    let app = TestApp::new().await;
    app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let post_id = app.create_post("alice", "Mine");

    let resp = app.get(&format!("/edit/{post_id}"), Some(&bob)).await;
    assert_eq!(location(&resp), Some("/"));

    let resp = app.post_form(&format!("/edit/{post_id}"), Some(&bob), "title=Hijacked&content=x").await;
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error));
    assert_eq!(app.state.db.get_post(post_id).unwrap().unwrap().title, "Mine");
}

#[tokio::test]
async fn only_the_author_can_delete_a_post() {
    let app = TestApp::new().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let post_id = app.create_post("alice", "Mine");
    let comment_id = app.create_comment(post_id, "bob");

    let resp = app.post_form(&format!("/delete/{post_id}"), Some(&bob), "").await;
    assert_eq!(location(&resp), Some("/"));
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error));
    assert!(app.state.db.get_post(post_id).unwrap().is_some());

    let resp = app.post_form(&format!("/delete/{post_id}"), Some(&alice), "").await;
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Success));
    assert!(app.state.db.get_post(post_id).unwrap().is_none());
    assert!(app.state.db.get_comment(comment_id).unwrap().is_none());
}

#[tokio::test]
async fn missing_posts_and_comments_are_not_found() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    assert_eq!(app.get("/post/999", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/edit/999", Some(&session)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.post_form("/delete/999", Some(&session), "").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.post_form("/comment/delete/999", Some(&session), "").await.status(),
        StatusCode::NOT_FOUND
    );
}

// -- Comments --

#[tokio::test]
async fn comment_is_added_and_listed() {
    let app = TestApp::new().await;
    app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let post_id = app.create_post("alice", "Hello");

    let resp = app.post_form(&format!("/post/{post_id}"), Some(&bob), "content=Nice+post").await;
    assert_eq!(location(&resp), Some(format!("/post/{post_id}").as_str()));

    let page = body_text(app.get(&format!("/post/{post_id}"), None).await).await;
    assert!(page.contains("Nice post"));
    assert!(page.contains("bob"));
}

#[tokio::test]
async fn comment_deletion_allowed_for_comment_author_or_post_author() {
    let app = TestApp::new().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let carol = app.sign_up("carol").await;
    let post_id = app.create_post("alice", "Hello");
    let first = app.create_comment(post_id, "bob");
    let second = app.create_comment(post_id, "bob");

    // A bystander is refused
    let resp = app.post_form(&format!("/comment/delete/{first}"), Some(&carol), "").await;
    assert_eq!(location(&resp), Some(format!("/post/{post_id}").as_str()));
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error));
    assert!(app.state.db.get_comment(first).unwrap().is_some());

    // The comment's author may delete it
    let resp = app.post_form(&format!("/comment/delete/{first}"), Some(&bob), "").await;
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Success));
    assert!(app.state.db.get_comment(first).unwrap().is_none());

    // So may the author of the post
    let resp = app.post_form(&format!("/comment/delete/{second}"), Some(&alice), "").await;
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Success));
    assert!(app.state.db.get_comment(second).unwrap().is_none());
}

// -- Avatar --

#[tokio::test]
async fn avatar_upload_accepts_allowed_extensions_only() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    let upload = |name: &'static str| {
        let (content_type, body) = multipart(name, b"fake image bytes");
        Request::post("/profile")
            .header(header::CONTENT_TYPE, content_type)
            .header(header::COOKIE, session.clone())
            .body(Body::from(body))
            .unwrap()
    };

    let resp = app.send(upload("payload.exe")).await;
    assert_eq!(location(&resp), Some("/profile"));
    assert_eq!(flash(&resp).map(|f| f.message), Some("File type not allowed.".to_string()));
    assert!(app.state.db.get_user_by_username("alice").unwrap().unwrap().avatar.is_none());

    let resp = app.send(upload("me.PNG")).await;
    assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Success));

    let avatar = app.state.db.get_user_by_username("alice").unwrap().unwrap().avatar.unwrap();
    assert!(avatar.starts_with("avatars/") && avatar.ends_with(".png"));
    let stored = std::fs::read(app.static_dir.path().join(&avatar)).unwrap();
    assert_eq!(stored, b"fake image bytes");

    // Replacing the avatar removes the old file
    app.send(upload("again.jpg")).await;
    assert!(!app.static_dir.path().join(&avatar).exists());

    let page = body_text(app.get("/profile", Some(&session)).await).await;
    assert!(page.contains("/static/avatars/"));
}

#[tokio::test]
async fn uploaded_avatar_is_served_statically() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    let (content_type, body) = multipart("me.gif", b"GIF89a");
    let req = Request::post("/profile")
        .header(header::CONTENT_TYPE, content_type)
        .header(header::COOKIE, session)
        .body(Body::from(body))
        .unwrap();
    app.send(req).await;

    let avatar = app.state.db.get_user_by_username("alice").unwrap().unwrap().avatar.unwrap();
    let resp = app.get(&format!("/static/{avatar}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "GIF89a");
}

#[tokio::test]
async fn empty_and_oversized_avatars_are_rejected() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    for size in [0, 3 * 1024 * 1024, 5 * 1024 * 1024] {
        let resp = app.send(avatar_upload(&session, "x.png", &vec![0u8; size])).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{size} bytes");
        assert_eq!(location(&resp), Some("/profile"), "{size} bytes");
        assert_eq!(flash(&resp).map(|f| f.kind), Some(FlashKind::Error), "{size} bytes");
    }

    assert!(app.avatar("alice").is_none());
    assert_eq!(app.stored_avatar_files(), 0);
}

#[tokio::test]
async fn failed_avatar_update_leaves_no_file_behind() {
    let app = TestApp::new().await;
    let session = app.sign_up("alice").await;

    app.state
        .db
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER refuse_avatar BEFORE UPDATE OF avatar ON users
                 BEGIN SELECT RAISE(ABORT, 'avatar updates disabled'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    let resp = app.send(avatar_upload(&session, "me.png", b"fake image bytes")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.avatar("alice").is_none());
    assert_eq!(app.stored_avatar_files(), 0);
}
