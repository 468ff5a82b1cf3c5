use portfolio_backend::api::{self, AppState, COMMENT_TOKEN_HEADER};
use portfolio_backend::bootstrap;
use portfolio_backend::config::{PortfolioConfig, PortfolioPaths, StorageConfig};
use portfolio_backend::store::{RecordStore, SqliteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct TestServer {
    _dir: TempDir,
    base_url: String,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempdir().expect("tempdir");
        let paths = PortfolioPaths::from_base_dir(dir.path()).expect("paths");
        let config = PortfolioConfig::new(0, paths, StorageConfig::Local);
        let resources = bootstrap::initialize(&config).await.expect("bootstrap");
        Self::start_with(dir, config, resources.store, resources.ownership).await
    }

    async fn start_with(
        dir: TempDir,
        mut config: PortfolioConfig,
        store: Arc<dyn RecordStore>,
        ownership: portfolio_backend::ownership::OwnershipKey,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        config.api_port = port;
        let shutdown = CancellationToken::new();
        let state = AppState::new(
            config,
            store,
            ownership,
            Default::default(),
            shutdown.clone(),
        );
        let server = tokio::spawn(api::serve_on(listener, state));
        Self {
            _dir: dir,
            base_url: format!("http://127.0.0.1:{port}"),
            shutdown,
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.server
            .await
            .expect("server task")
            .expect("server exits cleanly");
    }
}

async fn post_comment(client: &reqwest::Client, server: &TestServer, name: &str, message: &str) -> Value {
    let resp = client
        .post(server.url("/comments"))
        .json(&json!({ "name": name, "message": message }))
        .send()
        .await
        .expect("post comment");
    assert_eq!(resp.status(), 201);
    resp.json().await.expect("comment json")
}

#[tokio::test]
async fn comment_lifecycle_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(server.url("/health"))
        .send()
        .await
        .expect("health")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["storage"], "sqlite");

    let empty: Value = client
        .get(server.url("/comments"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list json");
    assert_eq!(empty["success"], true);
    assert_eq!(empty["comments"].as_array().map(Vec::len), Some(0));

    let first = post_comment(&client, &server, "Ada", "first").await;
    let created = post_comment(
        &client,
        &server,
        "  Grace ",
        r#"<b>bold</b><script>alert(1)</script><a href="javascript:x()">link</a>"#,
    )
    .await;
    assert_eq!(created["success"], true);
    assert_eq!(created["comment"]["name"], "Grace");
    assert_eq!(created["comment"]["message"], "<b>bold</b><a>link</a>");
    let id = created["comment"]["id"].as_str().expect("id").to_string();
    let token = created["token"].as_str().expect("token").to_string();

    let listed: Value = client
        .get(server.url("/comments"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list json");
    let comments = listed["comments"].as_array().expect("comments");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["id"], id.as_str());
    assert_eq!(comments[1]["id"], first["comment"]["id"]);

    let updated: Value = client
        .put(server.url(&format!("/comments/{id}")))
        .header(COMMENT_TOKEN_HEADER, &token)
        .json(&json!({ "name": "Grace", "message": "edited <i>again</i>" }))
        .send()
        .await
        .expect("update")
        .json()
        .await
        .expect("update json");
    assert_eq!(updated["success"], true);
    assert_eq!(updated["comment"]["message"], "edited <i>again</i>");

    let deleted = client
        .delete(server.url(&format!("/comments/{id}")))
        .header(COMMENT_TOKEN_HEADER, &token)
        .send()
        .await
        .expect("delete");
    assert_eq!(deleted.status(), 200);

    let again = client
        .delete(server.url(&format!("/comments/{id}")))
        .header(COMMENT_TOKEN_HEADER, &token)
        .send()
        .await
        .expect("second delete");
    assert_eq!(again.status(), 404);
    let body: Value = again.json().await.expect("error json");
    assert_eq!(body["success"], false);

    server.stop().await;
}

#[tokio::test]
async fn mutations_require_the_issued_token() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let mine = post_comment(&client, &server, "Ada", "mine").await;
    let theirs = post_comment(&client, &server, "Eve", "theirs").await;
    let mine_id = mine["comment"]["id"].as_str().expect("id");
    let their_token = theirs["token"].as_str().expect("token");

    let missing = client
        .put(server.url(&format!("/comments/{mine_id}")))
        .json(&json!({ "name": "Eve", "message": "hijacked" }))
        .send()
        .await
        .expect("update without token");
    assert_eq!(missing.status(), 401);

    let wrong = client
        .delete(server.url(&format!("/comments/{mine_id}")))
        .header(COMMENT_TOKEN_HEADER, their_token)
        .send()
        .await
        .expect("delete with wrong token");
    assert_eq!(wrong.status(), 403);
    let body: Value = wrong.json().await.expect("error json");
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some());

    let listed: Value = client
        .get(server.url("/comments"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list json");
    assert_eq!(listed["comments"].as_array().map(Vec::len), Some(2));

    server.stop().await;
}

#[tokio::test]
async fn invalid_comments_are_rejected_with_messages() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let cases = [
        (json!({ "name": "   ", "message": "hi" }), "name is required"),
        (
            json!({ "name": "a".repeat(101), "message": "hi" }),
            "name is too long (max 100 characters)",
        ),
        (json!({ "name": "Ada", "message": "" }), "message is required"),
        (
            json!({ "name": "Ada", "message": "m".repeat(1001) }),
            "message is too long (max 1000 characters)",
        ),
    ];
    for (payload, expected) in cases {
        let resp = client
            .post(server.url("/comments"))
            .json(&payload)
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.expect("error json");
        assert_eq!(body["error"], expected);
    }

    server.stop().await;
}

#[tokio::test]
async fn contacts_are_sanitized_and_required() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/contacts"))
        .json(&json!({ "name": "Ada", "email": " ", "message": "hello" }))
        .send()
        .await
        .expect("contact");
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("error json");
    assert_eq!(body["error"], "email is required");

    let resp = client
        .post(server.url("/contacts"))
        .json(&json!({
            "name": "Ada",
            "email": "ada@example.com",
            "message": "<script>steal()</script>Let's talk"
        }))
        .send()
        .await
        .expect("contact");
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);

    server.stop().await;
}

#[tokio::test]
async fn page_renders_comments_and_survives_missing_tables() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    post_comment(&client, &server, "Ada", "<b>Great</b> site").await;

    let page = client
        .get(server.url("/"))
        .send()
        .await
        .expect("page")
        .text()
        .await
        .expect("page text");
    assert!(page.contains("<section id=\"comments\">"));
    assert!(page.contains("<b>Great</b>"));
    server.stop().await;

    // A store whose tables were never created: listing reads as empty and
    // the page still renders, while writes report the storage failure.
    let dir = tempdir().expect("tempdir");
    let paths = PortfolioPaths::from_base_dir(dir.path()).expect("paths");
    let config = PortfolioConfig::new(0, paths, StorageConfig::Local);
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().expect("db"));
    let server = TestServer::start_with(
        dir,
        config,
        store,
        portfolio_backend::ownership::OwnershipKey::generate(),
    )
    .await;

    let listed: Value = client
        .get(server.url("/comments"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list json");
    assert_eq!(listed["success"], true);
    assert_eq!(listed["comments"].as_array().map(Vec::len), Some(0));

    let page = client
        .get(server.url("/"))
        .send()
        .await
        .expect("page")
        .text()
        .await
        .expect("page text");
    assert!(page.contains("No comments yet"));

    let resp = client
        .post(server.url("/comments"))
        .json(&json!({ "name": "Ada", "message": "hi" }))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 502);

    server.stop().await;
}
