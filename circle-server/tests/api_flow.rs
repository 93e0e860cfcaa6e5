use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use circle_server::{
    config::Settings,
    db::{repositories::UserRepository, Database},
    router::build_router,
    state::AppState,
};

struct TestApp {
    router: Router,
    db: Database,
}

impl TestApp {
    fn new() -> Result<Self> {
        Self::with_settings(Settings::defaults()?)
    }

    fn with_settings(settings: Settings) -> Result<Self> {
        let db = Database::in_memory()?;
        db.initialize()?;
        let state = AppState::new(db.clone(), settings);
        Ok(Self {
            router: build_router(state),
            db,
        })
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("X-Session-Token", token);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, value))
    }

    /// Register an account and return `(user_id, session_token)`
    async fn register(&self, username: &str) -> Result<(String, String)> {
        let (status, body) = self
            .call(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": "password123" })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "register {}: {}", username, body);
        Ok((
            body["user"]["id"].as_str().unwrap().to_string(),
            body["session_token"].as_str().unwrap().to_string(),
        ))
    }
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_unauthenticated_requests_are_denied() -> Result<()> {
    let app = TestApp::new()?;

    let (status, body) = app.call("GET", "/posts/feed", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Authentication required");

    let (status, body) = app.call("GET", "/auth/me", Some("not-a-token"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication required");
    Ok(())
}

#[tokio::test]
async fn test_register_login_logout() -> Result<()> {
    let app = TestApp::new()?;
    let (_, token) = app.register("alice").await?;

    let (status, body) = app.call("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    // Usernames are unique regardless of case
    let (status, _) = app
        .call(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "ALICE", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-password" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let second_token = body["session_token"].as_str().unwrap().to_string();

    let (status, _) = app.call("POST", "/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other sessions survive a logout
    let (status, _) = app.call("GET", "/auth/me", Some(&second_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_friends_only_posts_and_friend_requests() -> Result<()> {
    let app = TestApp::new()?;
    let (alice_id, alice) = app.register("alice").await?;
    let (_, bob) = app.register("bob").await?;
    let (carol_id, carol) = app.register("carol").await?;

    let (status, post) = app
        .call(
            "POST",
            "/posts",
            Some(&alice),
            Some(json!({ "content": "friends only", "visibility": "friends" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let post_uri = format!("/posts/{}", post["id"].as_str().unwrap());

    // Strangers and anonymous viewers can't see it
    let (status, _) = app.call("GET", &post_uri, Some(&carol), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call("GET", &post_uri, None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A one-way follow is enough
    let (status, body) = app
        .call("POST", &format!("/users/{}/follow", alice_id), Some(&bob), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["following"], true);
    assert_eq!(body["follower_count"], 1);
    let (status, _) = app.call("GET", &post_uri, Some(&bob), None).await?;
    assert_eq!(status, StatusCode::OK);

    // Carol asks, alice accepts
    let (status, request) = app
        .call(
            "POST",
            "/friend-requests",
            Some(&carol),
            Some(json!({ "receiver_id": alice_id })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "pending");

    let (status, _) = app
        .call(
            "POST",
            "/friend-requests",
            Some(&carol),
            Some(json!({ "receiver_id": alice_id })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, incoming) = app.call("GET", "/friend-requests/incoming", Some(&alice), None).await?;
    assert_eq!(incoming.as_array().unwrap().len(), 1);

    let accept_uri = format!("/friend-requests/{}/accept", request["id"].as_str().unwrap());
    let (status, _) = app.call("POST", &accept_uri, Some(&carol), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("POST", &accept_uri, Some(&alice), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, friends) = app.call("GET", "/social/friends", Some(&alice), None).await?;
    let friends = friends.as_array().unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0]["id"], carol_id.as_str());

    let (status, _) = app.call("GET", &post_uri, Some(&carol), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = app
        .call("GET", &format!("/users/{}", alice_id), Some(&carol), None)
        .await?;
    assert_eq!(profile["relationship"]["type"], "friends");
    assert_eq!(profile["follower_count"], 2);
    Ok(())
}

#[tokio::test]
async fn test_like_toggle_and_notifications() -> Result<()> {
    let app = TestApp::new()?;
    let (_, alice) = app.register("alice").await?;
    let (_, bob) = app.register("bob").await?;

    let (_, post) = app
        .call("POST", "/posts", Some(&alice), Some(json!({ "content": "hello @bob" })))
        .await?;
    let like_uri = format!("/posts/{}/like", post["id"].as_str().unwrap());

    let (status, body) = app.call("POST", &like_uri, Some(&bob), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["count"], 1);

    let (_, body) = app.call("POST", &like_uri, Some(&bob), None).await?;
    assert_eq!(body["active"], false);
    assert_eq!(body["count"], 0);

    // Alice hears about the like, bob about the mention
    let (_, body) = app.call("GET", "/notifications/unread-count", Some(&alice), None).await?;
    assert_eq!(body["count"], 1);
    let (_, notifications) = app.call("GET", "/notifications", Some(&bob), None).await?;
    assert_eq!(notifications[0]["kind"], "mention");

    // Liking your own post notifies nobody
    app.call("POST", &like_uri, Some(&alice), None).await?;
    let (_, body) = app.call("GET", "/notifications/unread-count", Some(&alice), None).await?;
    assert_eq!(body["count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_group_creator_cannot_be_removed() -> Result<()> {
    let app = TestApp::new()?;
    let (alice_id, alice) = app.register("alice").await?;
    let (bob_id, bob) = app.register("bob").await?;

    let (status, group) = app
        .call(
            "POST",
            "/groups",
            Some(&alice),
            Some(json!({ "name": "climbing", "member_ids": [bob_id] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["member_count"], 2);
    let group_id = group["id"].as_str().unwrap().to_string();

    // Bob is not an admin
    let (status, _) = app
        .call(
            "DELETE",
            &format!("/groups/{}/members/{}", group_id, alice_id),
            Some(&bob),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "DELETE",
            &format!("/groups/{}/members/{}", group_id, alice_id),
            Some(&alice),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "The group creator cannot be removed");

    let (status, _) = app
        .call("POST", &format!("/groups/{}/leave", group_id), Some(&alice), None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let messages_uri = format!("/groups/{}/messages", group_id);
    let (status, _) = app
        .call("POST", &messages_uri, Some(&bob), Some(json!({ "content": "see you saturday" })))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, groups) = app.call("GET", "/groups", Some(&alice), None).await?;
    assert_eq!(groups[0]["unread_count"], 1);

    let (_, messages) = app.call("GET", &messages_uri, Some(&alice), None).await?;
    assert_eq!(messages.as_array().unwrap().len(), 1);
    let (_, groups) = app.call("GET", "/groups", Some(&alice), None).await?;
    assert_eq!(groups[0]["unread_count"], 0);
    Ok(())
}

#[tokio::test]
async fn test_admin_ban_revokes_access() -> Result<()> {
    let app = TestApp::new()?;
    let (_, admin) = app.register("moderator").await?;
    let (bob_id, bob) = app.register("bob").await?;
    UserRepository::new(app.db.pool.clone()).promote_by_username("moderator")?;

    // Regular users can't moderate
    let (status, body) = app
        .call("POST", &format!("/admin/users/{}/ban", bob_id), Some(&bob), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let (status, _) = app
        .call("POST", &format!("/admin/users/{}/ban", bob_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("GET", "/auth/me", Some(&bob), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "bob", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Account is banned");

    let (status, _) = app
        .call("POST", &format!("/admin/users/{}/unban", bob_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "bob", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_blocked_users_cannot_message() -> Result<()> {
    let app = TestApp::new()?;
    let (alice_id, alice) = app.register("alice").await?;
    let (bob_id, bob) = app.register("bob").await?;

    let (status, _) = app
        .call(
            "POST",
            "/messages",
            Some(&bob),
            Some(json!({ "receiver_id": alice_id, "content": "hi alice" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, conversations) = app.call("GET", "/messages/conversations", Some(&alice), None).await?;
    assert_eq!(conversations[0]["unread_count"], 1);
    assert_eq!(conversations[0]["last_message"], "hi alice");

    let (status, _) = app
        .call("POST", &format!("/users/{}/block", bob_id), Some(&alice), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "POST",
            "/messages",
            Some(&bob),
            Some(json!({ "receiver_id": alice_id, "content": "hello?" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("POST", &format!("/users/{}/follow", alice_id), Some(&bob), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn test_block_hides_content_and_silences_notifications() -> Result<()> {
    let app = TestApp::new()?;
    let (_, alice) = app.register("alice").await?;
    let (bob_id, bob) = app.register("bob").await?;

    let (_, post) = app
        .call("POST", "/posts", Some(&alice), Some(json!({ "content": "public post" })))
        .await?;
    let post_uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let (status, _) = app
        .call("POST", &format!("/users/{}/block", bob_id), Some(&alice), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("GET", &post_uri, Some(&bob), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .call("POST", &format!("{}/like", post_uri), Some(&bob), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .call(
            "POST",
            &format!("{}/comments", post_uri),
            Some(&bob),
            Some(json!({ "content": "still here" })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Mentions across the block go nowhere either
    app.call("POST", "/posts", Some(&bob), Some(json!({ "content": "hey @alice" })))
        .await?;

    let (_, body) = app.call("GET", "/notifications/unread-count", Some(&alice), None).await?;
    assert_eq!(body["count"], 0);

    // Anonymous viewers still see the public post
    let (status, _) = app.call("GET", &post_uri, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_rejected_profile_update_changes_nothing() -> Result<()> {
    let app = TestApp::new()?;
    let (_, alice) = app.register("alice").await?;
    app.register("bob").await?;

    let (status, _) = app
        .call(
            "PUT",
            "/users/me",
            Some(&alice),
            Some(json!({ "username": "renamed", "bio": "x".repeat(400) })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "PUT",
            "/users/me",
            Some(&alice),
            Some(json!({ "username": "BOB", "bio": "taken name" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, me) = app.call("GET", "/auth/me", Some(&alice), None).await?;
    assert_eq!(me["username"], "alice");

    let (status, profile) = app
        .call(
            "PUT",
            "/users/me",
            Some(&alice),
            Some(json!({ "username": "renamed", "bio": "short bio" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "renamed");
    assert_eq!(profile["bio"], "short bio");
    Ok(())
}

#[tokio::test]
async fn test_group_creation_skips_blocked_members() -> Result<()> {
    let app = TestApp::new()?;
    let (alice_id, alice) = app.register("alice").await?;
    let (bob_id, bob) = app.register("bob").await?;
    let (carol_id, carol) = app.register("carol").await?;

    let (status, _) = app
        .call("POST", &format!("/users/{}/block", alice_id), Some(&bob), None)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, group) = app
        .call(
            "POST",
            "/groups",
            Some(&alice),
            Some(json!({ "name": "book club", "member_ids": [bob_id, carol_id] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["member_count"], 2);

    let (_, groups) = app.call("GET", "/groups", Some(&bob), None).await?;
    assert!(groups.as_array().unwrap().is_empty());
    let (_, body) = app.call("GET", "/notifications/unread-count", Some(&bob), None).await?;
    assert_eq!(body["count"], 0);

    let (_, groups) = app.call("GET", "/groups", Some(&carol), None).await?;
    assert_eq!(groups.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_shared_across_sessions() -> Result<()> {
    let mut settings = Settings::defaults()?;
    settings.rate_limit.max_requests = 3;
    let app = TestApp::with_settings(settings)?;
    let (_, first) = app.register("alice").await?;

    let (status, body) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let second = body["session_token"].as_str().unwrap().to_string();

    for token in [&first, &second, &first] {
        let (status, _) = app.call("GET", "/auth/me", Some(token), None).await?;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.call("GET", "/auth/me", Some(&second), None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    // Another account has its own budget
    let (_, bob) = app.register("bob").await?;
    let (status, _) = app.call("GET", "/auth/me", Some(&bob), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
