//! Organization-scoped user administration.

mod common;

use common::{
    expect_json, TestApp, TestUser, DEFAULT_ORGANIZATION, PROJECT_MANAGER_ROLE, TEST_PASSWORD,
};
use serde_json::{json, Value};

/// A non-admin holding every `users.*` permission.
async fn user_manager(app: &TestApp, admin: &TestUser, organization_id: i32) -> TestUser {
    let catalog = expect_json(app.get("/permissions", &admin.token).await, 200).await;
    let grants: Vec<Value> = catalog
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["name"].as_str().unwrap().starts_with("users."))
        .map(|p| p["id"].clone())
        .collect();

    let response = app
        .post(
            "/roles",
            &admin.token,
            json!({ "name": TestApp::unique_name("usermgr"), "permission_ids": grants }),
        )
        .await;
    let role = expect_json(response, 201).await;
    let role_id = role["id"].as_i64().unwrap() as i32;

    app.user_with_role("manager", role_id, Some(organization_id))
        .await
}

fn new_user(prefix: &str) -> Value {
    let username = TestApp::unique_name(prefix);
    json!({
        "username": username,
        "email": format!("{}@example.com", username),
        "password": TEST_PASSWORD,
    })
}

#[tokio::test]
async fn admin_sees_every_user_members_see_their_organization() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let acme = app.create_organization("acme");
    let member = app.member(acme).await;
    let _ = app.member(acme).await;
    let _ = app.member(DEFAULT_ORGANIZATION).await;

    let response = app.get("/admin/users", &admin.token).await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["pagination"]["total_count"], 4);

    let response = app.get("/admin/users", &member.token).await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["pagination"]["total_count"], 2);
    for user in body["data"].as_array().unwrap() {
        assert_eq!(user["organization_id"], acme);
    }
}

#[tokio::test]
async fn listing_users_requires_permission() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let response = app
        .post("/roles", &admin.token, json!({ "name": "nothing" }))
        .await;
    let role = expect_json(response, 201).await;
    let nobody = app
        .user_with_role(
            "nobody",
            role["id"].as_i64().unwrap() as i32,
            Some(DEFAULT_ORGANIZATION),
        )
        .await;

    let response = app.get("/admin/users", &nobody.token).await;
    assert_status!(response, 403);
}

#[tokio::test]
async fn admin_creates_user_with_role_and_organization() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let acme = app.create_organization("acme");

    let mut payload = new_user("hired");
    payload["role_id"] = json!(PROJECT_MANAGER_ROLE);
    payload["organization_id"] = json!(acme);
    payload["is_active"] = json!(true);

    let response = app.post("/admin/users", &admin.token, payload.clone()).await;
    let body = expect_json(response, 201).await;
    assert_eq!(body["role_name"], "project_manager");
    assert_eq!(body["organization_id"], acme);

    let response = app
        .login(payload["username"].as_str().unwrap(), TEST_PASSWORD)
        .await;
    assert_status!(response, 200);

    let response = app.post("/admin/users", &admin.token, payload).await;
    assert_status!(response, 409);
}

#[tokio::test]
async fn admin_create_rejects_unknown_role_or_organization() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let mut payload = new_user("lost");
    payload["role_id"] = json!(999);
    let response = app.post("/admin/users", &admin.token, payload).await;
    assert_status!(response, 404);

    let mut payload = new_user("lost");
    payload["organization_id"] = json!(999);
    let response = app.post("/admin/users", &admin.token, payload).await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn non_admin_creates_users_in_own_organization_only() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let acme = app.create_organization("acme");
    let globex = app.create_organization("globex");
    let manager = user_manager(&app, &admin, acme).await;

    let response = app
        .post("/admin/users", &manager.token, new_user("staff"))
        .await;
    let body = expect_json(response, 201).await;
    assert_eq!(body["organization_id"], acme);
    assert_eq!(body["role_name"], "user");

    let mut payload = new_user("staff");
    payload["organization_id"] = json!(globex);
    let response = app.post("/admin/users", &manager.token, payload).await;
    assert_status!(response, 403);

    let mut payload = new_user("staff");
    payload["role_id"] = json!(PROJECT_MANAGER_ROLE);
    let response = app.post("/admin/users", &manager.token, payload).await;
    let body = expect_json(response, 403).await;
    assert_eq!(body["error"], "Admin access required");
}

#[tokio::test]
async fn users_outside_scope_look_missing() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let acme = app.create_organization("acme");
    let globex = app.create_organization("globex");
    let manager = user_manager(&app, &admin, acme).await;
    let outsider = app.member(globex).await;

    let path = format!("/admin/users/{}", outsider.id);
    let response = app
        .put(&path, &manager.token, json!({ "email": "moved@example.com" }))
        .await;
    let body = expect_json(response, 404).await;
    assert_eq!(body["error"], "User not found");

    let response = app.delete(&path, &manager.token).await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn privileged_changes_need_an_administrator() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let manager = user_manager(&app, &admin, DEFAULT_ORGANIZATION).await;
    let colleague = app.member(DEFAULT_ORGANIZATION).await;
    let path = format!("/admin/users/{}", colleague.id);

    let response = app
        .put(&path, &manager.token, json!({ "email": "colleague@example.com" }))
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["email"], "colleague@example.com");

    for change in [
        json!({ "role_id": PROJECT_MANAGER_ROLE }),
        json!({ "is_active": false }),
        json!({ "organization_id": DEFAULT_ORGANIZATION }),
    ] {
        let response = app.put(&path, &manager.token, change).await;
        assert_status!(response, 403);
    }

    let response = app
        .put(&path, &admin.token, json!({ "role_id": PROJECT_MANAGER_ROLE }))
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["role_name"], "project_manager");

    // The promoted user gains the role's permissions on the next request.
    let response = app
        .post("/projects", &colleague.token, json!({ "name": "Promoted" }))
        .await;
    assert_status!(response, 201);
}

#[tokio::test]
async fn users_cannot_delete_themselves() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app
        .delete(&format!("/admin/users/{}", admin.id), &admin.token)
        .await;
    let body = expect_json(response, 412).await;
    assert_eq!(body["error"], "Cannot delete your own account");
}

#[tokio::test]
async fn deleting_missing_user_returns_404() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app.delete("/admin/users/9999", &admin.token).await;
    assert_status!(response, 404);
}
