//! Roles, the permission catalog and permission resolution over HTTP.

mod common;

use std::collections::HashMap;

use common::{expect_json, TestApp, TestUser, ADMIN_ROLE, DEFAULT_ORGANIZATION, USER_ROLE};
use serde_json::{json, Value};

const CATALOG_SIZE: usize = 20;

async fn permission_ids(app: &TestApp, admin: &TestUser) -> HashMap<String, i64> {
    let response = app.get("/permissions", &admin.token).await;
    let body = expect_json(response, 200).await;
    body.as_array()
        .unwrap()
        .iter()
        .map(|p| (p["name"].as_str().unwrap().to_string(), p["id"].as_i64().unwrap()))
        .collect()
}

/// Creates a non-system role holding `names` and returns its id.
async fn create_role(app: &TestApp, admin: &TestUser, names: &[&str]) -> i32 {
    let ids = permission_ids(app, admin).await;
    let grants: Vec<i64> = names.iter().map(|n| ids[*n]).collect();
    let response = app
        .post(
            "/roles",
            &admin.token,
            json!({ "name": TestApp::unique_name("role"), "permission_ids": grants }),
        )
        .await;
    let body = expect_json(response, 201).await;
    body["id"].as_i64().unwrap() as i32
}

fn names(permissions: &Value) -> Vec<String> {
    permissions
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().or_else(|| p["name"].as_str()).unwrap().to_string())
        .collect()
}

// ============================================================================
// Effective permissions
// ============================================================================

#[tokio::test]
async fn default_role_holds_read_permissions_only() {
    let app = TestApp::spawn().await;
    let user = app.register_user("reader").await;

    let response = app.get("/users/me/permissions", &user.token).await;
    let body = expect_json(response, 200).await;

    assert_eq!(body["role"], "user");
    assert_eq!(body["is_system_role"], false);
    assert_eq!(body["is_admin"], false);
    assert_eq!(names(&body["permissions"]), vec!["projects.read", "users.read"]);
}

#[tokio::test]
async fn system_role_lists_whole_catalog() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app.get("/users/me/permissions", &admin.token).await;
    let body = expect_json(response, 200).await;

    assert_eq!(body["role"], "admin");
    assert_eq!(body["is_system_role"], true);
    assert_eq!(body["is_admin"], true);
    assert_eq!(body["permissions"].as_array().unwrap().len(), CATALOG_SIZE);
}

#[tokio::test]
async fn system_admin_grant_makes_non_system_role_an_admin() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let role_id = create_role(&app, &admin, &["system.admin"]).await;
    let auditor = app
        .user_with_role("auditor", role_id, Some(DEFAULT_ORGANIZATION))
        .await;

    let response = app.get("/users/me/permissions", &auditor.token).await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["is_system_role"], false);
    assert_eq!(body["is_admin"], true);
    assert_eq!(names(&body["permissions"]), vec!["system.admin"]);

    // Admin-only routes open up, named permissions stay explicit.
    let response = app.get("/organizations", &auditor.token).await;
    assert_status!(response, 200);
    let response = app.get("/roles", &auditor.token).await;
    assert_status!(response, 403);
}

#[tokio::test]
async fn grant_changes_apply_to_existing_tokens() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let role_id = create_role(&app, &admin, &["projects.read"]).await;
    let user = app
        .user_with_role("builder", role_id, Some(DEFAULT_ORGANIZATION))
        .await;

    let response = app
        .post("/projects", &user.token, json!({ "name": "Before" }))
        .await;
    assert_status!(response, 403);

    let ids = permission_ids(&app, &admin).await;
    let response = app
        .put(
            &format!("/roles/{}", role_id),
            &admin.token,
            json!({ "permission_ids": [ids["projects.read"], ids["projects.create"]] }),
        )
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(
        names(&body["permissions"]),
        vec!["projects.create", "projects.read"]
    );

    let response = app
        .post("/projects", &user.token, json!({ "name": "After" }))
        .await;
    assert_status!(response, 201);
}

// ============================================================================
// Catalog and roles
// ============================================================================

#[tokio::test]
async fn permission_catalog_is_sorted_and_guarded() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let user = app.register_user("nosy").await;

    let response = app.get("/permissions", &admin.token).await;
    let body = expect_json(response, 200).await;
    let listed = names(&body);
    let mut sorted = listed.clone();
    sorted.sort();
    assert_eq!(listed.len(), CATALOG_SIZE);
    assert_eq!(listed, sorted);

    let response = app.get("/permissions", &user.token).await;
    assert_status!(response, 403);
}

#[tokio::test]
async fn list_roles_shows_seeded_roles() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app.get("/roles", &admin.token).await;
    let body = expect_json(response, 200).await;
    let roles = body.as_array().unwrap();

    let role_names: Vec<&str> = roles.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(role_names, vec!["user", "admin", "project_manager"]);

    let admin_role = &roles[1];
    assert_eq!(admin_role["id"], ADMIN_ROLE);
    assert_eq!(admin_role["is_system"], true);
    assert_eq!(admin_role["permissions"].as_array().unwrap().len(), CATALOG_SIZE);
}

#[tokio::test]
async fn create_role_skips_unknown_permission_ids() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let ids = permission_ids(&app, &admin).await;

    let response = app
        .post(
            "/roles",
            &admin.token,
            json!({
                "name": "reporter",
                "permission_ids": [ids["reports.view"], 9999]
            }),
        )
        .await;
    let body = expect_json(response, 201).await;

    assert_eq!(body["is_system"], false);
    assert_eq!(names(&body["permissions"]), vec!["reports.view"]);
}

#[tokio::test]
async fn create_role_rejects_duplicate_name() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app
        .post("/roles", &admin.token, json!({ "name": "project_manager" }))
        .await;
    assert_status!(response, 409);
}

#[tokio::test]
async fn system_roles_need_an_administrator() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let role_id = create_role(&app, &admin, &["roles.create", "roles.read"]).await;
    let manager = app
        .user_with_role("rolemgr", role_id, Some(DEFAULT_ORGANIZATION))
        .await;

    let response = app
        .post(
            "/roles",
            &manager.token,
            json!({ "name": "superuser", "is_system": true }),
        )
        .await;
    let body = expect_json(response, 403).await;
    assert_eq!(body["error"], "Admin access required");

    let response = app
        .post("/roles", &manager.token, json!({ "name": "helper" }))
        .await;
    assert_status!(response, 201);
}

#[tokio::test]
async fn system_role_cannot_be_modified_or_deleted() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app
        .put(
            &format!("/roles/{}", ADMIN_ROLE),
            &admin.token,
            json!({ "name": "root" }),
        )
        .await;
    let body = expect_json(response, 412).await;
    assert_eq!(body["code"], "PRECONDITION_FAILED");

    let response = app
        .delete(&format!("/roles/{}", ADMIN_ROLE), &admin.token)
        .await;
    assert_status!(response, 412);
}

#[tokio::test]
async fn role_editors_cannot_hand_out_admin_authority() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let ids = permission_ids(&app, &admin).await;
    let editor_role = create_role(&app, &admin, &["roles.create", "roles.read", "roles.update"]).await;
    let editor = app
        .user_with_role("editor", editor_role, Some(DEFAULT_ORGANIZATION))
        .await;
    let other_role = create_role(&app, &admin, &["reports.view"]).await;
    let system_admin = ids["system.admin"];

    // Own role is off limits, whatever the change.
    let response = app
        .put(
            &format!("/roles/{}", editor_role),
            &editor.token,
            json!({ "permission_ids": [ids["roles.update"], system_admin] }),
        )
        .await;
    let body = expect_json(response, 403).await;
    assert_eq!(body["error"], "Cannot modify your own role");

    let response = app
        .put(
            &format!("/roles/{}", other_role),
            &editor.token,
            json!({ "permission_ids": [system_admin] }),
        )
        .await;
    let body = expect_json(response, 403).await;
    assert_eq!(body["error"], "Admin access required");

    let response = app
        .post(
            "/roles",
            &editor.token,
            json!({ "name": "backdoor", "permission_ids": [system_admin] }),
        )
        .await;
    assert_status!(response, 403);

    // Ordinary grants are still delegated.
    let response = app
        .put(
            &format!("/roles/{}", other_role),
            &editor.token,
            json!({ "permission_ids": [ids["reports.export"]] }),
        )
        .await;
    assert_status!(response, 200);

    let response = app.get("/organizations", &editor.token).await;
    assert_status!(response, 403);

    let response = app
        .put(
            &format!("/roles/{}", other_role),
            &admin.token,
            json!({ "permission_ids": [system_admin] }),
        )
        .await;
    assert_status!(response, 200);
}

#[tokio::test]
async fn default_role_cannot_be_renamed_or_deleted() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let ids = permission_ids(&app, &admin).await;
    let path = format!("/roles/{}", USER_ROLE);

    let response = app
        .put(&path, &admin.token, json!({ "name": "member" }))
        .await;
    let body = expect_json(response, 412).await;
    assert_eq!(body["error"], "The default role cannot be renamed");

    // Nobody holds it yet, so only the default-role guard applies.
    let response = app.delete(&path, &admin.token).await;
    let body = expect_json(response, 412).await;
    assert_eq!(body["error"], "The default role cannot be deleted");

    let response = app
        .put(
            &path,
            &admin.token,
            json!({ "name": "user", "permission_ids": [ids["projects.read"]] }),
        )
        .await;
    assert_status!(response, 200);

    let username = TestApp::unique_name("newcomer");
    let response = app
        .register(&username, common::TEST_PASSWORD, None)
        .await;
    let body = expect_json(response, 201).await;
    assert_eq!(body["user"]["role_name"], "user");
}

#[tokio::test]
async fn role_in_use_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let _ = app.register_user("holder").await;

    let response = app
        .delete(&format!("/roles/{}", USER_ROLE), &admin.token)
        .await;
    assert_status!(response, 412);

    let unused = create_role(&app, &admin, &["reports.view"]).await;
    let response = app
        .delete(&format!("/roles/{}", unused), &admin.token)
        .await;
    assert_status!(response, 200);

    let response = app
        .delete(&format!("/roles/{}", unused), &admin.token)
        .await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn role_management_requires_permissions() {
    let app = TestApp::spawn().await;
    let user = app.register_user("plain").await;

    let response = app.get("/roles", &user.token).await;
    assert_status!(response, 403);
    let response = app
        .post("/roles", &user.token, json!({ "name": "mine" }))
        .await;
    assert_status!(response, 403);
    let response = app
        .delete(&format!("/roles/{}", USER_ROLE), &user.token)
        .await;
    assert_status!(response, 403);
}

// ============================================================================
// Decision diagnostics
// ============================================================================

#[tokio::test]
async fn check_permission_reports_decision_path() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let user = app.register_user("subject").await;

    let response = app
        .post(
            "/permissions/check",
            &admin.token,
            json!({ "user_id": user.id, "permission": "projects.read" }),
        )
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["granted"], true);
    assert_eq!(body["reason"], "granted_by_role");
    assert_eq!(body["is_admin"], false);

    let response = app
        .post(
            "/permissions/check",
            &admin.token,
            json!({ "user_id": user.id, "permission": "projects.delete" }),
        )
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["granted"], false);
    assert_eq!(body["reason"], "not_granted");

    // A system role grants even names outside the catalog.
    let response = app
        .post(
            "/permissions/check",
            &admin.token,
            json!({ "user_id": admin.id, "permission": "billing.refund" }),
        )
        .await;
    let body = expect_json(response, 200).await;
    assert_eq!(body["granted"], true);
    assert_eq!(body["reason"], "system_role");
}

#[tokio::test]
async fn check_permission_is_admin_only() {
    let app = TestApp::spawn().await;
    let user = app.register_user("curious").await;

    let response = app
        .post(
            "/permissions/check",
            &user.token,
            json!({ "user_id": user.id, "permission": "projects.read" }),
        )
        .await;
    let body = expect_json(response, 403).await;
    assert_eq!(body["error"], "Admin access required");
}

#[tokio::test]
async fn check_permission_for_missing_user_returns_404() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let response = app
        .post(
            "/permissions/check",
            &admin.token,
            json!({ "user_id": 4242, "permission": "projects.read" }),
        )
        .await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn bulk_check_lists_denials() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let user = app.register_user("bulk").await;

    let response = app
        .post(
            "/permissions/check-bulk",
            &admin.token,
            json!({
                "user_id": user.id,
                "permissions": ["projects.read", "users.read", "users.delete"]
            }),
        )
        .await;
    let body = expect_json(response, 200).await;

    assert_eq!(body["all_granted"], false);
    assert_eq!(body["denied"], json!(["users.delete"]));
    assert_eq!(body["results"].as_array().unwrap().len(), 3);

    let response = app
        .post(
            "/permissions/check-bulk",
            &admin.token,
            json!({ "user_id": user.id, "permissions": [] }),
        )
        .await;
    assert_status!(response, 400);
}
