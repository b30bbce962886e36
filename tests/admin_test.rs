//! Integration tests for admin user management and role enforcement.

mod common;

use common::{data, TestHarness};

#[tokio::test]
async fn non_admin_rejected_from_admin_routes() {
    let (h, addr) = TestHarness::with_server_config(TestHarness::auth_config()).await;
    let (user_id, _) = h.create_user("regular", "password");
    let token = h.auth_token(user_id);

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/api/admin/users"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn admin_manages_users() {
    let (h, addr) = TestHarness::with_server_config(TestHarness::auth_config()).await;
    let (admin_id, admin_id_str) = h.create_admin_user("admin", "password");
    let token = h.auth_token(admin_id);
    let client = reqwest::Client::new();

    let created = client
        .post(format!("http://{addr}/api/admin/users"))
        .bearer_auth(&token)
        .json(&serde_json::json!({"username": "erin", "password": "secret123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created = data(created).await;
    assert_eq!(created["role"], "user");
    let erin = created["id"].as_str().unwrap().to_string();

    let promoted = client
        .put(format!("http://{addr}/api/admin/users/{erin}"))
        .bearer_auth(&token)
        .json(&serde_json::json!({"role": "admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(promoted.status(), 200);
    assert_eq!(data(promoted).await["role"], "admin");

    let bad_role = client
        .put(format!("http://{addr}/api/admin/users/{erin}"))
        .bearer_auth(&token)
        .json(&serde_json::json!({"role": "root"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_role.status(), 400);

    let listed = client
        .get(format!("http://{addr}/api/admin/users"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let names: Vec<String> = data(listed)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"erin".to_string()));
    assert!(names.contains(&"anonymous".to_string()));

    let self_delete = client
        .delete(format!("http://{addr}/api/admin/users/{admin_id_str}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(self_delete.status(), 400);

    let deleted = client
        .delete(format!("http://{addr}/api/admin/users/{erin}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
}

#[tokio::test]
async fn password_reset_revokes_sessions() {
    let (h, addr) = TestHarness::with_server_config(TestHarness::auth_config()).await;
    let (admin_id, _) = h.create_admin_user("admin", "password");
    let (user_id, user_id_str) = h.create_user("frank", "password");
    let admin = h.auth_token(admin_id);
    let session = h.auth_token(user_id);
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("http://{addr}/api/admin/users/{user_id_str}"))
        .bearer_auth(&admin)
        .json(&serde_json::json!({"password": "brand new password"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let me = client
        .get(format!("http://{addr}/api/users/me"))
        .bearer_auth(&session)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 401);
}
