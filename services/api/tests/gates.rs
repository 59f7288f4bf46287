#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use common::{body_json, request, TestApp, PASSWORD};
use serde_json::json;
use warga_core::memory::FailPoint;
use warga_core::{DatabaseService, ProfilePatch, Role};

fn seeded() -> TestApp {
    let app = TestApp::new();
    app.backend
        .seed_resident("admin@warga.id", PASSWORD, "Siti Admin", Role::Admin);
    app.backend
        .seed_resident("budi@warga.id", PASSWORD, "Budi Warga", Role::User);
    app
}

#[tokio::test]
async fn anonymous_callers_are_sent_to_login() {
    let app = seeded();
    for uri in ["/me/profile", "/me/invoices", "/admin/stats", "/admin/invoices"] {
        let response = app.send(request("GET", uri, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body_json(response).await, json!({ "redirect": "/login" }), "{uri}");
    }
}

#[tokio::test]
async fn residents_reach_their_area_but_not_the_admin_area() {
    let app = seeded();
    let cookie = app.login("budi@warga.id").await;

    let response = app.send(request("GET", "/me/profile", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["full_name"], "Budi Warga");

    let response = app.send(request("GET", "/admin/stats", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({ "redirect": "/not-authorized" }));
}

#[tokio::test]
async fn admins_pass_both_gates() {
    let app = seeded();
    let cookie = app.login("admin@warga.id").await;

    let response = app.send(request("GET", "/admin/stats", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total_citizens"], 2);

    let response = app.send(request("GET", "/me/profile", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn demotion_takes_effect_on_the_next_request() {
    let app = seeded();
    let cookie = app.login("admin@warga.id").await;
    let admin_id = app.backend.db.list_profiles().await.unwrap()
        .into_iter()
        .find(|p| p.role == Role::Admin)
        .unwrap()
        .id;

    let patch = ProfilePatch {
        role: Some(Role::User),
        ..Default::default()
    };
    app.backend.db.update_profile(admin_id, &patch).await.unwrap();

    let response = app.send(request("GET", "/admin/residents", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_role_lookup_fails_closed_with_the_error() {
    let app = seeded();
    let cookie = app.login("admin@warga.id").await;
    // One failure for each gate the request passes through.
    app.backend.db.fail(FailPoint::GetProfile, 2);

    let response = app.send(request("GET", "/admin/stats", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["redirect"], "/not-authorized");
    assert!(body["error"].as_str().unwrap().contains("GetProfile"));
}

#[tokio::test]
async fn login_lands_by_role() {
    let app = seeded();
    for (email, role, landing) in [
        ("admin@warga.id", "admin", "/admin"),
        ("budi@warga.id", "user", "/dashboard"),
    ] {
        let response = app
            .send(common::json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["role"], role);
        assert_eq!(body["redirect"], landing);
    }
}

#[tokio::test]
async fn wrong_password_is_rejected_with_a_readable_message() {
    let app = seeded();
    let response = app
        .send(common::json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "budi@warga.id", "password": "salah-sekali" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], "Email atau password salah.".as_bytes());
}

#[tokio::test]
async fn route_resolution_mirrors_the_gates() {
    let app = seeded();
    let resident = app.login("budi@warga.id").await;
    let admin = app.login("admin@warga.id").await;

    let cases = [
        ("/admin/ipl", None, "redirect_login"),
        ("/admin/ipl", Some(resident.as_str()), "redirect_not_authorized"),
        ("/admin/ipl", Some(admin.as_str()), "allow"),
        ("/dashboard", Some(resident.as_str()), "allow"),
        ("/layanan", None, "allow"),
    ];
    for (path, cookie, decision) in cases {
        let uri = format!("/routes/resolve?path={path}");
        let response = app.send(request("GET", &uri, cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["decision"], decision, "{path} {cookie:?}");
    }

    let response = app.send(request("GET", "/routes/resolve?path=/nowhere", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = seeded();
    let cookie = app.login("budi@warga.id").await;

    let response = app.send(request("POST", "/auth/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response.headers()["set-cookie"].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = app.send(request("GET", "/me/profile", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(request("GET", "/auth/session", Some(&cookie))).await;
    assert_eq!(body_json(response).await["authenticated"], false);
}
