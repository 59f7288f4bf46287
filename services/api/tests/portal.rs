#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use common::{body_json, json_request, multipart_request, request, TestApp, PASSWORD};
use serde_json::json;
use warga_core::Role;

fn registration(nik: &str) -> serde_json::Value {
    json!({
        "full_name": "Rina Warga",
        "house_number": "C-07",
        "nik": nik,
        "phone": "081200000000",
        "email": "rina@warga.id",
        "password": PASSWORD,
        "confirm_password": PASSWORD,
    })
}

#[tokio::test]
async fn short_nik_is_rejected_before_an_account_exists() {
    let app = TestApp::new();
    let response = app
        .send(json_request("POST", "/auth/register", None, registration("32010")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], "NIK harus 16 digit angka".as_bytes());
    assert!(!app.backend.identity.has_account("rina@warga.id"));
}

#[tokio::test]
async fn registered_resident_can_log_in() {
    let app = TestApp::new();
    let response = app
        .send(json_request("POST", "/auth/register", None, registration("3201123412341234")))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = app.login("rina@warga.id").await;
    let response = app.send(request("GET", "/me/profile", Some(&cookie))).await;
    let profile = body_json(response).await;
    assert_eq!(profile["house_number"], "C-07");
    assert_eq!(profile["role"], "user");
}

#[tokio::test]
async fn forgot_password_points_back_to_the_site() {
    let app = TestApp::new();
    let response = app
        .send(json_request(
            "POST",
            "/auth/forgot-password",
            None,
            json!({ "email": "rina@warga.id" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.backend.identity.reset_requests(),
        vec![(
            "rina@warga.id".to_string(),
            "http://localhost:5173/update-password".to_string()
        )]
    );
}

#[tokio::test]
async fn monthly_invoices_are_generated_once_and_toggled() {
    let app = TestApp::new();
    app.backend.seed_resident("admin@warga.id", PASSWORD, "Siti", Role::Admin);
    app.backend.seed_resident("budi@warga.id", PASSWORD, "Budi", Role::User);
    let admin = app.login("admin@warga.id").await;
    let budi = app.login("budi@warga.id").await;

    let create = json!({ "month": 8, "year": 2025, "amount": 150000 });
    let response = app
        .send(json_request("POST", "/admin/invoices", Some(&admin), create.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let batch = body_json(response).await;
    assert_eq!(batch["created"].as_array().unwrap().len(), 2);

    // A second run for the same month bills nobody twice.
    let response = app
        .send(json_request("POST", "/admin/invoices", Some(&admin), create))
        .await;
    let batch = body_json(response).await;
    assert!(batch["created"].as_array().unwrap().is_empty());
    assert_eq!(batch["skipped"].as_array().unwrap().len(), 2);

    let response = app.send(request("GET", "/me/invoices", Some(&budi))).await;
    let own = body_json(response).await;
    assert_eq!(own.as_array().unwrap().len(), 1);
    assert_eq!(own[0]["status"], "belum_bayar");
    let invoice_id = own[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/admin/invoices/{invoice_id}/status");
    let response = app
        .send(json_request("PATCH", &uri, Some(&admin), json!({ "status": "lunas" })))
        .await;
    let paid = body_json(response).await;
    assert_eq!(paid["status"], "lunas");
    assert!(paid["paid_date"].is_string());

    let response = app
        .send(json_request("PATCH", &uri, Some(&admin), json!({ "status": "belum_bayar" })))
        .await;
    assert!(body_json(response).await["paid_date"].is_null());

    let response = app
        .send(request("GET", "/admin/invoices?month=8", Some(&admin)))
        .await;
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert!(listed[0]["resident"]["full_name"].is_string());
}

#[tokio::test]
async fn invalid_invoice_month_is_a_bad_request() {
    let app = TestApp::new();
    app.backend.seed_resident("admin@warga.id", PASSWORD, "Siti", Role::Admin);
    let admin = app.login("admin@warga.id").await;
    let response = app
        .send(json_request(
            "POST",
            "/admin/invoices",
            Some(&admin),
            json!({ "month": 13, "year": 2025, "amount": 150000 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.backend.db.invoice_count(), 0);
}

#[tokio::test]
async fn guest_service_request_waits_for_an_admin() {
    let app = TestApp::new();
    app.backend.seed_resident("admin@warga.id", PASSWORD, "Siti", Role::Admin);

    let response = app
        .send(multipart_request(
            "/layanan",
            None,
            &[
                ("category", "pengaduan"),
                ("title", "Lampu jalan mati"),
                ("description", "Lampu di depan blok C mati sejak kemarin"),
                ("lokasi_kejadian", "Blok C"),
            ],
            &[("attachment", "foto.JPG", b"jpeg-bytes")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let filed = body_json(response).await;
    assert_eq!(filed["status"], "menunggu");
    assert!(filed["attachment_url"].as_str().unwrap().ends_with(".jpg"));

    let admin = app.login("admin@warga.id").await;
    let response = app
        .send(request("GET", "/admin/services?status=menunggu", Some(&admin)))
        .await;
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["email"], "guest");
    assert_eq!(listed[0]["form_data"]["lokasi_kejadian"], "Blok C");

    let id = listed[0]["id"].as_str().unwrap();
    let response = app
        .send(json_request(
            "PATCH",
            &format!("/admin/services/{id}"),
            Some(&admin),
            json!({ "status": "diproses", "admin_response": "Sudah dilaporkan ke PLN" }),
        ))
        .await;
    let updated = body_json(response).await;
    assert_eq!(updated["status"], "diproses");
    assert_eq!(updated["admin_response"], "Sudah dilaporkan ke PLN");

    let response = app
        .send(request("GET", "/admin/notifications", Some(&admin)))
        .await;
    let notifications = body_json(response).await;
    assert_eq!(notifications[0]["kind"], "layanan_new");
}

#[tokio::test]
async fn unknown_service_category_is_a_bad_request() {
    let app = TestApp::new();
    let response = app
        .send(multipart_request(
            "/layanan",
            None,
            &[("category", "lainnya"), ("title", "x")],
            &[],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_publishes_an_activity_with_images() {
    let app = TestApp::new();
    app.backend.seed_resident("admin@warga.id", PASSWORD, "Siti", Role::Admin);
    let admin = app.login("admin@warga.id").await;

    let response = app
        .send(multipart_request(
            "/admin/activities",
            Some(&admin),
            &[
                ("title", "Kerja bakti"),
                ("description", "Membersihkan selokan"),
                ("date", "2025-08-17T07:00"),
                ("location", "Balai warga"),
            ],
            &[("images", "a.png", b"png"), ("images", "b.png", b"png")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["images"].as_array().unwrap().len(), 2);

    let response = app.send(request("GET", "/kegiatan", None)).await;
    let public = body_json(response).await;
    assert_eq!(public[0]["title"], "Kerja bakti");

    let id = created["id"].as_str().unwrap();
    let response = app
        .send(request("DELETE", &format!("/admin/activities/{id}"), Some(&admin)))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.send(request("GET", &format!("/kegiatan/{id}"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_cannot_change_their_own_role() {
    let app = TestApp::new();
    let admin_profile = app
        .backend
        .seed_resident("admin@warga.id", PASSWORD, "Siti", Role::Admin);
    let budi = app
        .backend
        .seed_resident("budi@warga.id", PASSWORD, "Budi", Role::User);
    let admin = app.login("admin@warga.id").await;

    let response = app
        .send(json_request(
            "PUT",
            &format!("/admin/residents/{}/role", admin_profile.id),
            Some(&admin),
            json!({ "role": "user" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(json_request(
            "PUT",
            &format!("/admin/residents/{}/role", budi.id),
            Some(&admin),
            json!({ "role": "admin" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "admin");
}

#[tokio::test]
async fn residents_are_listed_by_name() {
    let app = TestApp::new();
    app.backend.seed_resident("budi@warga.id", PASSWORD, "Budi", Role::User);
    app.backend.seed_resident("siti@warga.id", PASSWORD, "Siti", Role::Admin);
    app.backend.seed_resident("ani@warga.id", PASSWORD, "Ani", Role::User);
    let admin = app.login("siti@warga.id").await;

    let response = app.send(request("GET", "/admin/residents", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let names: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["full_name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Ani", "Budi", "Siti"]);
}
