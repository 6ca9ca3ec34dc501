use actix_web::{http::StatusCode, test::TestRequest};
use fest_registration_engine::{
    db_types::{NewRegistration, RegistrationStatus},
    RegistrationDatabase,
};
use serde_json::{json, Value};

use super::helpers::*;

#[actix_web::test]
async fn admin_routes_need_the_admin_role() {
    let server = TestServer::new().await;
    let alice = user_token("alice");
    let requests = vec![
        TestRequest::get().uri("/api/admin/stats"),
        TestRequest::get().uri("/api/admin/audit"),
        TestRequest::get().uri("/api/admin/registrations"),
        TestRequest::delete().uri("/api/admin/registrations/1"),
        TestRequest::post().uri("/api/admin/sports").set_json(json!({
            "slug": "kabaddi", "name": "Kabaddi", "max_slots": 12, "fee": 20000
        })),
        TestRequest::post().uri("/api/admin/payments/manual").set_json(json!({
            "registration_id": 1, "amount": 20000, "method": "CASH"
        })),
    ];
    for req in requests {
        let (status, body) = server.call(req.insert_header(bearer(&alice))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "was: {body}");
    }
    let (status, _) = server.call(TestRequest::get().uri("/api/admin/stats")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(server.reservation_api().sports().await.unwrap().is_empty());
    server.tear_down().await;
}

#[actix_web::test]
async fn manage_sports() {
    let server = TestServer::new().await;
    let req = TestRequest::post().uri("/api/admin/sports").insert_header(bearer(&admin_token())).set_json(json!({
        "slug": "relay", "name": "4x100m Relay", "max_slots": 6, "fee": 40000, "min_team_size": 4, "max_team_size": 5
    }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::CREATED, "was: {body}");
    let sport: Value = serde_json::from_str(&body).unwrap();
    let id = sport["id"].as_i64().unwrap();
    assert_eq!(sport["registration_open"], true);
    assert_eq!(sport["filled_slots"], 0);

    let req = TestRequest::patch()
        .uri(&format!("/api/admin/sports/{id}/registration"))
        .insert_header(bearer(&admin_token()))
        .set_json(json!({ "open": false }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let sport: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(sport["registration_open"], false);

    let req = TestRequest::post().uri("/api/admin/sports").insert_header(bearer(&admin_token())).set_json(json!({
        "slug": "relay-b", "name": "Relay B", "max_slots": -1, "fee": 40000
    }));
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    server.tear_down().await;
}

#[actix_web::test]
async fn manual_payment_confirms_a_registration() {
    let server = TestServer::new().await;
    let sport = server.add_sport("chess", 4, 100).await;
    let registration = server.reservation_api().reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    let manual = json!({
        "registration_id": registration.id, "amount": 10000, "method": "CASH", "reference": "receipt #12"
    });
    let req =
        TestRequest::post().uri("/api/admin/payments/manual").insert_header(bearer(&admin_token())).set_json(&manual);
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let transition: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(transition["result"], "applied");
    assert_eq!(transition["payment"]["method"], "CASH");
    assert_eq!(transition["payment"]["confirmed_by"], ADMIN);
    assert_eq!(transition["registration"]["status"], "CONFIRMED");

    let req =
        TestRequest::post().uri("/api/admin/payments/manual").insert_header(bearer(&admin_token())).set_json(&manual);
    let (status, body) = server.call(req).await;
    assert!(status.is_client_error(), "was: {status} {body}");

    let gateway = json!({ "registration_id": registration.id, "amount": 10000, "method": "GATEWAY" });
    let req =
        TestRequest::post().uri("/api/admin/payments/manual").insert_header(bearer(&admin_token())).set_json(&gateway);
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 1);
    server.tear_down().await;
}

#[actix_web::test]
async fn cancel_search_stats_and_audit() {
    let server = TestServer::new().await;
    let sport = server.add_sport("chess", 4, 100).await;
    let api = server.reservation_api();
    let alice = api.reserve(NewRegistration::new("alice", sport.id)).await.unwrap();
    let bob = api.reserve(NewRegistration::new("bob", sport.id)).await.unwrap();
    assert_eq!(api.sport(sport.id).await.unwrap().filled_slots, 2);

    let (status, body) = server
        .call(TestRequest::get().uri("/api/admin/registrations?status=pending").insert_header(bearer(&admin_token())))
        .await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let found: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(found.len(), 2);
    let (status, _) = server
        .call(TestRequest::get().uri("/api/admin/registrations?status=sleeping").insert_header(bearer(&admin_token())))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!("/api/admin/registrations/{}", alice.id);
    let (status, body) = server.call(TestRequest::delete().uri(&path).insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let cancelled: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(cancelled["slot_released"], true);
    assert_eq!(cancelled["registration"]["id"], alice.id);
    assert_eq!(api.sport(sport.id).await.unwrap().filled_slots, 1);
    assert!(server.db.fetch_registration(alice.id).await.unwrap().is_none());
    let (status, _) = server.call(TestRequest::delete().uri(&path).insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
        server.call(TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let stats: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["confirmed"], 0);
    assert_eq!(stats["sports"][0]["filled_slots"], 1);

    let uri = format!("/api/admin/audit?entity_type=REGISTRATION&entity_id={}", alice.id);
    let (status, body) = server.call(TestRequest::get().uri(&uri).insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let entries: Vec<Value> = serde_json::from_str(&body).unwrap();
    let actions = entries.iter().map(|e| e["action"].as_str().unwrap()).collect::<Vec<_>>();
    assert!(actions.contains(&"REGISTRATION_CREATED"), "was: {actions:?}");
    assert!(actions.contains(&"REGISTRATION_CANCELLED"), "was: {actions:?}");
    assert_eq!(entries[0]["action"], "REGISTRATION_CANCELLED");

    let stored = server.db.fetch_registration(bob.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Pending);
    server.tear_down().await;
}
