use actix_web::{http::StatusCode, test::TestRequest};
use fest_registration_engine::db_types::UserId;
use serde_json::{json, Value};

use super::helpers::*;

#[actix_web::test]
async fn health_check() {
    let server = TestServer::new().await;
    let (status, body) = server.call(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    server.tear_down().await;
}

#[actix_web::test]
async fn sports_are_public() {
    let server = TestServer::new().await;
    let cricket = server.add_sport("cricket", 11, 500).await;
    server.add_sport("chess", 32, 100).await;
    let (status, body) = server.call(TestRequest::get().uri("/sports")).await;
    assert_eq!(status, StatusCode::OK);
    let sports: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(sports.len(), 2);

    let (status, body) = server.call(TestRequest::get().uri(&format!("/sports/{}", cricket.id))).await;
    assert_eq!(status, StatusCode::OK);
    let sport: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(sport["slug"], "cricket");
    assert_eq!(sport["max_slots"], 11);
    assert_eq!(sport["filled_slots"], 0);
    assert_eq!(sport["fee"], 50_000);

    let (status, _) = server.call(TestRequest::get().uri("/sports/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    server.tear_down().await;
}

#[actix_web::test]
async fn registering_requires_a_token() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let req = TestRequest::post().uri("/api/registrations").set_json(json!({ "sport_id": sport.id }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("error"), "was: {body}");

    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer("not.a.token"))
        .set_json(json!({ "sport_id": sport.id }));
    let (status, _) = server.call(req).await;
    assert!(status.is_client_error());

    let forged = {
        let mut token = user_token("alice");
        token.push('x');
        token
    };
    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&forged))
        .set_json(json!({ "sport_id": sport.id }));
    let (status, _) = server.call(req).await;
    assert!(status.is_client_error());
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 0);
    server.tear_down().await;
}

#[actix_web::test]
async fn register_without_a_gateway_defers_payment() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "sport_id": sport.id }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::CREATED, "was: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    let registration_id = response["registration"]["id"].as_i64().unwrap();
    assert_eq!(response["registration"]["status"], "PENDING");
    assert_eq!(response["registration"]["user_id"], "alice");
    assert_eq!(response["order"]["pay_later"], true);
    assert_eq!(response["order"]["order_id"], format!("pending_{registration_id}"));
    assert_eq!(response["order"]["amount"], 50_000);
    assert_eq!(response["order"]["currency"], "INR");
    assert_eq!(response["order"]["key_id"], Value::Null);
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 1);

    // Asking for the order again hands back the same placeholder
    let req = TestRequest::post()
        .uri("/api/payments/order")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "registration_id": registration_id }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let order: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(order["order_id"], format!("pending_{registration_id}"));
    server.tear_down().await;
}

#[actix_web::test]
async fn duplicate_and_full_registrations_conflict() {
    let server = TestServer::new().await;
    let sport = server.add_sport("chess", 1, 100).await;
    let register = |user: &str| {
        TestRequest::post()
            .uri("/api/registrations")
            .insert_header(bearer(&user_token(user)))
            .set_json(json!({ "sport_id": sport.id, "pay_later": true }))
    };
    let (status, _) = server.call(register("alice")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = server.call(register("alice")).await;
    assert_eq!(status, StatusCode::CONFLICT, "was: {body}");
    let (status, body) = server.call(register("bob")).await;
    assert_eq!(status, StatusCode::CONFLICT, "was: {body}");
    assert_eq!(server.reservation_api().sport(sport.id).await.unwrap().filled_slots, 1);
    server.tear_down().await;
}

#[actix_web::test]
async fn closed_sports_and_bad_teams_are_rejected() {
    let server = TestServer::new().await;
    let sport = server.add_sport("football", 8, 1000).await;
    server.admin_api().set_registration_open(sport.id, false, &UserId::from(ADMIN)).await.unwrap();
    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "sport_id": sport.id }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");

    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "sport_id": 4242 }));
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Team details are not accepted for an individual sport
    let chess = server.add_sport("chess", 8, 100).await;
    let req = TestRequest::post().uri("/api/registrations").insert_header(bearer(&user_token("alice"))).set_json(json!({
        "sport_id": chess.id,
        "team": { "team_name": "Knights", "members": [
            { "name": "Asha Rao", "email": "asha@college.edu", "phone": "9876543210" }
        ] }
    }));
    let (status, body) = server.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    assert_eq!(server.reservation_api().sport(chess.id).await.unwrap().filled_slots, 0);
    server.tear_down().await;
}

#[actix_web::test]
async fn users_only_see_their_own_registrations() {
    let server = TestServer::new().await;
    let sport = server.add_sport("cricket", 11, 500).await;
    let req = TestRequest::post()
        .uri("/api/registrations")
        .insert_header(bearer(&user_token("alice")))
        .set_json(json!({ "sport_id": sport.id }));
    let (_, body) = server.call(req).await;
    let response: Value = serde_json::from_str(&body).unwrap();
    let id = response["registration"]["id"].as_i64().unwrap();
    let path = format!("/api/registrations/{id}");

    let (status, body) =
        server.call(TestRequest::get().uri(&path).insert_header(bearer(&user_token("alice")))).await;
    assert_eq!(status, StatusCode::OK);
    let detail: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(detail["registration"]["id"], id);
    assert_eq!(detail["payment"]["status"], "PENDING");

    let (status, _) = server.call(TestRequest::get().uri(&path).insert_header(bearer(&user_token("bob")))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = server.call(TestRequest::get().uri(&path).insert_header(bearer(&admin_token()))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        server.call(TestRequest::get().uri("/api/registrations").insert_header(bearer(&user_token("bob")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    let (_, body) =
        server.call(TestRequest::get().uri("/api/registrations").insert_header(bearer(&user_token("alice")))).await;
    let mine: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(mine.len(), 1);

    // Someone else's registration cannot be paid for
    let req = TestRequest::post()
        .uri("/api/payments/order")
        .insert_header(bearer(&user_token("bob")))
        .set_json(json!({ "registration_id": id }));
    let (status, _) = server.call(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    server.tear_down().await;
}
