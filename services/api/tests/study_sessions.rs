mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use flashcard_lms_core::domain::Role;
use serde_json::{json, Value};

async fn deck_with_cards(app: &TestApp, teacher: &str, privacy: &str, cards: usize) -> (String, Vec<String>) {
    let (status, deck) = app
        .post("/decks", Some(teacher), json!({ "title": "Capitals", "privacy_level": privacy }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{deck}");
    let deck_id = deck["id"].as_str().unwrap().to_string();

    let mut card_ids = Vec::new();
    for i in 0..cards {
        let (status, card) = app
            .post(
                &format!("/decks/{}/cards", deck_id),
                Some(teacher),
                json!({ "question": format!("q{}", i), "answer": format!("a{}", i) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{card}");
        card_ids.push(card["id"].as_str().unwrap().to_string());
    }
    (deck_id, card_ids)
}

async fn start(app: &TestApp, token: &str, body: Value) -> (StatusCode, Value) {
    app.post("/study/sessions", Some(token), body).await
}

async fn review(app: &TestApp, token: &str, card_id: &str, quality: u8, session_id: &str) -> (StatusCode, Value) {
    app.post(
        &format!("/cards/{}/review", card_id),
        Some(token),
        json!({ "quality": quality, "session_id": session_id }),
    )
    .await
}

#[tokio::test]
async fn reviews_count_into_the_session_until_it_completes() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let (deck_id, cards) = deck_with_cards(&app, &teacher, "public", 2).await;

    let (status, session) = start(
        &app,
        &student,
        json!({ "deck_id": deck_id, "study_mode": "review", "target_cards": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{session}");
    assert_eq!(session["status"], "active");
    assert_eq!(session["cards_studied"], 0);
    assert!(session["accuracy_rate"].is_null());
    let session_id = session["id"].as_str().unwrap().to_string();
    let session_uri = format!("/study/sessions/{}", session_id);

    let (status, first) = review(&app, &student, &cards[0], 4, &session_id).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["repetitions"], 1);
    assert_eq!(first["session"]["cards_studied"], 1);
    assert_eq!(first["session"]["correct_answers"], 1);

    let (status, paused) = app
        .request(Method::PATCH, &session_uri, Some(student.as_str()), Some(json!({ "status": "paused" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");

    let (status, _) = review(&app, &student, &cards[1], 1, &session_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .request(Method::PATCH, &session_uri, Some(student.as_str()), Some(json!({ "status": "active" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, second) = review(&app, &student, &cards[1], 1, &session_id).await;
    assert_eq!(second["was_correct"], false);
    assert_eq!(second["session"]["cards_studied"], 2);
    assert_eq!(second["session"]["incorrect_answers"], 1);
    assert_eq!(second["session"]["target_reached"], true);

    let (status, done) = app
        .post(&format!("{}/complete", session_uri), Some(student.as_str()), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{done}");
    assert_eq!(done["status"], "completed");
    assert_eq!(done["accuracy_rate"], 0.5);
    assert!(done["completed_at"].is_string());

    let (status, body) = app
        .post(&format!("{}/complete", session_uri), Some(student.as_str()), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot move a completed session to completed");

    let (status, _) = review(&app, &student, &cards[0], 5, &session_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = app.get("/study/sessions", &student).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], session_id.as_str());
}

#[tokio::test]
async fn sessions_belong_to_the_student_who_started_them() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, owner) = app.user_with_token(Role::Student, "owner").await;
    let (_, other) = app.user_with_token(Role::Student, "other").await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin").await;
    let (deck_id, cards) = deck_with_cards(&app, &teacher, "public", 1).await;

    let (_, session) = start(&app, &owner, json!({ "deck_id": deck_id, "study_mode": "practice" })).await;
    let session_id = session["id"].as_str().unwrap().to_string();
    let session_uri = format!("/study/sessions/{}", session_id);

    let (status, _) = app.get(&session_uri, &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = review(&app, &other, &cards[0], 4, &session_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, seen) = app.get(&session_uri, &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["cards_studied"], 0);
    let (status, _) = app
        .request(Method::PATCH, &session_uri, Some(admin.as_str()), Some(json!({ "status": "abandoned" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/study/sessions/{}", uuid::Uuid::new_v4()), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_need_a_readable_deck_and_matching_cards() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let (public_deck, _) = deck_with_cards(&app, &teacher, "public", 0).await;
    let (private_deck, _) = deck_with_cards(&app, &teacher, "private", 0).await;
    let (other_deck, other_cards) = deck_with_cards(&app, &teacher, "public", 1).await;

    let (status, _) = start(&app, &teacher, json!({ "deck_id": public_deck, "study_mode": "cram" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = start(&app, &student, json!({ "deck_id": private_deck, "study_mode": "cram" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = start(
        &app,
        &student,
        json!({ "deck_id": public_deck, "study_mode": "cram", "target_cards": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = start(
        &app,
        &student,
        json!({ "deck_id": public_deck, "study_mode": "cram", "lesson_id": uuid::Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, session) = start(&app, &student, json!({ "deck_id": public_deck, "study_mode": "test" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = session["id"].as_str().unwrap();

    let (status, body) = review(&app, &student, &other_cards[0], 4, session_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Card does not belong to the session's deck");

    let (_, cards) = app.get(&format!("/decks/{}/cards", other_deck), &student).await;
    assert_eq!(cards[0]["review_count"], 0);
}
