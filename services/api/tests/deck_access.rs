mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use flashcard_lms_core::domain::Role;
use serde_json::{json, Value};

async fn create_deck(app: &TestApp, token: &str, title: &str, privacy: &str) -> String {
    let (status, body) = app
        .post(
            "/decks",
            Some(token),
            json!({ "title": title, "privacy_level": privacy, "tags": ["test"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_class(app: &TestApp, token: &str, name: &str) -> String {
    let (status, body) = app.post("/classes", Some(token), json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn assign(app: &TestApp, token: &str, deck_id: &str, target_type: &str, target_id: &str) -> Value {
    let (status, body) = app
        .post(
            &format!("/decks/{}/assignments", deck_id),
            Some(token),
            json!({ "target_type": target_type, "target_id": target_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn enroll(app: &TestApp, token: &str, user_id: &str, scope_type: &str, target_id: &str, status: &str) -> String {
    let (code, body) = app
        .post(
            "/enrollments",
            Some(token),
            json!({ "user_id": user_id, "scope_type": scope_type, "target_id": target_id, "status": status }),
        )
        .await;
    assert_eq!(code, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn owners_read_their_private_decks_and_others_do_not() {
    let app = TestApp::new();
    let (_, owner) = app.user_with_token(Role::Teacher, "owner").await;
    let (_, other) = app.user_with_token(Role::Teacher, "other").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let deck_id = create_deck(&app, &owner, "Secret notes", "private").await;

    let (status, body) = app.get(&format!("/decks/{}", deck_id), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_via"], "owner");
    assert_eq!(body["deck"]["privacy_level"], "private");

    for token in [&other, &student] {
        let (status, body) = app.get(&format!("/decks/{}", deck_id), token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Access denied to this deck");
    }
}

#[tokio::test]
async fn admins_read_every_deck_including_deleted_ones() {
    let app = TestApp::new();
    let (_, owner) = app.user_with_token(Role::Teacher, "owner").await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin").await;
    let deck_id = create_deck(&app, &owner, "Private deck", "private").await;

    let (status, body) = app.get(&format!("/decks/{}", deck_id), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_via"], "admin");

    let (status, _) = app
        .request(Method::DELETE, &format!("/decks/{}", deck_id), Some(owner.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/decks/{}", deck_id), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/decks/{}", deck_id), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deck"]["is_active"], false);
}

#[tokio::test]
async fn public_decks_are_readable_by_everyone() {
    let app = TestApp::new();
    let (_, owner) = app.user_with_token(Role::Teacher, "owner").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let deck_id = create_deck(&app, &owner, "Capitals", "public").await;

    let (status, body) = app.get(&format!("/decks/{}", deck_id), &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_via"], "public");
}

#[tokio::test]
async fn class_assigned_deck_opens_once_enrollment_is_active() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (student, student_token) = app.user_with_token(Role::Student, "student").await;
    let class_id = create_class(&app, &teacher, "Chemistry").await;
    let deck_id = create_deck(&app, &teacher, "Elements", "class-assigned").await;
    assign(&app, &teacher, &deck_id, "class", &class_id).await;
    let deck_uri = format!("/decks/{}", deck_id);

    let (status, _) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let enrollment_id = enroll(
        &app,
        &teacher,
        &student.id.to_string(),
        "class",
        &class_id,
        "pending_approval",
    )
    .await;
    let (status, _) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/enrollments/{}", enrollment_id),
            Some(teacher.as_str()),
            Some(json!({ "status": "enrolled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "enrolled");

    let (status, body) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_via"], "assigned");
    assert_eq!(body["assignment"]["assignment_type"], "class");
    assert_eq!(body["assignment"]["target_id"], class_id.as_str());

    let (status, report) = app.get(&format!("{}/access", deck_uri), &student_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["can_read"], true);
    assert_eq!(report["has_assignment_access"], true);
    assert_eq!(report["access_type"], "class");

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/enrollments/{}", enrollment_id),
            Some(teacher.as_str()),
            Some(json!({ "status": "dropped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleted_decks_have_no_access_report_for_non_admins() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (student, student_token) = app.user_with_token(Role::Student, "student").await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin").await;
    let class_id = create_class(&app, &teacher, "Physics").await;
    let deck_id = create_deck(&app, &teacher, "Forces", "class-assigned").await;
    assign(&app, &teacher, &deck_id, "class", &class_id).await;
    enroll(&app, &teacher, &student.id.to_string(), "class", &class_id, "enrolled").await;
    let access_uri = format!("/decks/{}/access", deck_id);

    let (status, report) = app.get(&access_uri, &student_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["has_assignment_access"], true);

    let (status, _) = app
        .request(Method::DELETE, &format!("/decks/{}", deck_id), Some(teacher.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for token in [&student_token, &teacher] {
        let (status, body) = app.get(&access_uri, token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Deck not found");
    }

    let (status, report) = app.get(&access_uri, &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["can_read"], true);
    assert_eq!(report["has_assignment_access"], false);
    assert_eq!(report["assignments"], json!([]));
}

#[tokio::test]
async fn lesson_assigned_deck_resolves_through_the_course() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (student, student_token) = app.user_with_token(Role::Student, "student").await;

    let (status, course) = app.post("/courses", Some(teacher.as_str()), json!({ "title": "Physics" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let course_id = course["id"].as_str().unwrap().to_string();

    let (status, lesson) = app
        .post(
            &format!("/courses/{}/lessons", course_id),
            Some(teacher.as_str()),
            json!({ "title": "Motion" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lesson["order_index"], 0);
    let lesson_id = lesson["id"].as_str().unwrap().to_string();

    let deck_id = create_deck(&app, &teacher, "Kinematics", "lesson-assigned").await;
    assign(&app, &teacher, &deck_id, "lesson", &lesson_id).await;

    let deck_uri = format!("/decks/{}", deck_id);
    let (status, _) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    enroll(&app, &teacher, &student.id.to_string(), "course", &course_id, "in_progress").await;
    let (status, body) = app.get(&deck_uri, &student_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignment"]["assignment_type"], "lesson");
}

#[tokio::test]
async fn accessible_listing_follows_the_access_rules() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (student, student_token) = app.user_with_token(Role::Student, "student").await;
    let class_id = create_class(&app, &teacher, "History").await;

    let public = create_deck(&app, &teacher, "Dates", "public").await;
    let private = create_deck(&app, &teacher, "Drafts", "private").await;
    let assigned = create_deck(&app, &teacher, "Empires", "class-assigned").await;
    assign(&app, &teacher, &assigned, "class", &class_id).await;
    enroll(&app, &teacher, &student.id.to_string(), "class", &class_id, "enrolled").await;

    let (status, body) = app.get("/decks/accessible", &student_token).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|d| d["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&public.as_str()));
    assert!(ids.contains(&assigned.as_str()));
    assert!(!ids.contains(&private.as_str()));

    let (_, body) = app.get("/decks/accessible?privacy_level=public", &student_token).await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|d| d["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![public.as_str()]);

    let (_, mine) = app.get("/decks/mine", &teacher).await;
    assert_eq!(mine.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn students_cannot_author_decks() {
    let app = TestApp::new();
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let (status, body) = app
        .post("/decks", Some(student.as_str()), json!({ "title": "Mine" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Required permission: deck:create");
}

#[tokio::test]
async fn teachers_cannot_hide_decks_that_are_still_assigned() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, other) = app.user_with_token(Role::Teacher, "other").await;
    let class_id = create_class(&app, &teacher, "Art").await;
    let deck_id = create_deck(&app, &teacher, "Painters", "class-assigned").await;
    let privacy_uri = format!("/decks/{}/privacy", deck_id);

    let (status, _) = app
        .request(Method::PATCH, &privacy_uri, Some(other.as_str()), Some(json!({ "privacy_level": "public" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::PATCH, &privacy_uri, Some(teacher.as_str()), Some(json!({ "privacy_level": "private" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::PATCH, &privacy_uri, Some(teacher.as_str()), Some(json!({ "privacy_level": "class-assigned" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assign(&app, &teacher, &deck_id, "class", &class_id).await;

    let (status, body) = app
        .request(Method::PATCH, &privacy_uri, Some(teacher.as_str()), Some(json!({ "privacy_level": "private" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot make a deck private while it has active assignments");
}

#[tokio::test]
async fn assignments_require_owning_the_target() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, other) = app.user_with_token(Role::Teacher, "other").await;
    let foreign_class = create_class(&app, &other, "Not mine").await;
    let deck_id = create_deck(&app, &teacher, "Words", "class-assigned").await;

    let (status, _) = app
        .post(
            &format!("/decks/{}/assignments", deck_id),
            Some(teacher.as_str()),
            json!({ "target_type": "class", "target_id": foreign_class }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            &format!("/decks/{}/assignments", deck_id),
            Some(teacher.as_str()),
            json!({ "target_type": "course", "target_id": uuid::Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reviewing_a_card_reschedules_it() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let deck_id = create_deck(&app, &teacher, "Verbs", "public").await;

    let (status, card) = app
        .post(
            &format!("/decks/{}/cards", deck_id),
            Some(teacher.as_str()),
            json!({ "question": "to be (fr)", "answer": "etre" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let card_id = card["id"].as_str().unwrap().to_string();
    let review_uri = format!("/cards/{}/review", card_id);

    let (status, first) = app.post(&review_uri, Some(student.as_str()), json!({ "quality": 4 })).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["was_correct"], true);
    assert_eq!(first["repetitions"], 1);
    assert_eq!(first["interval_days"], 1);

    let (_, second) = app.post(&review_uri, Some(student.as_str()), json!({ "quality": 5 })).await;
    assert_eq!(second["interval_days"], 6);
    assert_eq!(second["review_count"], 2);

    let (_, lapse) = app.post(&review_uri, Some(student.as_str()), json!({ "quality": 1 })).await;
    assert_eq!(lapse["was_correct"], false);
    assert_eq!(lapse["repetitions"], 0);
    assert_eq!(lapse["interval_days"], 1);

    let (status, _) = app.post(&review_uri, Some(student.as_str()), json!({ "quality": 6 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.post(&review_uri, Some(teacher.as_str()), json!({ "quality": 4 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, cards) = app.get(&format!("/decks/{}/cards", deck_id), &student).await;
    assert_eq!(cards[0]["review_count"], 3);
    assert_eq!(cards[0]["correct_count"], 2);

    let (_, deck) = app.get(&format!("/decks/{}", deck_id), &student).await;
    assert_eq!(deck["deck"]["card_count"], 1);
}

#[tokio::test]
async fn students_cannot_review_cards_they_cannot_see() {
    let app = TestApp::new();
    let (_, teacher) = app.user_with_token(Role::Teacher, "teacher").await;
    let (_, student) = app.user_with_token(Role::Student, "student").await;
    let deck_id = create_deck(&app, &teacher, "Hidden", "private").await;
    let (_, card) = app
        .post(
            &format!("/decks/{}/cards", deck_id),
            Some(teacher.as_str()),
            json!({ "question": "q", "answer": "a" }),
        )
        .await;

    let (status, _) = app
        .post(
            &format!("/cards/{}/review", card["id"].as_str().unwrap()),
            Some(student.as_str()),
            json!({ "quality": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
