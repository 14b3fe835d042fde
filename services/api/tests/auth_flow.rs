mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD};
use flashcard_lms_core::domain::{EnrollmentScope, EnrollmentStatus, NewClass, NewEnrollment, Role};
use flashcard_lms_core::ports::DatabaseService;
use serde_json::json;

#[tokio::test]
async fn register_login_and_me() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({
                "email": "  Ada@Example.com ",
                "username": "Ada",
                "password": PASSWORD,
                "full_name": "Ada Lovelace",
                "role": "teacher"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["username"], "ada");
    assert_eq!(body["role"], "teacher");
    assert!(body.get("hashed_password").is_none());

    let (access, _) = app.login("ada").await;
    let (status, me) = app.get("/auth/me", &access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ada");
    assert!(me["last_login_at"].is_string());
}

#[tokio::test]
async fn registration_rejects_duplicates_admins_and_weak_passwords() {
    let app = TestApp::new();
    app.seed(Role::Student, "taken").await;

    let register = |email: &str, username: &str, password: &str, role: &str| {
        json!({
            "email": email,
            "username": username,
            "password": password,
            "full_name": "Someone",
            "role": role
        })
    };

    let (status, body) = app
        .post("/auth/register", None, register("taken@example.com", "fresh", PASSWORD, "student"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already registered");

    let (status, body) = app
        .post("/auth/register", None, register("fresh@example.com", "TAKEN", PASSWORD, "student"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username already taken");

    let (status, _) = app
        .post("/auth/register", None, register("boss@example.com", "boss", PASSWORD, "admin"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/auth/register", None, register("weak@example.com", "weak", "password", "student"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .post("/auth/register", None, register("not-an-email", "noemail", PASSWORD, "student"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::new();
    app.seed(Role::Student, "sam").await;

    let (status, wrong) = app
        .post("/auth/login", None, json!({ "email": "sam@example.com", "password": "Wr0ng!Pass" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown) = app
        .post("/auth/login", None, json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["message"], unknown["message"]);
}

#[tokio::test]
async fn form_login_takes_the_email_as_username() {
    let app = TestApp::new();
    app.seed(Role::Student, "former").await;

    let (status, body) = app
        .post_form("/auth/login/form", "username=Former%40Example.com&password=Str0ng%21Pass")
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["username"], "former");

    let access = body["access_token"].as_str().unwrap();
    let (status, me) = app.get("/auth/me", access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "former@example.com");

    let (status, wrong) = app
        .post_form("/auth/login/form", "username=former%40example.com&password=Wr0ng%21Pass")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["message"], "Invalid email or password");
}

#[tokio::test]
async fn disabled_accounts_cannot_log_in() {
    let app = TestApp::new();
    let user = app.seed(Role::Student, "gone").await;
    app.db.set_user_active(user.id, false).await.unwrap();

    let (status, body) = app
        .post("/auth/login", None, json!({ "email": "gone@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User account is disabled");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = TestApp::new();
    let (status, _) = app.request(Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/auth/me", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logged_out_access_token_is_rejected() {
    let app = TestApp::new();
    app.seed(Role::Student, "leaver").await;
    let (access, refresh) = app.login("leaver").await;

    let (status, _) = app.get("/auth/me", &access).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/auth/logout", Some(access.as_str()), json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");

    let (status, body) = app.get("/auth/me", &access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token has been revoked");

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_accepts_an_empty_body() {
    let app = TestApp::new();
    app.seed(Role::Student, "quiet").await;
    let (access, _) = app.login("quiet").await;

    let (status, _) = app.request(Method::POST, "/auth/logout", Some(access.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/auth/me", &access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_tokens_rotate_and_cannot_be_reused() {
    let app = TestApp::new();
    app.seed(Role::Student, "rotor").await;
    let (_, refresh) = app.login("rotor").await;

    let (status, body) = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    let rotated = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh);

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": rotated }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn access_tokens_are_not_refresh_tokens() {
    let app = TestApp::new();
    app.seed(Role::Student, "mixup").await;
    let (access, refresh) = app.login("mixup").await;

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": access }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/auth/me", &refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_checks_the_current_one() {
    let app = TestApp::new();
    app.seed(Role::Student, "changer").await;
    let (access, _) = app.login("changer").await;

    let (status, body) = app
        .post(
            "/auth/change-password",
            Some(access.as_str()),
            json!({ "current_password": "Wr0ng!Pass", "new_password": "N3w!Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, _) = app
        .post(
            "/auth/change-password",
            Some(access.as_str()),
            json!({ "current_password": PASSWORD, "new_password": "N3w!Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post("/auth/login", None, json!({ "email": "changer@example.com", "password": "N3w!Password" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn only_admins_reset_arbitrary_passwords() {
    let app = TestApp::new();
    let (_, admin) = app.user_with_token(Role::Admin, "root").await;
    let (_, teacher) = app.user_with_token(Role::Teacher, "tess").await;
    let student = app.seed(Role::Student, "stu").await;
    let uri = format!("/auth/admin/users/{}/reset-password", student.id);
    let body = json!({ "new_password": "Res3t!Password", "reset_reason": "locked out" });

    let (status, _) = app.request(Method::PUT, &uri, Some(teacher.as_str()), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reset) = app.request(Method::PUT, &uri, Some(admin.as_str()), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["force_change_required"], true);

    let (status, me) = app
        .post("/auth/login", None, json!({ "email": "stu@example.com", "password": "Res3t!Password" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["force_password_change"], true);
}

#[tokio::test]
async fn teachers_reset_only_their_own_students() {
    let app = TestApp::new();
    let (teacher, teacher_token) = app.user_with_token(Role::Teacher, "mentor").await;
    let student = app.seed(Role::Student, "pupil").await;
    let colleague = app.seed(Role::Teacher, "colleague").await;
    let body = json!({ "new_password": "Res3t!Password" });
    let uri = |id| format!("/auth/teacher/students/{}/reset-password", id);

    let (status, _) = app
        .request(Method::PUT, &uri(student.id), Some(teacher_token.as_str()), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body_msg) = app
        .request(Method::PUT, &uri(colleague.id), Some(teacher_token.as_str()), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body_msg["message"], "Target user is not a student");

    let class = app
        .db
        .create_class(NewClass {
            name: "Biology".to_string(),
            description: None,
            teacher_id: teacher.id,
            class_code: "BIO101".to_string(),
            max_students: None,
        })
        .await
        .unwrap();
    app.db
        .create_enrollment(NewEnrollment {
            user_id: student.id,
            scope: EnrollmentScope::Class(class.id),
            status: EnrollmentStatus::Enrolled,
            enrolled_by: Some(teacher.id),
        })
        .await
        .unwrap();

    let (status, reset) = app
        .request(Method::PUT, &uri(student.id), Some(teacher_token.as_str()), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["reset_by"], teacher.id.to_string());
    assert_eq!(reset["force_change_required"], true);
}
