use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::services::clock::FixedClock;
use appointment_cell::services::identity::StaticIdentityResolver;
use appointment_cell::services::store::InMemoryAppointmentStore;
use appointment_cell::{appointment_routes, AppointmentState};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    config: TestConfig,
    patient_id: Uuid,
    doctor_id: Uuid,
    clinic_id: Uuid,
}

impl TestApp {
    async fn new() -> Self {
        let config = TestConfig::default();
        let identity = Arc::new(StaticIdentityResolver::new());
        let patient_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let clinic_id = Uuid::new_v4();
        identity.register_patient(patient_id, "Efua Owusu", true).await;
        identity.register_user(doctor_id, "Dr. Yaw Asante", &["doctor"], true).await;
        identity.register_clinic(clinic_id, "Harbour Clinic", true).await;

        let state = Arc::new(AppointmentState::new(
            config.to_arc(),
            Arc::new(InMemoryAppointmentStore::new()),
            identity,
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap())),
        ));

        Self {
            router: appointment_routes(state),
            config,
            patient_id,
            doctor_id,
            clinic_id,
        }
    }

    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.jwt_secret, None)
    }

    fn staff_token(&self) -> String {
        self.token_for(&TestUser::receptionist("front-desk@clinic.test"))
    }

    fn patient_token(&self) -> String {
        self.token_for(&TestUser {
            id: self.patient_id.to_string(),
            email: "efua@example.com".to_string(),
            role: "patient".to_string(),
        })
    }

    fn booking_body(&self, start: &str, duration: i32) -> Value {
        json!({
            "patient_id": self.patient_id,
            "doctor_id": self.doctor_id,
            "clinic_id": self.clinic_id,
            "appointment_date": start,
            "duration": duration,
            "appointment_type": "consultation",
            "reason": "Persistent cough"
        })
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn book(&self, start: &str, duration: i32) -> Value {
        let (status, body) = self
            .send(Method::POST, "/", Some(&self.staff_token()), Some(self.booking_body(start, duration)))
            .await;
        assert_eq!(status, StatusCode::OK, "booking failed: {}", body);
        body["appointment"].clone()
    }
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing authorization header");

    let forged = JwtTestUtils::create_invalid_signature_token(&TestUser::admin("a@clinic.test"));
    let (status, _) = app.send(Method::GET, "/", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let malformed = JwtTestUtils::create_malformed_token();
    let (status, _) = app.send(Method::GET, "/", Some(&malformed), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = JwtTestUtils::create_expired_token(&TestUser::admin("a@clinic.test"), &app.config.jwt_secret);
    let (status, body) = app.send(Method::GET, "/", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token expired");
}

#[tokio::test]
async fn staff_can_book_and_patients_cannot() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(Method::POST, "/", Some(&app.patient_token()), Some(app.booking_body("2025-06-01T09:00:00Z", 30)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("patient"));

    let appointment = app.book("2025-06-01T09:00:00Z", 30).await;
    assert_eq!(appointment["status"], "scheduled");
    assert_eq!(appointment["priority"], "normal");
    assert_eq!(appointment["is_active"], true);
    assert_eq!(appointment["duration"], 30);
}

#[tokio::test]
async fn booking_errors_map_to_http_statuses() {
    let app = TestApp::new().await;
    let token = app.staff_token();
    app.book("2025-06-01T09:00:00Z", 30).await;

    let (status, body) = app
        .send(Method::POST, "/", Some(&token), Some(app.booking_body("2025-06-01T09:20:00Z", 20)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Scheduling conflict"));

    let (status, _) = app
        .send(Method::POST, "/", Some(&token), Some(app.booking_body("2025-06-01T12:00:00Z", 10)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::POST, "/", Some(&token), Some(app.booking_body("2025-05-31T12:00:00Z", 30)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut unknown_patient = app.booking_body("2025-06-01T12:00:00Z", 30);
    unknown_patient["patient_id"] = json!(Uuid::new_v4());
    let (status, body) = app.send(Method::POST, "/", Some(&token), Some(unknown_patient)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Patient not found"));

    let mut bad_type = app.booking_body("2025-06-01T12:00:00Z", 30);
    bad_type["appointment_type"] = json!("dentistry");
    let (status, _) = app.send(Method::POST, "/", Some(&token), Some(bad_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lifecycle_routes_follow_the_state_machine() {
    let app = TestApp::new().await;
    let token = app.staff_token();
    let id = app.book("2025-06-01T10:00:00Z", 30).await["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::PATCH, &format!("/{}/complete", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("'scheduled'"), "{}", message);
    assert!(message.contains("confirmed, cancelled, no_show"), "{}", message);

    let (status, body) = app.send(Method::PATCH, &format!("/{}/confirm", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "confirmed");
    assert_eq!(body["appointment"]["confirmed_at"], "2025-06-01T07:00:00Z");

    let (status, body) = app.send(Method::PATCH, &format!("/{}/start", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "in_progress");

    let (status, body) = app.send(Method::PATCH, &format!("/{}/complete", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "completed");
}

#[tokio::test]
async fn cancel_requires_reason_in_body() {
    let app = TestApp::new().await;
    let token = app.staff_token();
    let id = app.book("2025-06-01T10:00:00Z", 30).await["id"].as_str().unwrap().to_string();
    let uri = format!("/{}/cancel", id);

    let (status, _) = app.send(Method::PATCH, &uri, Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&token), Some(json!({"cancellation_reason": "patient request"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled");
    assert_eq!(body["appointment"]["cancellation_reason"], "patient request");

    let (status, _) = app
        .send(Method::PATCH, &format!("/{}/no-show", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generic_patch_cannot_change_status() {
    let app = TestApp::new().await;
    let token = app.staff_token();
    let id = app.book("2025-06-01T10:00:00Z", 30).await["id"].as_str().unwrap().to_string();
    let uri = format!("/{}", id);

    let (status, _) = app
        .send(Method::PATCH, &uri, Some(&token), Some(json!({"status": "completed"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&token), Some(json!({"notes": "Bring previous x-rays", "duration": 45})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["notes"], "Bring previous x-rays");
    assert_eq!(body["appointment"]["duration"], 45);
    assert_eq!(body["appointment"]["status"], "scheduled");
}

#[tokio::test]
async fn delete_soft_removes_the_appointment() {
    let app = TestApp::new().await;
    let token = app.staff_token();
    let id = app.book("2025-06-01T10:00:00Z", 30).await["id"].as_str().unwrap().to_string();
    let uri = format!("/{}", id);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&app.patient_token()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment_id"], id.as_str());

    let (status, _) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.send(Method::GET, "/", Some(&token), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn patients_only_see_their_own_appointments() {
    let app = TestApp::new().await;
    let staff = app.staff_token();
    let id = app.book("2025-06-01T10:00:00Z", 30).await["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::GET, "/", Some(&app.patient_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = app.send(Method::GET, &format!("/{}/details", id), Some(&app.patient_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctor"]["display_name"], "Dr. Yaw Asante");
    assert_eq!(body["end_time"], "2025-06-01T10:30:00Z");

    let stranger = app.token_for(&TestUser::patient("stranger@example.com"));
    let (_, body) = app.send(Method::GET, "/", Some(&stranger), None).await;
    assert_eq!(body["total"], 0);
    let (status, _) = app.send(Method::GET, &format!("/{}", id), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, &format!("/?doctorId={}&status=scheduled", app.doctor_id), Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointments"][0]["id"], id.as_str());

    let (status, _) = app.send(Method::GET, "/?status=pending", Some(&staff), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_and_conflict_check_routes() {
    let app = TestApp::new().await;
    let token = app.staff_token();

    let uri = format!("/availability/{}?date=2025-06-01", app.doctor_id);
    let (status, body) = app.send(Method::GET, &uri, Some(&app.patient_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"available": true, "conflicting_appointments": []}));

    let booked = app.book("2025-06-01T10:00:00Z", 30).await;

    let (_, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["conflicting_appointments"][0]["id"], booked["id"]);

    let check = format!(
        "/conflicts/check?doctor_id={}&start_time=2025-06-01T10:35:00Z&duration=30",
        app.doctor_id
    );
    let (status, body) = app.send(Method::GET, &check, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_conflict"], true);
    assert_eq!(body["buffered_start"], "2025-06-01T10:20:00Z");

    let (status, _) = app
        .send(Method::GET, &format!("/availability/{}?date=soon", app.doctor_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_hides_other_patients_records() {
    let app = TestApp::new().await;
    let booked = app.book("2025-06-01T10:00:00Z", 30).await;

    let neighbour = app.token_for(&TestUser {
        id: Uuid::new_v4().to_string(),
        email: "kofi@example.com".to_string(),
        role: "patient".to_string(),
    });
    let uri = format!("/availability/{}?date=2025-06-01", app.doctor_id);
    let (status, body) = app.send(Method::GET, &uri, Some(&neighbour), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(
        body["conflicting_appointments"],
        json!([{
            "id": booked["id"],
            "appointment_date": "2025-06-01T10:00:00Z",
            "duration": 30,
            "end_time": "2025-06-01T10:30:00Z",
            "status": "scheduled"
        }])
    );
    let slot = &body["conflicting_appointments"][0];
    assert!(slot.get("patient_id").is_none());
    assert!(slot.get("reason").is_none());

    let (_, body) = app.send(Method::GET, &uri, Some(&app.staff_token()), None).await;
    assert_eq!(body["conflicting_appointments"][0]["reason"], "Persistent cough");
    assert_eq!(body["conflicting_appointments"][0]["patient_id"], json!(app.patient_id));
}

#[tokio::test]
async fn statistics_are_staff_only() {
    let app = TestApp::new().await;
    app.book("2025-06-01T10:00:00Z", 30).await;

    let (status, _) = app.send(Method::GET, "/statistics", Some(&app.patient_token()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.token_for(&TestUser::admin("admin@clinic.test"));
    let (status, body) = app.send(Method::GET, "/statistics?startDate=2025-06-01", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "total_appointments": 1,
            "status_stats": [{"status": "scheduled", "count": 1}],
            "type_stats": [{"appointment_type": "consultation", "count": 1}]
        })
    );
}
