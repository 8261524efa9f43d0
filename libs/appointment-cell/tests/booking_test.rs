// Integration tests for the booking transaction: the authoritative
// recheck, vet auto-selection, pet resolution, and the optimistic commit
// where the store's no-overlap constraint settles races.

use chrono::NaiveDate;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentStatus, BookAppointmentRequest, SchedulingError};
use appointment_cell::services::booking::BookingService;
use shared_utils::test_utils::{MockStoreResponses, TestConfig};

const AUTH_TOKEN: &str = "test-token";

// 2026-08-03 is a Monday; America/New_York is on EDT (UTC-4) in August.
const MONDAY: &str = "2026-08-03";

struct TestSetup {
    service: BookingService,
    mock_server: MockServer,
    practice_id: Uuid,
    vet_id: Uuid,
    owner_id: Uuid,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();

        Self {
            service: BookingService::new(&config),
            mock_server,
            practice_id: Uuid::new_v4(),
            vet_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
        }
    }

    async fn mock_practice_and_hours(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/practices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                MockStoreResponses::practice_response(
                    &self.practice_id.to_string(),
                    "America/New_York",
                ),
            ]))
            .mount(&self.mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/practice_hours"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                MockStoreResponses::practice_hours_response(
                    &self.practice_id.to_string(),
                    1,
                    Some("08:00:00"),
                    Some("18:00:00"),
                ),
            ]))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_vet_window(&self, vet_id: Uuid, start_at: &str, end_at: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/vet_availability"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                MockStoreResponses::vet_availability_response(
                    &vet_id.to_string(),
                    &self.practice_id.to_string(),
                    MONDAY,
                    start_at,
                    end_at,
                    "AVAILABLE",
                ),
            ]))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_appointments(&self, rows: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_single_pet(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/pets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                MockStoreResponses::pet_response(
                    &Uuid::new_v4().to_string(),
                    &self.owner_id.to_string(),
                    "Biscuit",
                    "dog",
                ),
            ]))
            .mount(&self.mock_server)
            .await;
    }

    fn request_at_ten(&self) -> BookAppointmentRequest {
        BookAppointmentRequest {
            practice_id: self.practice_id,
            pet_owner_id: self.owner_id,
            date: MONDAY.to_string(),
            start_time: "10:00".to_string(),
            timezone: None,
            service: Some("Wellness exam".to_string()),
            pet_ids: None,
            assigned_vet_user_id: Some(self.vet_id),
            duration_minutes: Some(30),
            notes: None,
        }
    }
}

#[tokio::test]
async fn books_a_free_slot() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup
        .mock_vet_window(setup.vet_id, "2026-08-03T13:00:00Z", "2026-08-03T21:00:00Z")
        .await;
    setup.mock_appointments(vec![]).await;
    setup.mock_single_pet().await;

    let created_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &created_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "scheduled",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    let appointment = setup
        .service
        .book_appointment(setup.request_at_ten(), AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.id, created_id);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.vet_id, Some(setup.vet_id));
}

#[tokio::test]
async fn precheck_conflict_names_the_blocking_appointment() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup
        .mock_vet_window(setup.vet_id, "2026-08-03T13:00:00Z", "2026-08-03T21:00:00Z")
        .await;
    setup.mock_single_pet().await;

    let blocker_id = Uuid::new_v4();
    setup
        .mock_appointments(vec![MockStoreResponses::appointment_response(
            &blocker_id.to_string(),
            &setup.practice_id.to_string(),
            &Uuid::new_v4().to_string(),
            &setup.vet_id.to_string(),
            "2026-08-03T14:00:00Z",
            30,
            "confirmed",
        )])
        .await;

    let error = setup
        .service
        .book_appointment(setup.request_at_ten(), AUTH_TOKEN)
        .await
        .unwrap_err();

    let SchedulingError::Conflict { conflicts, alternatives } = error else {
        panic!("expected a conflict");
    };

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].appointment_id, blocker_id);
    assert_eq!(conflicts[0].time, "10:00 AM");
    // The taken time itself is never offered back.
    assert!(alternatives.iter().all(|s| s.local_start.format("%H:%M").to_string() != "10:00"));
}

#[tokio::test]
async fn concurrent_bookings_produce_exactly_one_appointment() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup
        .mock_vet_window(setup.vet_id, "2026-08-03T13:00:00Z", "2026-08-03T21:00:00Z")
        .await;
    setup.mock_single_pet().await;

    let winner_id = Uuid::new_v4();

    // The loser's winner-lookup filters by committed statuses; the
    // advisory recheck does not, so it keeps seeing an empty calendar.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(scheduled,confirmed,in_progress,error)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &winner_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "scheduled",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;
    setup.mock_appointments(vec![]).await;

    // First insert wins; the store's exclusion constraint rejects the
    // second with 409.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &winner_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "scheduled",
            ),
        ]))
        .up_to_n_times(1)
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockStoreResponses::error_response(
                "conflicting key value violates exclusion constraint \"appointments_vet_no_overlap\"",
                "23P01",
            ),
        ))
        .mount(&setup.mock_server)
        .await;

    let (first, second) = tokio::join!(
        setup.service.book_appointment(setup.request_at_ten(), AUTH_TOKEN),
        setup.service.book_appointment(setup.request_at_ten(), AUTH_TOKEN),
    );

    let (won, lost) = match (first, second) {
        (Ok(a), Err(e)) => (a, e),
        (Err(e), Ok(a)) => (a, e),
        other => panic!("expected one success and one conflict, got {:?}", other.0.is_ok()),
    };

    assert_eq!(won.id, winner_id);

    let SchedulingError::Conflict { conflicts, .. } = lost else {
        panic!("loser should see a conflict");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].appointment_id, winner_id);
}

#[tokio::test]
async fn multiple_pets_without_selection_asks_instead_of_guessing() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup
        .mock_vet_window(setup.vet_id, "2026-08-03T13:00:00Z", "2026-08-03T21:00:00Z")
        .await;
    setup.mock_appointments(vec![]).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::pet_response(
                &Uuid::new_v4().to_string(),
                &setup.owner_id.to_string(),
                "Biscuit",
                "dog",
            ),
            MockStoreResponses::pet_response(
                &Uuid::new_v4().to_string(),
                &setup.owner_id.to_string(),
                "Clementine",
                "cat",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    // Any insert reaching the store here would be a bug.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let error = setup
        .service
        .book_appointment(setup.request_at_ten(), AUTH_TOKEN)
        .await
        .unwrap_err();

    let SchedulingError::PetSelectionRequired { pets } = error else {
        panic!("expected pet selection");
    };
    assert_eq!(pets.len(), 2);
}

#[tokio::test]
async fn unassigned_booking_spreads_load_to_the_quieter_vet() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup.mock_single_pet().await;

    let busy_vet = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
    let quiet_vet = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::vet_availability_response(
                &busy_vet.to_string(),
                &setup.practice_id.to_string(),
                MONDAY,
                "2026-08-03T13:00:00Z",
                "2026-08-03T21:00:00Z",
                "AVAILABLE",
            ),
            MockStoreResponses::vet_availability_response(
                &quiet_vet.to_string(),
                &setup.practice_id.to_string(),
                MONDAY,
                "2026-08-03T13:00:00Z",
                "2026-08-03T21:00:00Z",
                "AVAILABLE",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    // The busy vet already has an afternoon appointment elsewhere in the
    // day; it does not overlap the requested window.
    setup
        .mock_appointments(vec![MockStoreResponses::appointment_response(
            &Uuid::new_v4().to_string(),
            &setup.practice_id.to_string(),
            &Uuid::new_v4().to_string(),
            &busy_vet.to_string(),
            "2026-08-03T19:00:00Z",
            30,
            "confirmed",
        )])
        .await;

    // The insert must name the quieter vet.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(serde_json::json!({ "vet_id": quiet_vet })))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &quiet_vet.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "scheduled",
            ),
        ]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    let mut request = setup.request_at_ten();
    request.assigned_vet_user_id = None;

    let appointment = setup
        .service
        .book_appointment(request, AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.vet_id, Some(quiet_vet));
}

#[tokio::test]
async fn booking_outside_practice_hours_conflicts_with_no_blockers() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;
    setup
        .mock_vet_window(setup.vet_id, "2026-08-03T13:00:00Z", "2026-08-03T21:00:00Z")
        .await;
    setup.mock_appointments(vec![]).await;
    setup.mock_single_pet().await;

    let mut request = setup.request_at_ten();
    // 19:00 local is past the 18:00 close.
    request.start_time = "19:00".to_string();

    let error = setup
        .service
        .book_appointment(request, AUTH_TOKEN)
        .await
        .unwrap_err();

    let SchedulingError::Conflict { conflicts, .. } = error else {
        panic!("expected a conflict");
    };
    assert!(conflicts.is_empty());
}

#[tokio::test]
async fn nonsense_date_is_a_parse_error() {
    let setup = TestSetup::new().await;
    setup.mock_practice_and_hours().await;

    let mut request = setup.request_at_ten();
    request.date = "whenever suits".to_string();

    let error = setup
        .service
        .book_appointment(request, AUTH_TOKEN)
        .await
        .unwrap_err();

    assert!(matches!(error, SchedulingError::ParseError(_)));
}

#[tokio::test]
async fn confirm_moves_scheduled_to_confirmed() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &appointment_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "scheduled",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &appointment_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "confirmed",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    let confirmed = setup
        .service
        .confirm_appointment(appointment_id, AUTH_TOKEN)
        .await
        .unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn completed_appointments_cannot_be_confirmed() {
    let setup = TestSetup::new().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockStoreResponses::appointment_response(
                &appointment_id.to_string(),
                &setup.practice_id.to_string(),
                &setup.owner_id.to_string(),
                &setup.vet_id.to_string(),
                "2026-08-03T14:00:00Z",
                30,
                "completed",
            ),
        ]))
        .mount(&setup.mock_server)
        .await;

    let error = setup
        .service
        .confirm_appointment(appointment_id, AUTH_TOKEN)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        SchedulingError::InvalidStatusTransition(AppointmentStatus::Completed)
    ));
}
