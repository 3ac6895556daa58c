mod common;

use std::collections::HashSet;

use clinic_ops_server::{
    error::ClinicError,
    filters::{AppointmentFilter, DoctorFilter, PatientFilter},
    models::{AppointmentStatus, Doctor, Gender},
    pagination::{MAX_PAGE_LIMIT, PageRequest, SortDirection},
    services::NewPatient,
};
use common::{Clinic, at, now};
use uuid::Uuid;

async fn doctors(clinic: &Clinic, n: usize) -> Vec<Doctor> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        out.push(clinic.doctor(&format!("Dr. {i:02}")).await);
    }
    out
}

fn request(filter: &DoctorFilter, sort: SortDirection, cursor: Option<&str>, limit: i64) -> PageRequest {
    PageRequest::build("doctor", filter, Some(sort), cursor, Some(limit), MAX_PAGE_LIMIT).unwrap()
}

/// Follow cursors to the end, returning ids in visit order.
async fn walk(clinic: &Clinic, filter: &DoctorFilter, sort: SortDirection, limit: i64) -> Vec<Uuid> {
    let dir = clinic.directory();
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = request(filter, sort, cursor.as_deref(), limit);
        let result = dir.list_doctors(&clinic.scope, filter, &page).await.unwrap();
        assert!(result.items.len() <= limit as usize);
        seen.extend(result.items.iter().map(|d| d.id));
        if !result.has_next_page {
            break;
        }
        cursor = result.next_cursor;
    }
    seen
}

#[tokio::test]
async fn cursor_walk_visits_every_record_once_in_id_order() {
    let clinic = Clinic::new();
    let created = doctors(&clinic, 23).await;
    let mut expected: Vec<Uuid> = created.iter().map(|d| d.id).collect();
    expected.sort();

    let filter = DoctorFilter::default();
    let asc = walk(&clinic, &filter, SortDirection::Asc, 5).await;
    assert_eq!(asc, expected);

    let desc = walk(&clinic, &filter, SortDirection::Desc, 7).await;
    expected.reverse();
    assert_eq!(desc, expected);

    let unique: HashSet<_> = asc.iter().collect();
    assert_eq!(unique.len(), 23);
}

#[tokio::test]
async fn exact_multiple_of_limit_ends_cleanly() {
    let clinic = Clinic::new();
    doctors(&clinic, 4).await;

    let filter = DoctorFilter::default();
    let first = clinic
        .directory()
        .list_doctors(&clinic.scope, &filter, &request(&filter, SortDirection::Asc, None, 4))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 4);
    assert!(!first.has_next_page);
    assert!(first.next_cursor.is_some());

    let after = request(&filter, SortDirection::Asc, first.next_cursor.as_deref(), 4);
    let rest = clinic.directory().list_doctors(&clinic.scope, &filter, &after).await.unwrap();
    assert!(rest.items.is_empty());
    assert!(rest.next_cursor.is_none());
}

#[tokio::test]
async fn same_page_twice_is_identical() {
    let clinic = Clinic::new();
    doctors(&clinic, 12).await;
    let filter = DoctorFilter::default();
    let dir = clinic.directory();

    let first = dir
        .list_doctors(&clinic.scope, &filter, &request(&filter, SortDirection::Asc, None, 5))
        .await
        .unwrap();
    let cursor = first.next_cursor.clone();

    let page = request(&filter, SortDirection::Asc, cursor.as_deref(), 5);
    let a = dir.list_doctors(&clinic.scope, &filter, &page).await.unwrap();
    let b = dir.list_doctors(&clinic.scope, &filter, &page).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn cursor_from_another_filter_is_rejected() {
    let clinic = Clinic::new();
    doctors(&clinic, 3).await;
    let all = DoctorFilter::default();

    let page = clinic
        .directory()
        .list_doctors(&clinic.scope, &all, &request(&all, SortDirection::Asc, None, 1))
        .await
        .unwrap();
    let token = page.next_cursor.unwrap();

    let active = DoctorFilter {
        active: Some(true),
        ..Default::default()
    };
    let err = PageRequest::build("doctor", &active, None, Some(&token), None, MAX_PAGE_LIMIT).unwrap_err();
    assert!(matches!(err, ClinicError::Validation { code: "CURSOR_MISMATCH", .. }));

    // same filter, other collection
    let err = PageRequest::build("patient", &all, None, Some(&token), None, MAX_PAGE_LIMIT).unwrap_err();
    assert!(matches!(err, ClinicError::Validation { code: "CURSOR_MISMATCH", .. }));
}

#[tokio::test]
async fn appointment_filters_narrow_the_listing() {
    let clinic = Clinic::new();
    let a = clinic.doctor("Dr. A").await;
    let b = clinic.doctor("Dr. B").await;
    let pat = clinic.patient("Kofi").await;

    let first = clinic.book(&a, &pat, at(9, 0), at(9, 30)).await.unwrap();
    clinic.book(&a, &pat, at(10, 0), at(10, 30)).await.unwrap();
    clinic.book(&b, &pat, at(9, 0), at(9, 30)).await.unwrap();
    clinic.appointments().cancel(&clinic.scope, first.id, now()).await.unwrap();

    let svc = clinic.appointments();
    let today = at(0, 0).date_naive();
    let list = |filter: AppointmentFilter, day: chrono::NaiveDate| {
        let svc = svc.clone();
        let scope = clinic.scope;
        async move {
            let criteria = filter.resolve(day).unwrap();
            let page = PageRequest::build("appointment", &criteria, None, None, None, MAX_PAGE_LIMIT).unwrap();
            svc.list(&scope, &criteria, &page).await.unwrap().items
        }
    };

    let by_doctor = list(
        AppointmentFilter {
            doctor_id: Some(a.id),
            ..Default::default()
        },
        today,
    )
    .await;
    assert_eq!(by_doctor.len(), 2);
    assert!(by_doctor.iter().all(|v| v.doctor.as_ref().is_some_and(|d| d.display == "Dr. A")));

    let cancelled = list(
        AppointmentFilter {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        },
        today,
    )
    .await;
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].appointment.id, first.id);

    let todays = AppointmentFilter {
        today: true,
        ..Default::default()
    };
    assert_eq!(list(todays.clone(), today).await.len(), 3);
    let tomorrow = today.succ_opt().unwrap();
    assert!(list(todays, tomorrow).await.is_empty());
}

#[tokio::test]
async fn today_cursor_expires_with_the_day() {
    let clinic = Clinic::new();
    let doc = clinic.doctor("Dr. A").await;
    let pat = clinic.patient("Kofi").await;
    clinic.book(&doc, &pat, at(9, 0), at(9, 30)).await.unwrap();
    clinic.book(&doc, &pat, at(10, 0), at(10, 30)).await.unwrap();

    let todays = AppointmentFilter {
        today: true,
        ..Default::default()
    };
    let day = at(0, 0).date_naive();
    let criteria = todays.resolve(day).unwrap();
    let page = PageRequest::build("appointment", &criteria, None, None, Some(1), MAX_PAGE_LIMIT).unwrap();
    let first = clinic.appointments().list(&clinic.scope, &criteria, &page).await.unwrap();
    let token = first.next_cursor.unwrap();

    // same day resumes
    assert!(PageRequest::build("appointment", &criteria, None, Some(&token), Some(1), MAX_PAGE_LIMIT).is_ok());

    // after midnight the same query means another window
    let next_day = todays.resolve(day.succ_opt().unwrap()).unwrap();
    let err = PageRequest::build("appointment", &next_day, None, Some(&token), Some(1), MAX_PAGE_LIMIT).unwrap_err();
    assert!(matches!(err, ClinicError::Validation { code: "CURSOR_MISMATCH", .. }));
}

#[tokio::test]
async fn patient_filters_match_substrings() {
    let clinic = Clinic::new();
    let dir = clinic.directory();
    for (name, phone, gender) in [
        ("Ama Owusu", "0241112222", Gender::Female),
        ("Kwame Owusu", "0209998888", Gender::Male),
        ("Esi Boateng", "0241113333", Gender::Female),
    ] {
        dir.create_patient(
            &clinic.scope,
            NewPatient {
                name: Some(name.into()),
                phone: Some(phone.into()),
                gender: Some(gender),
            },
            now(),
        )
        .await
        .unwrap();
    }

    let list = |filter: PatientFilter| {
        let dir = dir.clone();
        let scope = clinic.scope;
        async move {
            let filter = filter.normalize().unwrap();
            let page = PageRequest::build("patient", &filter, None, None, None, MAX_PAGE_LIMIT).unwrap();
            dir.list_patients(&scope, &filter, &page).await.unwrap().items
        }
    };

    let owusu = list(PatientFilter {
        name: Some("  owusu ".into()),
        ..Default::default()
    })
    .await;
    assert_eq!(owusu.len(), 2);

    let female_024 = list(PatientFilter {
        gender: Some(Gender::Female),
        phone: Some("0241".into()),
        ..Default::default()
    })
    .await;
    assert_eq!(female_024.len(), 2);

    let none = list(PatientFilter {
        gender: Some(Gender::Other),
        ..Default::default()
    })
    .await;
    assert!(none.is_empty());
}
