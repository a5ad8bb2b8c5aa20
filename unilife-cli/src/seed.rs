//! Demo data for local development.

use std::fmt;

use unilife_core::{Course, CourseSlot, Faculty, NewUser, SqliteStore, StoreError};

/// Refreshed by the scheduler once seeded. Coordinates match the ones users
/// report, so both read and refresh the same stored weather.
const LOCATIONS: [(&str, f64, f64); 2] =
    [("Corfu", 39.6243, 19.9217), ("Thessaloniki", 40.6401, 22.9444)];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub courses: usize,
    pub faculties: usize,
    pub locations: usize,
    pub tokens: Vec<(String, String)>,
}

impl fmt::Display for SeedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Seeded {} users, {} courses, {} faculties, {} locations",
            self.users, self.courses, self.faculties, self.locations
        )?;
        for (email, token) in &self.tokens {
            writeln!(f, "  {email}: Bearer {token}")?;
        }
        Ok(())
    }
}

fn demo_users() -> Vec<NewUser> {
    vec![
        NewUser {
            email: "user@email.com".into(),
            username: Some("test_user".into()),
            name: "Test User".into(),
            token: "dev-token-test-user".into(),
            lat: Some(39.6243),
            lng: Some(19.9217),
        },
        NewUser {
            email: "johndoe@email.com".into(),
            username: Some("JohnDoe".into()),
            name: "John Doe".into(),
            token: "dev-token-johndoe".into(),
            lat: None,
            lng: None,
        },
    ]
}

/// Courses for the seeded users, in insertion order.
fn demo_courses(user_ids: &[i64]) -> Vec<Course> {
    let [first, second] = user_ids else {
        return Vec::new();
    };

    vec![
        Course {
            user_id: *first,
            name: "Networks".into(),
            semester: Some(3),
            professor: None,
            grade: Some(9.0),
            schedule: Vec::new(),
        },
        Course {
            user_id: *second,
            name: "French translation".into(),
            semester: Some(1),
            professor: None,
            grade: None,
            schedule: vec![CourseSlot { day: 3, start: 520, end: 660 }],
        },
    ]
}

fn demo_faculties() -> Vec<Faculty> {
    vec![
        Faculty { name: "Ionian University".into(), dean: None, city: Some("Corfu".into()) },
        Faculty {
            name: "Aristotle University".into(),
            dean: None,
            city: Some("Thessaloniki".into()),
        },
    ]
}

/// Purge every table, then insert the demo users, courses, faculties and
/// locations.
pub fn seed(store: &SqliteStore) -> Result<SeedSummary, StoreError> {
    store.purge()?;
    log::info!("[Seed] database purged");

    let mut summary = SeedSummary::default();
    let mut ids = Vec::new();
    for user in demo_users() {
        ids.push(store.insert_user(&user)?);
        summary.tokens.push((user.email, user.token));
    }
    summary.users = ids.len();
    log::info!("[Seed] {} users added", summary.users);

    for course in demo_courses(&ids) {
        store.insert_course(&course)?;
        summary.courses += 1;
    }
    log::info!("[Seed] {} courses added", summary.courses);

    for faculty in demo_faculties() {
        store.insert_faculty(&faculty)?;
        summary.faculties += 1;
    }
    log::info!("[Seed] {} faculties added", summary.faculties);

    for (name, lat, lng) in LOCATIONS {
        store.insert_location(name, Some(lat), Some(lng))?;
        summary.locations += 1;
    }
    log::info!("[Seed] {} locations added", summary.locations);

    Ok(summary)
}
