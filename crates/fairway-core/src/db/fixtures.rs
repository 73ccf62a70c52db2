//! Test fixtures shared by repository and sync tests

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{Course, CourseDetail, EntityId, TeeBox};

pub fn ts(raw: &str) -> DateTime<Utc> {
    super::store::parse_timestamp(raw).unwrap()
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

pub fn course(id: &str, version: &str) -> Course {
    Course {
        id: EntityId::from(id),
        name: format!("Course {id}"),
        address1: "1 Fairway Road".to_string(),
        address2: None,
        city: "St Andrews".to_string(),
        state_region: Some("Fife".to_string()),
        country: "GB".to_string(),
        postal_code: None,
        latitude: Some(56.34),
        longitude: Some(-2.80),
        phone: None,
        website: None,
        is_approved: true,
        created_by_user_id: None,
        created_at: ts("2023-01-01"),
        updated_at: ts(version),
        server_updated_at: Some(ts(version)),
    }
}

pub fn detail(id: &str, version: &str, tees: &[(&str, Option<i32>)]) -> CourseDetail {
    CourseDetail {
        course: course(id, version),
        tee_boxes: tees
            .iter()
            .map(|(tee_id, par)| TeeBox {
                id: EntityId::from(*tee_id),
                course_id: EntityId::from(id),
                name: format!("Tee {tee_id}"),
                par_total: *par,
                yardage_total: Some(6500),
                slope: Some(125.0),
                rating: Some(71.2),
                server_updated_at: Some(ts(version)),
            })
            .collect(),
    }
}
