//! Course catalog models (server-owned)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// A golf course from the remote catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: EntityId,
    pub name: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state_region: Option<String>,
    pub country: String,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    pub created_by_user_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last known server version marker
    pub server_updated_at: Option<DateTime<Utc>>,
}

impl Course {
    /// Version used for delta checkpoints and last-write-wins.
    ///
    /// Falls back to `updated_at` for payloads that omit `serverUpdatedAt`;
    /// both values come from the server.
    #[must_use]
    pub fn version(&self) -> DateTime<Utc> {
        self.server_updated_at.unwrap_or(self.updated_at)
    }
}

/// A set of tees on a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeBox {
    pub id: EntityId,
    pub course_id: EntityId,
    pub name: String,
    pub par_total: Option<i32>,
    pub yardage_total: Option<i32>,
    pub slope: Option<f64>,
    pub rating: Option<f64>,
    pub server_updated_at: Option<DateTime<Utc>>,
}

/// Course with its tee boxes, as returned by the detail and delta endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    #[serde(default)]
    pub tee_boxes: Vec<TeeBox>,
}

impl CourseDetail {
    /// Par for the given tee box, when known.
    pub fn par_for(&self, tee_box_id: &EntityId) -> Option<i32> {
        self.tee_boxes
            .iter()
            .find(|tee_box| &tee_box.id == tee_box_id)
            .and_then(|tee_box| tee_box.par_total)
    }
}

/// Filters accepted by the course list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// `lat,long`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub near: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<u32>,
}

/// A course the user has played, with local aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedCourse {
    pub course: Course,
    pub visit_count: i64,
    pub last_visit_date: chrono::NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_detail_reads_flattened_payload() {
        let payload = r#"{
            "id": "c1",
            "name": "Old Course",
            "address1": "Pilmour House",
            "city": "St Andrews",
            "country": "GB",
            "isApproved": true,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-02-01T00:00:00Z",
            "teeBoxes": [
                {"id": "t1", "courseId": "c1", "name": "White", "parTotal": 72}
            ]
        }"#;

        let detail: CourseDetail = serde_json::from_str(payload).unwrap();
        assert_eq!(detail.course.name, "Old Course");
        assert!(detail.course.server_updated_at.is_none());
        assert_eq!(
            detail.course.version().to_rfc3339(),
            "2024-02-01T00:00:00+00:00"
        );
        assert_eq!(detail.par_for(&EntityId::from("t1")), Some(72));
    }

    #[test]
    fn search_params_skip_empty_fields() {
        let params = CourseSearchParams {
            search: Some("links".to_string()),
            radius_km: Some(25),
            ..CourseSearchParams::default()
        };
        let encoded = serde_json::to_value(&params).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"search": "links", "radiusKm": 25})
        );
    }
}
