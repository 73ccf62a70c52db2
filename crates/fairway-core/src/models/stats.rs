//! Statistics payloads computed by the server

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total_courses: i64,
    pub total_visits: i64,
    pub most_recent_visit_date: Option<String>,
    #[serde(default)]
    pub visits_by_year: Vec<YearCount>,
    #[serde(default)]
    pub visits_by_region: Vec<RegionCount>,
    #[serde(default)]
    pub longest_month_streak: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub country: String,
    pub region: Option<String>,
    pub count: i64,
}

/// Bucket size for the visit timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimelineGrouping {
    #[default]
    Year,
    Month,
}

impl TimelineGrouping {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for TimelineGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsTimelinePoint {
    pub period: String,
    pub visits: i64,
    pub courses_played: i64,
}
