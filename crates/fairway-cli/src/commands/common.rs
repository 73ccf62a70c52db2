use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use fairway_core::auth::AuthService;
use fairway_core::config::ClientConfig;
use fairway_core::gateway::{HttpGateway, RemoteGateway};
use fairway_core::models::{
    Course, CourseDetail, EntityId, HolesPlayed, StatsOverview, StatsTimelinePoint, SyncConflict,
    UserProfile, Visit, VisitedCourse,
};
use fairway_core::services::DatabaseService;
use fairway_core::sync::{SyncEngine, SyncReport, SyncStatus, SyncTrigger};
use fairway_core::util::{normalize_base_url, normalize_text_option};
use fairway_core::{FairwayClient, Session};

use crate::auth::KeyringSessionStore;
use crate::error::CliError;

/// Everything a command needs: façade, auth flows and a sync engine sharing
/// one session.
pub struct AppContext {
    pub config: ClientConfig,
    pub client: FairwayClient,
    pub auth: AuthService<KeyringSessionStore>,
    engine: SyncEngine,
    offline: bool,
}

impl AppContext {
    pub async fn open(config: ClientConfig, offline: bool) -> Result<Self, CliError> {
        let db = DatabaseService::open_path(config.resolve_db_path()).await?;
        let session = Session::new();
        let gateway: Arc<dyn RemoteGateway> =
            Arc::new(HttpGateway::from_config(&config, session.clone())?);

        let client = FairwayClient::new(session.clone(), db.clone(), Arc::clone(&gateway));
        let auth = client.auth(KeyringSessionStore::for_api(&config.api_url));
        if let Some(user) = auth.restore_session()? {
            tracing::debug!("Restored session for {}", user.email);
        }
        let engine = SyncEngine::new(db, gateway, session);

        Ok(Self {
            config,
            client,
            auth,
            engine,
            offline,
        })
    }

    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn require_user(&self) -> Result<UserProfile, CliError> {
        self.client.session().user().ok_or(CliError::NotSignedIn)
    }

    /// Make sure `course_id` is in the local catalog before a row references
    /// it, fetching the detail from the server when needed.
    pub async fn ensure_course(&self, course_id: &EntityId) -> Result<(), CliError> {
        if !self.client.database().course_exists(course_id).await? {
            self.client.course_detail(course_id).await?;
        }
        Ok(())
    }

    /// Upload a local write right away unless running offline. A failed
    /// upload leaves the change queued for the next `fairway sync`.
    pub async fn sync_after_write(&self) -> Result<(), CliError> {
        if self.offline {
            println!("Saved locally; run `fairway sync` to upload.");
            return Ok(());
        }

        if let Some(reason) = self
            .engine
            .sync_now(SyncTrigger::Manual)
            .await?
            .and_then(|report| report.error_summary())
        {
            tracing::warn!("Sync after write incomplete: {}", reason);
            println!("Saved locally; will upload on next sync ({reason}).");
        }
        Ok(())
    }
}

/// Config file plus environment, then command-line overrides.
pub fn load_config(
    db_path: Option<PathBuf>,
    api_url: Option<String>,
) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::load()?;
    apply_cli_overrides(&mut config, db_path, api_url)?;
    Ok(config)
}

pub fn apply_cli_overrides(
    config: &mut ClientConfig,
    db_path: Option<PathBuf>,
    api_url: Option<String>,
) -> Result<(), CliError> {
    if let Some(path) = db_path {
        config.db_path = Some(path);
    }
    if let Some(url) = normalize_text_option(api_url) {
        config.api_url = normalize_base_url(&url);
    }
    config.validate()?;
    Ok(())
}

// -- argument parsing ---------------------------------------------------------

pub fn normalize_identifier(id: &str, field: &'static str) -> Result<EntityId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyArgument(field))
    } else {
        Ok(EntityId::from(trimmed))
    }
}

pub fn parse_visit_date(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(today);
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        CliError::InvalidArgument {
            field: "date",
            message: format!("expected YYYY-MM-DD, got '{raw}'"),
        }
    })?;
    if date > today {
        return Err(CliError::InvalidArgument {
            field: "date",
            message: format!("{date} is in the future"),
        });
    }
    Ok(date)
}

pub fn parse_holes(raw: u8) -> Result<HolesPlayed, CliError> {
    HolesPlayed::try_from(raw).map_err(|message| CliError::InvalidArgument {
        field: "holes",
        message,
    })
}

pub fn validate_score(score: Option<i32>) -> Result<Option<i32>, CliError> {
    match score {
        Some(value) if value <= 0 => Err(CliError::InvalidArgument {
            field: "score",
            message: format!("must be positive, got {value}"),
        }),
        other => Ok(other),
    }
}

// -- rendering ------------------------------------------------------------------

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_lines(lines: &[String], empty_message: &str) {
    if lines.is_empty() {
        println!("{empty_message}");
        return;
    }
    for line in lines {
        println!("{line}");
    }
}

pub fn location_label(course: &Course) -> String {
    let mut parts = vec![course.city.as_str()];
    if let Some(region) = course.state_region.as_deref() {
        parts.push(region);
    }
    parts.push(course.country.as_str());
    parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_to_par(to_par: Option<i32>) -> String {
    match to_par {
        Some(0) => "E".to_string(),
        Some(value) if value > 0 => format!("+{value}"),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

pub fn format_course_lines(courses: &[Course]) -> Vec<String> {
    courses
        .iter()
        .map(|course| {
            format!(
                "{}  {:<36}  {}",
                course.id,
                truncate(&course.name, 36),
                location_label(course)
            )
        })
        .collect()
}

pub fn format_course_detail_lines(detail: &CourseDetail) -> Vec<String> {
    let course = &detail.course;
    let mut lines = vec![
        course.name.clone(),
        format!("  id:       {}", course.id),
        format!("  address:  {}", course.address1),
        format!("  location: {}", location_label(course)),
    ];
    if let Some(website) = course.website.as_deref() {
        lines.push(format!("  website:  {website}"));
    }
    if detail.tee_boxes.is_empty() {
        lines.push("  no tee boxes listed".to_string());
    }
    for tee in &detail.tee_boxes {
        let par = tee.par_total.map_or_else(|| "-".to_string(), |par| par.to_string());
        let yards = tee
            .yardage_total
            .map_or_else(|| "-".to_string(), |yards| yards.to_string());
        lines.push(format!(
            "  tee {:<12} par {:<3} {:>5} yds  ({})",
            tee.name, par, yards, tee.id
        ));
    }
    lines
}

pub fn format_visit_lines(visits: &[Visit], course_names: &HashMap<EntityId, String>) -> Vec<String> {
    visits
        .iter()
        .map(|visit| {
            let course = course_names
                .get(&visit.course_id)
                .map_or_else(|| visit.course_id.to_string(), |name| truncate(name, 32));
            let score = visit
                .gross_score
                .map_or_else(|| "-".to_string(), |score| score.to_string());
            let pending = if visit.is_dirty { "  (pending)" } else { "" };
            format!(
                "{}  {:<32}  {:>2} holes  {:>3} {:<3}  {}{}",
                visit.visit_date,
                course,
                visit.holes_played.count(),
                score,
                format_to_par(visit.to_par),
                visit.id,
                pending
            )
        })
        .collect()
}

pub fn format_visited_course_lines(visited: &[VisitedCourse]) -> Vec<String> {
    visited
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<36}  {:>3} visit(s)  last {}",
                entry.course.id,
                truncate(&entry.course.name, 36),
                entry.visit_count,
                entry.last_visit_date
            )
        })
        .collect()
}

pub fn format_stats_overview_lines(stats: &StatsOverview) -> Vec<String> {
    let mut lines = vec![
        format!("Courses played:       {}", stats.total_courses),
        format!("Visits:               {}", stats.total_visits),
        format!(
            "Most recent visit:    {}",
            stats.most_recent_visit_date.as_deref().unwrap_or("-")
        ),
        format!("Longest month streak: {}", stats.longest_month_streak),
    ];
    if !stats.visits_by_year.is_empty() {
        lines.push("By year:".to_string());
        lines.extend(
            stats
                .visits_by_year
                .iter()
                .map(|year| format!("  {}  {}", year.year, year.count)),
        );
    }
    if !stats.visits_by_region.is_empty() {
        lines.push("By region:".to_string());
        lines.extend(stats.visits_by_region.iter().map(|region| {
            let label = region.region.as_deref().map_or_else(
                || region.country.clone(),
                |name| format!("{name}, {}", region.country),
            );
            format!("  {label:<24}  {}", region.count)
        }));
    }
    lines
}

pub fn format_timeline_lines(points: &[StatsTimelinePoint]) -> Vec<String> {
    points
        .iter()
        .map(|point| {
            format!(
                "{:<8}  {:>3} visit(s)  {:>3} course(s)",
                point.period, point.visits, point.courses_played
            )
        })
        .collect()
}

pub fn format_sync_report(report: &SyncReport) -> String {
    format!(
        "Sync completed: pushed {}, pulled {} ({} conflict(s)) in {} ms",
        report.push.pushed,
        report.pull.applied(),
        report.pull.conflicts(),
        (report.finished_at - report.started_at).num_milliseconds()
    )
}

pub fn format_sync_status_lines(
    status: &SyncStatus,
    catalog_checkpoint: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = vec![
        format!("Pending changes: {}", status.pending_changes),
        format!(
            "Catalog synced:  {}",
            catalog_checkpoint.map_or_else(
                || "never".to_string(),
                |checkpoint| format!(
                    "{} ({})",
                    format_sync_timestamp(checkpoint),
                    format_relative_time(checkpoint, now)
                ),
            )
        ),
    ];
    if let Some(error) = status.last_error.as_deref() {
        lines.push(format!("Last error:      {error}"));
    }
    lines
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.table_name,
                conflict.row_id,
                conflict
                    .local_version
                    .map_or_else(|| "none".to_string(), format_sync_timestamp),
                format_sync_timestamp(conflict.incoming_version)
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
