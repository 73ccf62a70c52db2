use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use clap_complete::Shell;
use fairway_core::auth::{AuthSession, SessionPersistence};
use fairway_core::config::ClientConfig;
use fairway_core::models::{
    Course, CourseDetail, EntityId, HolesPlayed, Role, SyncConflict, TeeBox, UserProfile, Visit,
    VisitFilter,
};
use pretty_assertions::assert_eq;

use crate::auth::KeyringSessionStore;
use crate::cli::{TimelineGroup, VisitCommands, WishlistCommands};
use crate::commands::common::{
    apply_cli_overrides, format_relative_time, format_sync_conflict_lines, format_sync_timestamp,
    format_to_par, format_visit_lines, location_label, normalize_identifier, parse_holes,
    parse_visit_date, validate_score, AppContext,
};
use crate::commands::completions::{render_completions, run_completions};
use crate::commands::config::init_config_at;
use crate::commands::stats::timeline_grouping;
use crate::commands::suggest::{build_suggestion, SuggestArgs};
use crate::commands::sync::run_sync;
use crate::commands::visits::{describe_visit, run_visits};
use crate::commands::wishlist::run_wishlist;
use crate::error::CliError;

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn course(id: &str) -> Course {
    let now = Utc::now();
    Course {
        id: EntityId::from(id),
        name: "Old Course".to_string(),
        address1: "Pilmour House".to_string(),
        address2: None,
        city: "St Andrews".to_string(),
        state_region: Some("Fife".to_string()),
        country: "GB".to_string(),
        postal_code: None,
        latitude: None,
        longitude: None,
        phone: None,
        website: None,
        is_approved: true,
        created_by_user_id: None,
        created_at: now,
        updated_at: now,
        server_updated_at: Some(now),
    }
}

fn visit(id: &str, to_par: Option<i32>) -> Visit {
    Visit {
        id: EntityId::from(id),
        user_id: EntityId::from("u1"),
        course_id: EntityId::from("c1"),
        visit_date: date("2024-05-01"),
        holes_played: HolesPlayed::Eighteen,
        gross_score: Some(80),
        tee_box_id: None,
        tee_name: None,
        to_par,
        server_updated_at: None,
        is_dirty: true,
        is_deleted: false,
        revision: 1,
    }
}

#[test]
fn normalize_identifier_rejects_empty() {
    assert!(matches!(
        normalize_identifier(" \n ", "Visit ID"),
        Err(CliError::EmptyArgument("Visit ID"))
    ));
    assert_eq!(
        normalize_identifier("  c1  ", "Course ID").unwrap(),
        EntityId::from("c1")
    );
}

#[test]
fn parse_visit_date_defaults_to_today_and_rejects_future() {
    let today = date("2024-06-01");
    assert_eq!(parse_visit_date(None, today).unwrap(), today);
    assert_eq!(parse_visit_date(Some("  "), today).unwrap(), today);
    assert_eq!(
        parse_visit_date(Some("2024-05-01"), today).unwrap(),
        date("2024-05-01")
    );
    assert!(matches!(
        parse_visit_date(Some("05/01/2024"), today),
        Err(CliError::InvalidArgument { field: "date", .. })
    ));
    assert!(matches!(
        parse_visit_date(Some("2024-06-02"), today),
        Err(CliError::InvalidArgument { field: "date", .. })
    ));
}

#[test]
fn holes_and_score_are_validated() {
    assert_eq!(parse_holes(9).unwrap(), HolesPlayed::Nine);
    assert_eq!(parse_holes(18).unwrap(), HolesPlayed::Eighteen);
    assert!(parse_holes(12).is_err());

    assert_eq!(validate_score(None).unwrap(), None);
    assert_eq!(validate_score(Some(78)).unwrap(), Some(78));
    assert!(validate_score(Some(0)).is_err());
}

#[test]
fn format_to_par_uses_golf_notation() {
    assert_eq!(format_to_par(Some(0)), "E");
    assert_eq!(format_to_par(Some(4)), "+4");
    assert_eq!(format_to_par(Some(-2)), "-2");
    assert_eq!(format_to_par(None), "");
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    assert_eq!(
        format_relative_time(now - chrono::Duration::seconds(30), now),
        "just now"
    );
    assert_eq!(
        format_relative_time(now - chrono::Duration::minutes(2), now),
        "2m ago"
    );
    assert_eq!(
        format_relative_time(now - chrono::Duration::hours(2), now),
        "2h ago"
    );
    assert_eq!(
        format_relative_time(now + chrono::Duration::hours(1), now),
        "just now"
    );
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    let timestamp = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(format_sync_timestamp(timestamp), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_sync_conflict_lines_include_key_fields() {
    let conflicts = vec![SyncConflict {
        id: 1,
        table_name: "visits".to_string(),
        row_id: "v1".to_string(),
        local_version: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
        incoming_version: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        resolved_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        strategy: "lww".to_string(),
    }];

    let rendered = format_sync_conflict_lines(&conflicts);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("lww"));
    assert!(rendered[0].contains("visits=v1"));
    assert!(rendered[0].contains("local=2024-02-01 00:00:00 UTC"));
    assert!(rendered[0].contains("incoming=2024-01-01 00:00:00 UTC"));
}

#[test]
fn visit_lines_show_course_name_and_pending_marker() {
    let names = HashMap::from([(EntityId::from("c1"), "Old Course".to_string())]);
    let mut synced = visit("v2", Some(0));
    synced.is_dirty = false;

    let lines = format_visit_lines(&[visit("v1", Some(8)), synced], &names);
    assert!(lines[0].starts_with("2024-05-01  Old Course"));
    assert!(lines[0].contains("+8"));
    assert!(lines[0].ends_with("(pending)"));
    assert!(lines[1].contains(" E "));
    assert!(!lines[1].contains("pending"));
}

#[test]
fn describe_visit_includes_score_relative_to_par() {
    assert_eq!(
        describe_visit(&visit("v1", Some(8))),
        "visit v1 on 2024-05-01 (18 holes, 80 +8)"
    );
}

#[test]
fn location_label_skips_missing_region() {
    let mut course = course("c1");
    assert_eq!(location_label(&course), "St Andrews, Fife, GB");
    course.state_region = None;
    assert_eq!(location_label(&course), "St Andrews, GB");
}

#[test]
fn timeline_group_maps_to_core_grouping() {
    assert_eq!(timeline_grouping(TimelineGroup::Month).as_str(), "month");
    assert_eq!(timeline_grouping(TimelineGroup::Year).as_str(), "year");
}

#[test]
fn build_suggestion_trims_and_requires_fields() {
    let args = || SuggestArgs {
        name: "  Kingsbarns ".to_string(),
        address: "Kingsbarns".to_string(),
        city: "St Andrews".to_string(),
        region: Some("  ".to_string()),
        country: "gb".to_string(),
        postal_code: None,
        phone: None,
        website: Some("https://kingsbarns.com".to_string()),
    };

    let draft = build_suggestion(args()).unwrap();
    assert_eq!(draft.name, "Kingsbarns");
    assert_eq!(draft.country, "GB");
    assert_eq!(draft.state_region, None);

    let error = build_suggestion(SuggestArgs {
        name: " ".to_string(),
        ..args()
    })
    .unwrap_err();
    assert!(matches!(error, CliError::EmptyArgument("Course name")));
}

#[test]
fn init_config_merges_values_and_rejects_bad_urls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fairway").join("config.json");

    let config = init_config_at(&path, Some("https://api.example.com/".to_string()), None).unwrap();
    assert_eq!(config.api_url, "https://api.example.com");

    let config = init_config_at(&path, None, Some(2_000)).unwrap();
    assert_eq!(config.api_url, "https://api.example.com");
    assert_eq!(config.request_timeout_ms, 2_000);

    assert!(init_config_at(&path, Some("api.example.com".to_string()), None).is_err());
    assert_eq!(
        ClientConfig::load_from_path(&path).unwrap().api_url,
        "https://api.example.com"
    );
}

#[test]
fn cli_overrides_take_precedence() {
    let mut config = ClientConfig::default();
    apply_cli_overrides(
        &mut config,
        Some("/tmp/override.db".into()),
        Some(" https://override.example.com/ ".to_string()),
    )
    .unwrap();
    assert_eq!(config.api_url, "https://override.example.com");
    assert_eq!(config.resolve_db_path(), std::path::PathBuf::from("/tmp/override.db"));

    assert!(apply_cli_overrides(&mut config, None, Some("ftp://x".to_string())).is_err());
}

#[test]
fn completions_are_written_for_fairway() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fairway.bash");
    run_completions(Shell::Bash, Some(&path)).unwrap();
    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("fairway"));

    let fish = String::from_utf8(render_completions(Shell::Fish)).unwrap();
    assert!(fish.contains("complete -c fairway"));
}

// -- end to end against an unreachable server ------------------------------------

struct Workspace {
    _dir: tempfile::TempDir,
    ctx: AppContext,
}

async fn workspace(api_url: &str, signed_in: bool, offline: bool) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        api_url: api_url.to_string(),
        request_timeout_ms: 2_000,
        db_path: Some(dir.path().join("fairway.db")),
    };

    let store = KeyringSessionStore::for_api(api_url);
    if signed_in {
        store
            .save_session(&AuthSession {
                token: "token".to_string(),
                user: UserProfile {
                    id: EntityId::from("u1"),
                    email: "golfer@example.com".to_string(),
                    display_name: "Golfer".to_string(),
                    role: Role::User,
                    public_slug: "golfer".to_string(),
                },
            })
            .unwrap();
    } else {
        store.clear_session().unwrap();
    }

    let ctx = AppContext::open(config, offline).await.unwrap();
    ctx.client
        .database()
        .upsert_courses(&[CourseDetail {
            course: course("c1"),
            tee_boxes: vec![TeeBox {
                id: EntityId::from("t1"),
                course_id: EntityId::from("c1"),
                name: "White".to_string(),
                par_total: Some(72),
                yardage_total: Some(6500),
                slope: None,
                rating: None,
                server_updated_at: None,
            }],
        }])
        .await
        .unwrap();

    Workspace { _dir: dir, ctx }
}

fn add_visit() -> VisitCommands {
    VisitCommands::Add {
        course: "c1".to_string(),
        date: Some("2024-05-01".to_string()),
        holes: 18,
        score: Some(80),
        tee: Some("t1".to_string()),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn offline_visit_is_recorded_locally() {
    let workspace = workspace("http://127.0.0.1:9/offline", true, true).await;
    let ctx = &workspace.ctx;

    run_visits(add_visit(), ctx).await.unwrap();

    let visits = ctx.client.visits(&VisitFilter::default()).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].to_par, Some(8));
    assert!(visits[0].is_dirty);
    assert_eq!(ctx.client.sync_status().await.unwrap().pending_changes, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_sync_keeps_changes_pending() {
    let workspace = workspace("http://127.0.0.1:9/unreachable", true, false).await;
    let ctx = &workspace.ctx;

    run_visits(add_visit(), ctx).await.unwrap();
    let error = run_sync(ctx).await.unwrap_err();
    assert!(matches!(error, CliError::SyncFailed(_)));
    assert_eq!(ctx.client.sync_status().await.unwrap().pending_changes, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn removing_unlisted_course_succeeds_without_changes() {
    let workspace = workspace("http://127.0.0.1:9/wishlist", true, true).await;
    let ctx = &workspace.ctx;

    run_wishlist(
        WishlistCommands::Remove {
            course: "c1".to_string(),
        },
        ctx,
    )
    .await
    .unwrap();
    assert_eq!(ctx.client.sync_status().await.unwrap().pending_changes, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn user_commands_require_sign_in() {
    let workspace = workspace("http://127.0.0.1:9/anonymous", false, true).await;

    let error = run_visits(add_visit(), &workspace.ctx).await.unwrap_err();
    assert!(matches!(error, CliError::NotSignedIn));
}
