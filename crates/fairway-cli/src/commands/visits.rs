use std::collections::HashMap;

use chrono::Local;
use fairway_core::models::{EntityId, Visit, VisitDraft, VisitFilter, VisitPatch};
use fairway_core::util::normalize_text_option;

use crate::cli::VisitCommands;
use crate::commands::common::{
    format_to_par, format_visit_lines, format_visited_course_lines, normalize_identifier,
    parse_holes, parse_visit_date, print_json, print_lines, validate_score, AppContext,
};
use crate::error::CliError;

pub async fn run_visits(command: VisitCommands, ctx: &AppContext) -> Result<(), CliError> {
    ctx.require_user()?;
    match command {
        VisitCommands::List {
            course,
            year,
            country,
            limit,
            json,
        } => {
            let filter = VisitFilter {
                course_id: normalize_text_option(course).map(EntityId::from),
                year,
                country: normalize_text_option(country),
                limit: Some(limit),
                offset: None,
            };
            let visits = ctx.client.visits(&filter).await?;
            if json {
                return print_json(&visits);
            }
            let names = course_names(ctx, &visits).await?;
            print_lines(&format_visit_lines(&visits, &names), "No visits recorded.");
            Ok(())
        }
        VisitCommands::Add {
            course,
            date,
            holes,
            score,
            tee,
        } => {
            let today = Local::now().date_naive();
            let course_id = normalize_identifier(&course, "Course ID")?;
            let draft = VisitDraft {
                gross_score: validate_score(score)?,
                tee_box_id: normalize_text_option(tee).map(EntityId::from),
                ..VisitDraft::new(
                    course_id.clone(),
                    parse_visit_date(date.as_deref(), today)?,
                    parse_holes(holes)?,
                )
            };

            ctx.ensure_course(&course_id).await?;
            let mutation = ctx.client.record_visit(draft).await?;
            println!("Recorded {}", describe_visit(&mutation.value));
            ctx.sync_after_write().await
        }
        VisitCommands::Edit {
            id,
            date,
            holes,
            score,
            tee,
        } => {
            let id = normalize_identifier(&id, "Visit ID")?;
            let today = Local::now().date_naive();
            let patch = VisitPatch {
                visit_date: date
                    .as_deref()
                    .map(|raw| parse_visit_date(Some(raw), today))
                    .transpose()?,
                holes_played: holes.map(parse_holes).transpose()?,
                gross_score: validate_score(score)?,
                tee_box_id: normalize_text_option(tee).map(EntityId::from),
                tee_name: None,
            };
            if patch.is_empty() {
                return Err(CliError::EmptyVisitEdit);
            }

            let mutation = ctx.client.update_visit(&id, patch).await?;
            println!("Updated {}", describe_visit(&mutation.value));
            ctx.sync_after_write().await
        }
        VisitCommands::Delete { id } => {
            let id = normalize_identifier(&id, "Visit ID")?;
            let mutation = ctx.client.delete_visit(&id).await?;
            println!("Deleted {}", describe_visit(&mutation.value));
            ctx.sync_after_write().await
        }
        VisitCommands::Courses { json } => {
            let visited = ctx.client.visited_courses().await?;
            if json {
                return print_json(&visited);
            }
            print_lines(
                &format_visited_course_lines(&visited),
                "No courses played yet.",
            );
            Ok(())
        }
    }
}

async fn course_names(
    ctx: &AppContext,
    visits: &[Visit],
) -> Result<HashMap<EntityId, String>, CliError> {
    let mut names = HashMap::new();
    for visit in visits {
        if names.contains_key(&visit.course_id) {
            continue;
        }
        if let Some(course) = ctx.client.database().get_course(&visit.course_id).await? {
            names.insert(course.id, course.name);
        }
    }
    Ok(names)
}

pub fn describe_visit(visit: &Visit) -> String {
    let mut label = format!(
        "visit {} on {} ({} holes",
        visit.id,
        visit.visit_date,
        visit.holes_played.count()
    );
    if let Some(score) = visit.gross_score {
        label.push_str(&format!(", {score}"));
        let to_par = format_to_par(visit.to_par);
        if !to_par.is_empty() {
            label.push_str(&format!(" {to_par}"));
        }
    }
    label.push(')');
    label
}
