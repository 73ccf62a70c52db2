use fairway_core::models::TimelineGrouping;

use crate::cli::{StatsCommands, TimelineGroup};
use crate::commands::common::{
    format_stats_overview_lines, format_timeline_lines, print_json, print_lines, AppContext,
};
use crate::error::CliError;

pub async fn run_stats(command: StatsCommands, ctx: &AppContext) -> Result<(), CliError> {
    match command {
        StatsCommands::Overview { json } => {
            ctx.require_user()?;
            let stats = ctx.client.stats_overview().await?;
            if json {
                return print_json(&stats);
            }
            print_lines(&format_stats_overview_lines(&stats), "");
            Ok(())
        }
        StatsCommands::Timeline { by, json } => {
            ctx.require_user()?;
            let points = ctx.client.stats_timeline(timeline_grouping(by)).await?;
            if json {
                return print_json(&points);
            }
            print_lines(&format_timeline_lines(&points), "No visits recorded.");
            Ok(())
        }
        StatsCommands::Profile { slug, visits, json } => {
            if visits {
                let visited = ctx.client.public_visited_courses(&slug).await?;
                if json {
                    return print_json(&visited);
                }
                let lines = visited
                    .iter()
                    .map(|visit| format!("{}  {}", visit.visit_date, visit.course_id))
                    .collect::<Vec<_>>();
                print_lines(&lines, "No public visits.");
                return Ok(());
            }

            let stats = ctx.client.public_stats(&slug).await?;
            if json {
                return print_json(&stats);
            }
            print_lines(&format_stats_overview_lines(&stats), "");
            Ok(())
        }
    }
}

pub const fn timeline_grouping(group: TimelineGroup) -> TimelineGrouping {
    match group {
        TimelineGroup::Year => TimelineGrouping::Year,
        TimelineGroup::Month => TimelineGrouping::Month,
    }
}
