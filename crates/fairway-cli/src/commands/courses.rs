use fairway_core::models::CourseSearchParams;
use fairway_core::util::normalize_text_option;

use crate::cli::CourseCommands;
use crate::commands::common::{
    format_course_detail_lines, format_course_lines, normalize_identifier, print_json,
    print_lines, AppContext,
};
use crate::error::CliError;

pub async fn run_courses(command: CourseCommands, ctx: &AppContext) -> Result<(), CliError> {
    match command {
        CourseCommands::Search {
            query,
            country,
            region,
            limit,
            json,
        } => {
            let params = CourseSearchParams {
                search: normalize_text_option(query),
                country: normalize_text_option(country),
                region: normalize_text_option(region),
                take: Some(limit),
                ..CourseSearchParams::default()
            };
            let courses = ctx.client.courses(&params).await?;
            if json {
                print_json(&courses)
            } else {
                print_lines(&format_course_lines(&courses), "No courses found.");
                Ok(())
            }
        }
        CourseCommands::Show { id, json } => {
            let id = normalize_identifier(&id, "Course ID")?;
            let detail = ctx.client.course_detail(&id).await?;
            if json {
                print_json(&detail)
            } else {
                print_lines(&format_course_detail_lines(&detail), "");
                Ok(())
            }
        }
    }
}
