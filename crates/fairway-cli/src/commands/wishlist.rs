use crate::cli::WishlistCommands;
use crate::commands::common::{
    format_course_lines, normalize_identifier, print_json, print_lines, AppContext,
};
use crate::error::CliError;

pub async fn run_wishlist(command: WishlistCommands, ctx: &AppContext) -> Result<(), CliError> {
    ctx.require_user()?;
    match command {
        WishlistCommands::List { json } => {
            let entries = ctx.client.wishlist().await?;
            if json {
                return print_json(&entries);
            }

            let mut courses = Vec::with_capacity(entries.len());
            for entry in &entries {
                if let Some(course) = ctx.client.database().get_course(&entry.course_id).await? {
                    courses.push(course);
                }
            }
            print_lines(&format_course_lines(&courses), "Your wishlist is empty.");
            Ok(())
        }
        WishlistCommands::Add { course } => {
            let course_id = normalize_identifier(&course, "Course ID")?;
            ctx.ensure_course(&course_id).await?;
            let mutation = ctx.client.add_to_wishlist(&course_id).await?;
            println!("Wishlisted {}", mutation.value.course_id);
            ctx.sync_after_write().await
        }
        WishlistCommands::Remove { course } => {
            let course_id = normalize_identifier(&course, "Course ID")?;
            let mutation = ctx.client.remove_from_wishlist(&course_id).await?;
            if mutation.value.is_none() {
                println!("{course_id} is not on your wishlist");
                return Ok(());
            }
            println!("Removed {course_id} from your wishlist");
            ctx.sync_after_write().await
        }
    }
}
