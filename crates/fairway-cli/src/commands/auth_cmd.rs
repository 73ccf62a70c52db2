use crate::cli::AuthCommands;
use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, ctx: &AppContext) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { email, password } => {
            let user = ctx.auth.sign_in(&email, &password).await?;
            println!("Signed in to {} as {}", ctx.config.api_url, user.email);
            Ok(())
        }
        AuthCommands::Register {
            email,
            password,
            display_name,
        } => {
            let user = ctx.auth.register(&email, &password, &display_name).await?;
            println!(
                "Registered and signed in as {} (profile: {})",
                user.email, user.public_slug
            );
            Ok(())
        }
        AuthCommands::Status { refresh } => {
            let user = if refresh {
                ctx.auth.refresh_profile().await?
            } else {
                ctx.client.session().user()
            };

            match user {
                Some(user) => println!(
                    "Signed in to {} as {} ({}, role {:?})",
                    ctx.config.api_url, user.email, user.display_name, user.role
                ),
                None => println!("Not signed in to {}", ctx.config.api_url),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            ctx.auth.sign_out()?;
            println!("Signed out of {}", ctx.config.api_url);
            Ok(())
        }
    }
}
