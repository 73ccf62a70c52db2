use fairway_core::models::{EntityId, SuggestionDraft};
use fairway_core::util::normalize_text_option;

use crate::commands::common::AppContext;
use crate::error::CliError;

/// Raw `fairway suggest` arguments
pub struct SuggestArgs {
    pub name: String,
    pub address: String,
    pub city: String,
    pub region: Option<String>,
    pub country: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

pub fn build_suggestion(args: SuggestArgs) -> Result<SuggestionDraft, CliError> {
    let required = |value: String, field: &'static str| {
        normalize_text_option(Some(value)).ok_or(CliError::EmptyArgument(field))
    };

    Ok(SuggestionDraft {
        id: EntityId::new(),
        name: required(args.name, "Course name")?,
        address1: required(args.address, "Address")?,
        address2: None,
        city: required(args.city, "City")?,
        state_region: normalize_text_option(args.region),
        country: required(args.country, "Country")?.to_uppercase(),
        postal_code: normalize_text_option(args.postal_code),
        phone: normalize_text_option(args.phone),
        website: normalize_text_option(args.website),
    })
}

pub async fn run_suggest(args: SuggestArgs, ctx: &AppContext) -> Result<(), CliError> {
    ctx.require_user()?;
    let draft = build_suggestion(args)?;
    let mutation = ctx.client.suggest_course(draft).await?;
    println!(
        "Suggested {} ({}); awaiting moderation",
        mutation.value.name, mutation.value.id
    );
    ctx.sync_after_write().await
}
