use crate::services::localization::ContextL10nExt;
use crate::{Context, Error};
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;

const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;
const MAX_LISTED_INVITEES: usize = 50;

/// Referral statistics
#[poise::command(
    slash_command,
    guild_only,
    subcommands("count", "list", "leaderboard")
)]
pub async fn invites(ctx: Context<'_>) -> Result<(), Error> {
    let l10n = ctx.l10n_user();
    ctx.send(
        poise::CreateReply::default()
            .content(l10n.t("invites-parent-hint", None))
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

/// Replies with a notice and returns false outside the tracked guild.
async fn ensure_tracked_guild(ctx: Context<'_>) -> Result<bool, Error> {
    if ctx.guild_id() == Some(ctx.data().config.guild_id) {
        return Ok(true);
    }

    ctx.send(
        poise::CreateReply::default()
            .content(ctx.l10n_user().t("invites-wrong-guild", None))
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}

/// How many members a user has brought in
#[poise::command(slash_command, guild_only)]
pub async fn count(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    if !ensure_tracked_guild(ctx).await? {
        return Ok(());
    }

    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    let count = ctx.data().ledger.referral_count(target.id).await?;

    let mut args = FluentArgs::new();
    args.set("user", format!("<@{}>", target.id));
    args.set("count", count);

    ctx.send(
        poise::CreateReply::default()
            .content(ctx.l10n_user().t("invites-count", Some(&args)))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;

    Ok(())
}

/// Members a user has invited who are still here
#[poise::command(slash_command, guild_only)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    if !ensure_tracked_guild(ctx).await? {
        return Ok(());
    }

    ctx.defer().await?;

    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    let invitees = ctx.data().ledger.invitees_of(target.id).await?;
    let l10n = ctx.l10n_user();

    let mut args = FluentArgs::new();
    args.set("user", format!("<@{}>", target.id));

    let response = if invitees.is_empty() {
        l10n.t("invites-list-empty", Some(&args))
    } else {
        args.set("count", invitees.len());
        let mut response = l10n.t("invites-list-header", Some(&args));
        response.push('\n');
        for invitee in invitees.iter().take(MAX_LISTED_INVITEES) {
            response.push_str(&format!("• <@{}>\n", invitee));
        }
        if invitees.len() > MAX_LISTED_INVITEES {
            response.push_str(&format!("… +{}\n", invitees.len() - MAX_LISTED_INVITEES));
        }
        response
    };

    ctx.send(
        poise::CreateReply::default()
            .content(response)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;

    Ok(())
}

/// Top inviters of the server
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Number of users to show (default: 10)"]
    #[min = 1]
    #[max = 50]
    limit: Option<u32>,
) -> Result<(), Error> {
    if !ensure_tracked_guild(ctx).await? {
        return Ok(());
    }

    ctx.defer().await?;

    let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let top_inviters = ctx.data().ledger.top_inviters(u64::from(limit)).await?;
    let l10n = ctx.l10n_user();

    let mut args = FluentArgs::new();
    args.set("limit", limit);
    let mut response = l10n.t("invites-leaderboard-header", Some(&args));
    response.push_str("\n\n");

    if top_inviters.is_empty() {
        response.push_str(&l10n.t("invites-leaderboard-empty", None));
    } else {
        for (idx, (inviter_id, count)) in top_inviters.iter().enumerate() {
            let medal = match idx {
                0 => "🥇",
                1 => "🥈",
                2 => "🥉",
                _ => "  ",
            };

            let mut args = FluentArgs::new();
            args.set("rank", idx + 1);
            args.set("user", format!("<@{}>", inviter_id));
            args.set("count", *count);
            response.push_str(&format!(
                "{} {}\n",
                medal,
                l10n.t("invites-leaderboard-entry", Some(&args))
            ));
        }
    }

    ctx.send(
        poise::CreateReply::default()
            .content(response)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;

    Ok(())
}

pub fn commands() -> Vec<poise::Command<crate::Data, Error>> {
    vec![invites()]
}
