use crate::{event::*, helper::MessageHelper, plugin::*};
use anyhow::Result;
use serenity::all::Message;

/// Win tallies: `;win` records wins for the mentioned members,
/// `;leaderboard` shows the standings.
pub struct Wins;

#[serenity::async_trait]
impl Plugin for Wins {
    fn name(&self) -> &'static str {
        "wins"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}win <@member…> - record a scrim win for the mentioned members (bot owner only)\n\
             {}leaderboard - show win standings",
            prefix, prefix
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        if let Some((msg, _)) = event.is_bot_cmd(ctx, "win").await {
            return handle_win(ctx, msg).await;
        }
        if let Some((msg, _)) = event.is_bot_cmd(ctx, "leaderboard").await {
            return handle_leaderboard(ctx, msg).await;
        }
        Ok(EventHandled::No)
    }
}

/// Usage: ;win <@member…>
async fn handle_win(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    if !msg.is_from_owner(ctx).await {
        msg.reply(ctx.cache_http, "Only a bot owner can record wins")
            .await?;
        return Ok(EventHandled::Yes);
    }

    let winners: Vec<_> = msg.mentions.iter().filter(|user| !user.bot).collect();
    if winners.is_empty() {
        msg.reply(ctx.cache_http, "Mention the member(s) who won, e.g. `win @name`")
            .await?;
        return Ok(EventHandled::Yes);
    }

    let mut lines = Vec::new();
    {
        let mut pstate = ctx.pstate.write().await;
        for winner in &winners {
            let total = pstate.wins.record_win(winner.id);
            lines.push(format!("**{}** is now at {} win(s)", winner.name, total));
        }
        pstate.wins.save().await?;
    }

    msg.reply(ctx.cache_http, lines.join("\n")).await?;
    Ok(EventHandled::Yes)
}

/// Usage: ;leaderboard
async fn handle_leaderboard(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let standings = ctx.pstate.read().await.wins.standings();
    if standings.is_empty() {
        msg.reply(ctx.cache_http, "No wins recorded yet").await?;
        return Ok(EventHandled::Yes);
    }

    let mut response = String::from("**Leaderboard:**\n");
    for (rank, (user_id, wins)) in standings.iter().enumerate() {
        response.push_str(&format!("{}. <@{}> – {} win(s)\n", rank + 1, user_id, wins));
    }

    msg.reply(ctx.cache_http, response).await?;
    Ok(EventHandled::Yes)
}
