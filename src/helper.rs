//! Miscellaneous convenience methods

use crate::context::Context;
use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, GuildId, RoleId, UserId};
use serenity::http::{HttpError, StatusCode};
use std::collections::HashSet;

/// True when an API error is Discord telling us the target no longer exists.
pub fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code == StatusCode::NOT_FOUND
    )
}

/// Current holders of a role, read from the member cache.
pub fn role_holders(
    ctx: &Context<'_>,
    guild_id: GuildId,
    role_id: RoleId,
) -> Result<HashSet<UserId>> {
    let guild = guild_id
        .to_guild_cached(ctx.cache)
        .ok_or(anyhow!("Guild {} is not in the cache", guild_id))?;

    Ok(guild
        .members
        .values()
        .filter(|member| member.roles.contains(&role_id))
        .map(|member| member.user.id)
        .collect())
}

/// Everyone currently connected to a voice channel, bots excluded.  One
/// cache snapshot; a member who moves channels mid-pass is picked up on the
/// next one.
pub fn voice_occupancy(ctx: &Context<'_>, guild_id: GuildId) -> Result<Vec<(UserId, ChannelId)>> {
    let guild = guild_id
        .to_guild_cached(ctx.cache)
        .ok_or(anyhow!("Guild {} is not in the cache", guild_id))?;

    Ok(guild
        .voice_states
        .iter()
        .filter_map(|(user_id, voice)| voice.channel_id.map(|channel_id| (*user_id, channel_id)))
        .filter(|(user_id, _)| {
            !guild
                .members
                .get(user_id)
                .is_some_and(|member| member.user.bot)
        })
        .collect())
}

#[serenity::async_trait]
pub trait MessageHelper {
    async fn is_from_owner(&self, ctx: &Context) -> bool;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    async fn is_from_owner(&self, ctx: &Context) -> bool {
        let owners = &ctx.cfg.read().await.general.bot_owners;
        let author_global_name = &self.author.name;

        owners.contains(author_global_name)
    }
}
