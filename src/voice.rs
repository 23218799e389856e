//! Voice presence.  While a scrim runs, members in the meeting channel are
//! spectators and members in any other voice channel are active players.
//! Both roles are derived from a single occupancy snapshot per pass; anyone
//! who has left voice entirely loses both.

use crate::{
    context::Context,
    helper::{role_holders, voice_occupancy},
    registration::{apply_role_diff, plan_role_diff, PassReport, RoleDiff},
};
use anyhow::Result;
use serenity::all::{ChannelId, UserId};
use std::collections::HashSet;

/// Everyone in voice, split by which side of the meeting channel they sit
/// on.  A member occupies at most one channel, so the two sets are disjoint.
#[derive(Debug, Default)]
pub struct VoicePartition {
    pub in_meeting: HashSet<UserId>,
    pub in_other: HashSet<UserId>,
}

pub fn partition_voice(
    occupancy: &[(UserId, ChannelId)],
    meeting_channel_id: ChannelId,
) -> VoicePartition {
    let mut partition = VoicePartition::default();
    for (user_id, channel_id) in occupancy {
        if *channel_id == meeting_channel_id {
            partition.in_meeting.insert(*user_id);
        } else {
            partition.in_other.insert(*user_id);
        }
    }
    partition
}

/// Role mutations for one voice pass.
#[derive(Debug, Default)]
pub struct VoicePlan {
    pub active: RoleDiff,
    pub spectator: RoleDiff,
}

/// Pure planning step: active players are exactly the members in a
/// non-meeting voice channel, spectators exactly those in the meeting
/// channel.  Everyone else ends up with neither role.
pub fn plan_voice_roles(
    partition: &VoicePartition,
    active_holders: &HashSet<UserId>,
    spectator_holders: &HashSet<UserId>,
) -> VoicePlan {
    VoicePlan {
        active: plan_role_diff(&partition.in_other, active_holders),
        spectator: plan_role_diff(&partition.in_meeting, spectator_holders),
    }
}

/// Full pass: snapshot voice occupancy and converge both roles onto it.
pub async fn reconcile_voice_presence(ctx: &Context<'_>) -> Result<PassReport> {
    let scrim = ctx.cfg.read().await.scrim.clone();

    let occupancy = voice_occupancy(ctx, scrim.guild_id)?;
    let partition = partition_voice(&occupancy, scrim.meeting_channel_id);

    let active_holders = role_holders(ctx, scrim.guild_id, scrim.active_role_id)?;
    let spectator_holders = role_holders(ctx, scrim.guild_id, scrim.spectator_role_id)?;
    let plan = plan_voice_roles(&partition, &active_holders, &spectator_holders);

    let mut report = PassReport::default();
    apply_role_diff(
        ctx,
        scrim.guild_id,
        scrim.active_role_id,
        &plan.active,
        "scrim voice sync",
        &mut report,
    )
    .await;
    apply_role_diff(
        ctx,
        scrim.guild_id,
        scrim.spectator_role_id,
        &plan.spectator,
        "scrim voice sync",
        &mut report,
    )
    .await;

    Ok(report)
}

/// Strip both voice roles from everyone.  Run when a session is torn down
/// so stale roles don't linger once the periodic passes stop.
pub async fn clear_voice_roles(ctx: &Context<'_>) -> Result<PassReport> {
    let scrim = ctx.cfg.read().await.scrim.clone();

    let nobody = HashSet::new();
    let active_holders = role_holders(ctx, scrim.guild_id, scrim.active_role_id)?;
    let spectator_holders = role_holders(ctx, scrim.guild_id, scrim.spectator_role_id)?;

    let mut report = PassReport::default();
    apply_role_diff(
        ctx,
        scrim.guild_id,
        scrim.active_role_id,
        &plan_role_diff(&nobody, &active_holders),
        "scrim over",
        &mut report,
    )
    .await;
    apply_role_diff(
        ctx,
        scrim.guild_id,
        scrim.spectator_role_id,
        &plan_role_diff(&nobody, &spectator_holders),
        "scrim over",
        &mut report,
    )
    .await;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEETING: ChannelId = ChannelId::new(100);
    const ARENA: ChannelId = ChannelId::new(200);

    fn ids(raw: &[u64]) -> HashSet<UserId> {
        raw.iter().map(|id| UserId::new(*id)).collect()
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        let occupancy = vec![
            (UserId::new(1), MEETING),
            (UserId::new(2), ARENA),
            (UserId::new(3), ARENA),
        ];

        let partition = partition_voice(&occupancy, MEETING);
        assert_eq!(partition.in_meeting, ids(&[1]));
        assert_eq!(partition.in_other, ids(&[2, 3]));
        assert!(partition.in_meeting.is_disjoint(&partition.in_other));
    }

    #[test]
    fn meeting_channel_member_becomes_spectator_not_active() {
        let occupancy = vec![(UserId::new(7), MEETING)];
        let partition = partition_voice(&occupancy, MEETING);

        // Member currently holds Active and not Spectator.
        let plan = plan_voice_roles(&partition, &ids(&[7]), &HashSet::new());
        assert_eq!(plan.active.remove, vec![UserId::new(7)]);
        assert_eq!(plan.spectator.add, vec![UserId::new(7)]);
        assert!(plan.active.add.is_empty());
        assert!(plan.spectator.remove.is_empty());
    }

    #[test]
    fn leaving_voice_strips_both_roles() {
        // Nobody is in voice; 1 holds Active, 2 holds Spectator, 3 holds both.
        let partition = partition_voice(&[], MEETING);

        let plan = plan_voice_roles(&partition, &ids(&[1, 3]), &ids(&[2, 3]));
        assert_eq!(plan.active.remove, vec![UserId::new(1), UserId::new(3)]);
        assert_eq!(plan.spectator.remove, vec![UserId::new(2), UserId::new(3)]);
        assert!(plan.active.add.is_empty());
        assert!(plan.spectator.add.is_empty());
    }

    #[test]
    fn converged_state_plans_nothing() {
        let occupancy = vec![(UserId::new(1), MEETING), (UserId::new(2), ARENA)];
        let partition = partition_voice(&occupancy, MEETING);

        let plan = plan_voice_roles(&partition, &ids(&[2]), &ids(&[1]));
        assert!(plan.active.is_empty());
        assert!(plan.spectator.is_empty());
    }

    #[test]
    fn every_member_lands_in_exactly_one_bucket() {
        let occupancy = vec![
            (UserId::new(1), MEETING),
            (UserId::new(2), ARENA),
            (UserId::new(3), ChannelId::new(300)),
        ];
        let partition = partition_voice(&occupancy, MEETING);

        // Converge from arbitrary prior holder sets, then check the outcome
        // matches the partition exactly.
        let plan = plan_voice_roles(&partition, &ids(&[1, 4]), &ids(&[2, 5]));

        let active: HashSet<UserId> = ids(&[1, 4])
            .into_iter()
            .filter(|id| !plan.active.remove.contains(id))
            .chain(plan.active.add.iter().copied())
            .collect();
        let spectator: HashSet<UserId> = ids(&[2, 5])
            .into_iter()
            .filter(|id| !plan.spectator.remove.contains(id))
            .chain(plan.spectator.add.iter().copied())
            .collect();

        assert_eq!(active, partition.in_other);
        assert_eq!(spectator, partition.in_meeting);
        assert!(active.is_disjoint(&spectator));
    }
}
