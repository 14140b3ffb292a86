//! Effective channel permissions for a guild member.

use std::collections::BTreeSet;

use crate::discord_api::{DiscordRole, OverwriteTarget, PermissionOverwrite};

pub const ADMINISTRATOR_BIT: u64 = 1 << 3;

/// Permission flag names as referenced by policy files.
pub const DISCORD_PERMISSION_FLAGS: &[(u64, &str)] = &[
    (1 << 0, "create_instant_invite"),
    (1 << 1, "kick_members"),
    (1 << 2, "ban_members"),
    (ADMINISTRATOR_BIT, "administrator"),
    (1 << 4, "manage_channels"),
    (1 << 5, "manage_guild"),
    (1 << 6, "add_reactions"),
    (1 << 7, "view_audit_log"),
    (1 << 8, "priority_speaker"),
    (1 << 9, "stream"),
    (1 << 10, "read_messages"),
    (1 << 11, "send_messages"),
    (1 << 12, "send_tts_messages"),
    (1 << 13, "manage_messages"),
    (1 << 14, "embed_links"),
    (1 << 15, "attach_files"),
    (1 << 16, "read_message_history"),
    (1 << 17, "mention_everyone"),
    (1 << 18, "external_emojis"),
    (1 << 19, "view_guild_insights"),
    (1 << 20, "connect"),
    (1 << 21, "speak"),
    (1 << 22, "mute_members"),
    (1 << 23, "deafen_members"),
    (1 << 24, "move_members"),
    (1 << 25, "use_voice_activation"),
    (1 << 26, "change_nickname"),
    (1 << 27, "manage_nicknames"),
    (1 << 28, "manage_roles"),
    (1 << 29, "manage_webhooks"),
    (1 << 30, "manage_emojis"),
    (1 << 31, "use_application_commands"),
    (1 << 33, "manage_events"),
    (1 << 34, "manage_threads"),
    (1 << 35, "create_public_threads"),
    (1 << 36, "create_private_threads"),
    (1 << 38, "send_messages_in_threads"),
    (1 << 40, "moderate_members"),
];

fn all_permission_bits() -> u64 {
    DISCORD_PERMISSION_FLAGS
        .iter()
        .fold(0, |bits, (flag, _)| bits | flag)
}

/// Inputs for one member/channel permission computation.
pub struct MemberPermissionInput<'a> {
    pub guild_id: &'a str,
    pub guild_owner_id: Option<&'a str>,
    pub user_id: &'a str,
    pub member_role_ids: &'a [String],
    pub guild_roles: &'a [DiscordRole],
    pub channel_overwrites: &'a [PermissionOverwrite],
}

/// Applies role grants, then the `@everyone`, role, and member overwrites in
/// that order. Owners and administrators hold every permission.
pub fn compute_channel_permissions(input: &MemberPermissionInput<'_>) -> u64 {
    if input.guild_owner_id == Some(input.user_id) {
        return all_permission_bits();
    }

    let mut permissions = input
        .guild_roles
        .iter()
        .filter(|role| {
            role.id == input.guild_id || input.member_role_ids.iter().any(|id| *id == role.id)
        })
        .fold(0u64, |bits, role| bits | role.permissions);
    if permissions & ADMINISTRATOR_BIT != 0 {
        return all_permission_bits();
    }

    if let Some(everyone) = input
        .channel_overwrites
        .iter()
        .find(|overwrite| overwrite.id == input.guild_id)
    {
        permissions &= !everyone.deny;
        permissions |= everyone.allow;
    }

    let (role_allow, role_deny) = input
        .channel_overwrites
        .iter()
        .filter(|overwrite| {
            overwrite.target == OverwriteTarget::Role
                && overwrite.id != input.guild_id
                && input.member_role_ids.iter().any(|id| *id == overwrite.id)
        })
        .fold((0u64, 0u64), |(allow, deny), overwrite| {
            (allow | overwrite.allow, deny | overwrite.deny)
        });
    permissions &= !role_deny;
    permissions |= role_allow;

    if let Some(member) = input.channel_overwrites.iter().find(|overwrite| {
        overwrite.target == OverwriteTarget::Member && overwrite.id == input.user_id
    }) {
        permissions &= !member.deny;
        permissions |= member.allow;
    }
    permissions
}

pub fn permission_names(bits: u64) -> BTreeSet<String> {
    DISCORD_PERMISSION_FLAGS
        .iter()
        .filter(|(flag, _)| bits & flag != 0)
        .map(|(_, name)| (*name).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANAGE_MESSAGES: u64 = 1 << 13;
    const SEND_MESSAGES: u64 = 1 << 11;

    fn role(id: &str, permissions: u64) -> DiscordRole {
        DiscordRole {
            id: id.to_string(),
            name: format!("role-{id}"),
            position: 0,
            permissions,
        }
    }

    fn overwrite(id: &str, target: OverwriteTarget, allow: u64, deny: u64) -> PermissionOverwrite {
        PermissionOverwrite {
            id: id.to_string(),
            target,
            allow,
            deny,
        }
    }

    #[test]
    fn unit_role_grants_are_unioned_with_everyone() {
        let roles = vec![role("g", SEND_MESSAGES), role("mod", MANAGE_MESSAGES)];
        let member_roles = vec!["mod".to_string()];
        let bits = compute_channel_permissions(&MemberPermissionInput {
            guild_id: "g",
            guild_owner_id: None,
            user_id: "u",
            member_role_ids: &member_roles,
            guild_roles: &roles,
            channel_overwrites: &[],
        });
        assert_eq!(
            permission_names(bits),
            BTreeSet::from(["manage_messages".to_string(), "send_messages".to_string()])
        );
    }

    #[test]
    fn functional_overwrites_apply_everyone_then_roles_then_member() {
        let roles = vec![role("g", SEND_MESSAGES), role("mod", MANAGE_MESSAGES)];
        let member_roles = vec!["mod".to_string()];
        let overwrites = vec![
            overwrite("g", OverwriteTarget::Role, 0, SEND_MESSAGES),
            overwrite("mod", OverwriteTarget::Role, SEND_MESSAGES, 0),
            overwrite("u", OverwriteTarget::Member, 0, MANAGE_MESSAGES),
        ];
        let bits = compute_channel_permissions(&MemberPermissionInput {
            guild_id: "g",
            guild_owner_id: None,
            user_id: "u",
            member_role_ids: &member_roles,
            guild_roles: &roles,
            channel_overwrites: &overwrites,
        });
        assert_eq!(bits, SEND_MESSAGES);
    }

    #[test]
    fn unit_administrator_and_owner_hold_everything() {
        let roles = vec![role("g", 0), role("admin", ADMINISTRATOR_BIT)];
        let member_roles = vec!["admin".to_string()];
        let overwrites = vec![overwrite("u", OverwriteTarget::Member, 0, MANAGE_MESSAGES)];
        let admin = compute_channel_permissions(&MemberPermissionInput {
            guild_id: "g",
            guild_owner_id: None,
            user_id: "u",
            member_role_ids: &member_roles,
            guild_roles: &roles,
            channel_overwrites: &overwrites,
        });
        assert!(permission_names(admin).contains("manage_messages"));

        let owner = compute_channel_permissions(&MemberPermissionInput {
            guild_id: "g",
            guild_owner_id: Some("owner"),
            user_id: "owner",
            member_role_ids: &[],
            guild_roles: &roles,
            channel_overwrites: &[],
        });
        assert_eq!(owner, all_permission_bits());
    }
}
