//! Permission evaluation against the configured owner/admin/DJ lists

use std::collections::HashSet;

use crate::domain::entities::{Guild, PermissionLevel, User};
use crate::infrastructure::config::PermissionConfig;

/// Decides whether a user may run a command at a given level.
///
/// Owners are matched by user id only. Admin and DJ entries match a user id, or a
/// role id when the message came from a guild. A guild's owner counts as Admin there.
#[derive(Debug, Clone, Default)]
pub struct PermissionEvaluator {
    owners: HashSet<String>,
    admins: HashSet<String>,
    djs: HashSet<String>,
}

impl PermissionEvaluator {
    pub fn new(config: &PermissionConfig) -> Self {
        Self {
            owners: config.owners.iter().cloned().collect(),
            admins: config.admins.iter().cloned().collect(),
            djs: config.djs.iter().cloned().collect(),
        }
    }

    /// Highest level the user holds
    pub fn level_of(&self, user: &User, guild: Option<&Guild>) -> PermissionLevel {
        if self.owners.contains(&user.id) {
            return PermissionLevel::Owner;
        }

        let listed = |list: &HashSet<String>| {
            list.contains(&user.id) || (guild.is_some() && user.roles.iter().any(|r| list.contains(r)))
        };

        let guild_owner = guild
            .and_then(|g| g.owner_id.as_deref())
            .is_some_and(|owner| owner == user.id);

        if guild_owner || listed(&self.admins) {
            PermissionLevel::Admin
        } else if listed(&self.djs) {
            PermissionLevel::Dj
        } else {
            PermissionLevel::Everyone
        }
    }

    pub fn check(&self, user: &User, guild: Option<&Guild>, required: PermissionLevel) -> bool {
        self.level_of(user, guild) >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> PermissionEvaluator {
        PermissionEvaluator::new(&PermissionConfig {
            owners: vec!["owner".to_string()],
            admins: vec!["admin".to_string(), "role-mod".to_string()],
            djs: vec!["role-dj".to_string()],
        })
    }

    #[test]
    fn test_admin_command_denied_for_everyone() {
        let perms = evaluator();
        let guild = Guild::new("g1");
        let nobody = User::new("nobody");

        assert_eq!(perms.level_of(&nobody, Some(&guild)), PermissionLevel::Everyone);
        assert!(perms.check(&nobody, Some(&guild), PermissionLevel::Everyone));
        assert!(!perms.check(&nobody, Some(&guild), PermissionLevel::Admin));
        assert!(perms.check(&User::new("admin"), Some(&guild), PermissionLevel::Admin));
    }

    #[test]
    fn test_roles_only_count_inside_guilds() {
        let perms = evaluator();
        let moderator = User::new("u1").with_role("role-mod");

        assert!(perms.check(&moderator, Some(&Guild::new("g1")), PermissionLevel::Admin));
        assert!(!perms.check(&moderator, None, PermissionLevel::Admin));

        let dj = User::new("u2").with_role("role-dj");
        assert_eq!(perms.level_of(&dj, Some(&Guild::new("g1"))), PermissionLevel::Dj);
    }

    #[test]
    fn test_owner_outranks_everything() {
        let perms = evaluator();
        let owner = User::new("owner");
        assert!(perms.check(&owner, None, PermissionLevel::Owner));
        assert!(!perms.check(&User::new("admin"), None, PermissionLevel::Owner));
    }

    #[test]
    fn test_guild_owner_is_admin_in_their_guild() {
        let perms = evaluator();
        let guild = Guild::new("g1").with_owner("u9");
        let user = User::new("u9");
        assert_eq!(perms.level_of(&user, Some(&guild)), PermissionLevel::Admin);
        assert_eq!(perms.level_of(&user, Some(&Guild::new("g2"))), PermissionLevel::Everyone);
    }
}
