//! Role-based permission matrix.
//!
//! # Responsibility
//! - Map `(baby.members, actor, target)` to allow/deny decisions.
//! - Expose which roles an actor may hand out.
//!
//! # Invariants
//! - Default deny: a principal without a member entry gets `None` from
//!   `get_role` and `false`/empty from every predicate.
//! - Ownership only moves through transfer; no predicate lets an actor
//!   change their own role.
//!
//! ```text
//!  Action                     | owner | admin | parent | viewer | pediatrician
//!  read events / analytics    |   x   |   x   |   x    |   x    |   x
//!  create/edit/delete events  |   x   |   x   |   x    |        |
//!  edit baby profile          |   x   |   x   |        |        |
//!  delete baby                |   x   |       |        |        |
//!  invite members             |   x   |   x   |        |        |
//!  change role / remove       |   x   |   x*  |        |        |
//!  transfer ownership         |   x   |       |        |        |
//!  * admin only touches parent/viewer/pediatrician, never self
//! ```

use crate::model::baby::Baby;
use crate::model::principal::PrincipalId;
use crate::model::role::Role;

const EVENT_WRITE_ROLES: &[Role] = &[Role::Owner, Role::Admin, Role::Parent];
const MEMBER_MANAGE_ROLES: &[Role] = &[Role::Owner, Role::Admin];
const BABY_EDIT_ROLES: &[Role] = &[Role::Owner, Role::Admin];

const INVITABLE_BY_OWNER: &[Role] = &[Role::Admin, Role::Parent, Role::Viewer, Role::Pediatrician];
const INVITABLE_BY_ADMIN: &[Role] = &[Role::Parent, Role::Viewer, Role::Pediatrician];

/// Role held by `principal` on `baby`; `None` means not a member.
pub fn get_role(baby: &Baby, principal: &PrincipalId) -> Option<Role> {
    baby.members.get(principal).copied()
}

fn has_role(baby: &Baby, principal: &PrincipalId, allowed: &[Role]) -> bool {
    get_role(baby, principal).is_some_and(|role| allowed.contains(&role))
}

pub fn can_read_events(baby: &Baby, principal: &PrincipalId) -> bool {
    get_role(baby, principal).is_some()
}

pub fn can_write_events(baby: &Baby, principal: &PrincipalId) -> bool {
    has_role(baby, principal, EVENT_WRITE_ROLES)
}

pub fn can_manage_members(baby: &Baby, principal: &PrincipalId) -> bool {
    has_role(baby, principal, MEMBER_MANAGE_ROLES)
}

pub fn can_edit_baby(baby: &Baby, principal: &PrincipalId) -> bool {
    has_role(baby, principal, BABY_EDIT_ROLES)
}

pub fn can_delete_baby(baby: &Baby, principal: &PrincipalId) -> bool {
    get_role(baby, principal) == Some(Role::Owner)
}

pub fn can_transfer_ownership(baby: &Baby, principal: &PrincipalId) -> bool {
    get_role(baby, principal) == Some(Role::Owner)
}

/// Whether `actor` may change `target`'s role.
///
/// Owner may change anyone but themselves. Admin may change members strictly
/// below admin, never themselves. Targets that are not members are denied.
pub fn can_change_role(baby: &Baby, actor: &PrincipalId, target: &PrincipalId) -> bool {
    let Some(target_role) = get_role(baby, target) else {
        return false;
    };
    if actor == target {
        return false;
    }
    match get_role(baby, actor) {
        Some(Role::Owner) => true,
        Some(Role::Admin) => !matches!(target_role, Role::Owner | Role::Admin),
        _ => false,
    }
}

/// Removal follows the role-change rule exactly.
pub fn can_remove_member(baby: &Baby, actor: &PrincipalId, target: &PrincipalId) -> bool {
    can_change_role(baby, actor, target)
}

/// Roles `actor` may assign through invites or role changes.
pub fn invitable_roles(baby: &Baby, actor: &PrincipalId) -> &'static [Role] {
    match get_role(baby, actor) {
        Some(Role::Owner) => INVITABLE_BY_OWNER,
        Some(Role::Admin) => INVITABLE_BY_ADMIN,
        _ => &[],
    }
}

/// Pediatricians are kept out of detailed per-member breakdowns.
pub fn shows_in_detailed_breakdowns(role: Role) -> bool {
    role != Role::Pediatrician
}

#[cfg(test)]
mod tests {
    use super::{
        can_change_role, can_delete_baby, can_edit_baby, can_manage_members, can_read_events,
        can_remove_member, can_transfer_ownership, can_write_events, get_role, invitable_roles,
        shows_in_detailed_breakdowns,
    };
    use crate::model::baby::Baby;
    use crate::model::principal::PrincipalId;
    use crate::model::role::{Role, ALL_ROLES};

    fn pid(value: &str) -> PrincipalId {
        PrincipalId::from(value)
    }

    fn family() -> Baby {
        let mut baby = Baby::new(pid("owner"), "Mia", None, 0);
        baby.members.insert(pid("admin"), Role::Admin);
        baby.members.insert(pid("admin2"), Role::Admin);
        baby.members.insert(pid("parent"), Role::Parent);
        baby.members.insert(pid("viewer"), Role::Viewer);
        baby.members.insert(pid("doc"), Role::Pediatrician);
        baby
    }

    #[test]
    fn matrix_rows_match_roles() {
        let baby = family();
        let expect = |who: &str, row: [bool; 6]| {
            let who = pid(who);
            assert_eq!(
                [
                    can_read_events(&baby, &who),
                    can_write_events(&baby, &who),
                    can_edit_baby(&baby, &who),
                    can_delete_baby(&baby, &who),
                    can_manage_members(&baby, &who),
                    can_transfer_ownership(&baby, &who),
                ],
                row,
                "row for {who}"
            );
        };
        expect("owner", [true, true, true, true, true, true]);
        expect("admin", [true, true, true, false, true, false]);
        expect("parent", [true, true, false, false, false, false]);
        expect("viewer", [true, false, false, false, false, false]);
        expect("doc", [true, false, false, false, false, false]);
        expect("stranger", [false, false, false, false, false, false]);
    }

    #[test]
    fn owner_cannot_change_own_role() {
        let baby = family();
        assert!(!can_change_role(&baby, &pid("owner"), &pid("owner")));
        assert!(can_change_role(&baby, &pid("owner"), &pid("admin")));
        assert!(can_change_role(&baby, &pid("owner"), &pid("doc")));
    }

    #[test]
    fn admin_never_touches_admins_or_owner() {
        let baby = family();
        for target in ["owner", "admin", "admin2"] {
            assert!(!can_change_role(&baby, &pid("admin"), &pid(target)), "{target}");
            assert!(!can_remove_member(&baby, &pid("admin"), &pid(target)), "{target}");
        }
        for target in ["parent", "viewer", "doc"] {
            assert!(can_change_role(&baby, &pid("admin"), &pid(target)), "{target}");
        }
    }

    #[test]
    fn lower_roles_cannot_change_anyone() {
        let baby = family();
        for actor in ["parent", "viewer", "doc", "stranger"] {
            for target in ["owner", "admin", "parent", "viewer", "doc"] {
                assert!(!can_change_role(&baby, &pid(actor), &pid(target)));
            }
        }
    }

    #[test]
    fn non_member_target_is_denied() {
        let baby = family();
        assert!(!can_change_role(&baby, &pid("owner"), &pid("stranger")));
    }

    #[test]
    fn invitable_roles_follow_actor_role() {
        let baby = family();
        assert_eq!(
            invitable_roles(&baby, &pid("owner")),
            &[Role::Admin, Role::Parent, Role::Viewer, Role::Pediatrician]
        );
        assert_eq!(
            invitable_roles(&baby, &pid("admin")),
            &[Role::Parent, Role::Viewer, Role::Pediatrician]
        );
        assert!(invitable_roles(&baby, &pid("parent")).is_empty());
        assert!(invitable_roles(&baby, &pid("stranger")).is_empty());
        assert!(!invitable_roles(&baby, &pid("owner")).contains(&Role::Owner));
    }

    #[test]
    fn missing_member_entry_is_default_deny() {
        let mut baby = family();
        baby.members.remove(&pid("parent"));
        let gone = pid("parent");
        assert_eq!(get_role(&baby, &gone), None);
        assert!(!can_read_events(&baby, &gone));
        assert!(!can_write_events(&baby, &gone));
        assert!(!can_change_role(&baby, &gone, &pid("viewer")));
        assert!(invitable_roles(&baby, &gone).is_empty());
    }

    #[test]
    fn get_role_is_none_exactly_for_non_members() {
        let baby = family();
        for (principal, role) in &baby.members {
            assert_eq!(get_role(&baby, principal), Some(*role));
        }
        assert_eq!(get_role(&baby, &pid("")), None);
    }

    #[test]
    fn only_pediatrician_is_hidden_from_breakdowns() {
        for role in ALL_ROLES {
            assert_eq!(
                shows_in_detailed_breakdowns(role),
                role != Role::Pediatrician
            );
        }
    }
}
