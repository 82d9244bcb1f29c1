//! Role checks and ownership filtering.

use crate::context::{CallerContext, Role};
use crate::error::AuthError;

/// Check that the caller's role satisfies one of the required roles.
pub fn guard(ctx: &CallerContext, required: &[Role]) -> Result<(), AuthError> {
    if required.iter().any(|r| ctx.role.satisfies(*r)) {
        return Ok(());
    }
    Err(AuthError::Denied {
        required: required.iter().map(|r| r.as_str().to_string()).collect(),
        user_role: ctx.role.as_str().to_string(),
    })
}

/// Keep only the records the caller may see. Admins see everything;
/// employees see their own records.
pub fn filter_owned<T>(ctx: &CallerContext, items: Vec<T>, owner_of: impl Fn(&T) -> &str) -> Vec<T> {
    if ctx.is_admin() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| owner_of(item) == ctx.user_id)
        .collect()
}

/// Whether the caller may access a single record.
pub fn check_ownership(ctx: &CallerContext, owner_id: &str) -> bool {
    ctx.is_admin() || ctx.user_id == owner_id
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record {
        owner: String,
    }

    fn rec(owner: &str) -> Record {
        Record {
            owner: owner.to_string(),
        }
    }

    #[test]
    fn guard_allows_matching_role() {
        let ctx = CallerContext::new("emp_1", Role::Employee);
        assert!(guard(&ctx, &[Role::Employee]).is_ok());
    }

    #[test]
    fn guard_denies_insufficient_role() {
        let ctx = CallerContext::new("emp_1", Role::Employee);
        let err = guard(&ctx, &[Role::Admin]).unwrap_err();
        let AuthError::Denied { required, user_role } = err;
        assert_eq!(required, vec!["admin".to_string()]);
        assert_eq!(user_role, "employee");
    }

    #[test]
    fn admin_passes_any_guard() {
        let ctx = CallerContext::new("adm_1", Role::Admin);
        assert!(guard(&ctx, &[Role::Employee]).is_ok());
        assert!(guard(&ctx, &[Role::Admin]).is_ok());
    }

    #[test]
    fn employees_only_see_their_own_records() {
        let ctx = CallerContext::new("emp_1", Role::Employee);
        let items = vec![rec("emp_1"), rec("emp_2"), rec("emp_1")];
        let mine = filter_owned(&ctx, items, |r| &r.owner);
        assert_eq!(mine.len(), 2);
    }

    #[test]
    fn admins_see_everything() {
        let ctx = CallerContext::new("adm_1", Role::Admin);
        let items = vec![rec("emp_1"), rec("emp_2")];
        assert_eq!(filter_owned(&ctx, items, |r| &r.owner).len(), 2);
    }

    #[test]
    fn ownership_check() {
        let employee = CallerContext::new("emp_1", Role::Employee);
        assert!(check_ownership(&employee, "emp_1"));
        assert!(!check_ownership(&employee, "emp_2"));
        let admin = CallerContext::new("adm_1", Role::Admin);
        assert!(check_ownership(&admin, "emp_2"));
    }
}
