use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Caller roles as issued by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    TenantAdmin,
    Member,
}

impl Role {
    /// Privileged roles may target any tenant; everyone else is pinned to
    /// their own.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

/// Identity attached to an incoming call, as resolved by the (external)
/// session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub role: Role,
    pub tenant_id: Option<i64>,
}

/// key: scope-resolver -> one tenant scope per call
///
/// The single place the "is this caller privileged, and if not, force their
/// own tenant" branch lives. Every tenant-scoped storage call consumes the
/// resolved scope; call sites never re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantScope(i64);

impl TenantScope {
    pub fn resolve(caller: &CallerIdentity, requested: Option<i64>) -> EngineResult<TenantScope> {
        if caller.role.is_privileged() {
            return match requested.or(caller.tenant_id) {
                Some(tenant_id) => Ok(TenantScope(tenant_id)),
                None => Err(EngineError::AccessDenied(
                    "no tenant named for a privileged call".to_string(),
                )),
            };
        }

        let own = caller.tenant_id.ok_or_else(|| {
            EngineError::AccessDenied("caller has no tenant association".to_string())
        })?;
        if let Some(requested) = requested {
            if requested != own {
                return Err(EngineError::AccessDenied(format!(
                    "caller is scoped to tenant {own}, not {requested}"
                )));
            }
        }
        Ok(TenantScope(own))
    }

    pub fn tenant_id(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{CallerIdentity, Role, TenantScope};

    fn caller(role: Role, tenant_id: Option<i64>) -> CallerIdentity {
        CallerIdentity {
            user_id: 7,
            role,
            tenant_id,
        }
    }

    #[test]
    fn member_is_forced_to_their_own_tenant() {
        let scope = TenantScope::resolve(&caller(Role::Member, Some(3)), None).unwrap();
        assert_eq!(scope.tenant_id(), 3);

        let same = TenantScope::resolve(&caller(Role::Member, Some(3)), Some(3)).unwrap();
        assert_eq!(same.tenant_id(), 3);
    }

    #[test]
    fn member_cannot_reach_another_tenant() {
        assert!(TenantScope::resolve(&caller(Role::TenantAdmin, Some(3)), Some(4)).is_err());
    }

    #[test]
    fn member_without_a_tenant_is_rejected() {
        assert!(TenantScope::resolve(&caller(Role::Member, None), None).is_err());
    }

    #[test]
    fn privileged_caller_may_target_any_tenant() {
        let scope = TenantScope::resolve(&caller(Role::SuperAdmin, None), Some(9)).unwrap();
        assert_eq!(scope.tenant_id(), 9);

        let own = TenantScope::resolve(&caller(Role::Admin, Some(2)), None).unwrap();
        assert_eq!(own.tenant_id(), 2);
    }

    #[test]
    fn privileged_caller_with_no_target_is_rejected() {
        assert!(TenantScope::resolve(&caller(Role::SuperAdmin, None), None).is_err());
    }
}
