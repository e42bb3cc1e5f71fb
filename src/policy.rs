//! Tenant-scoped authorization.
//!
//! Every operation in the service is described once by an [`Operation`],
//! which names the resource kind it touches and the role it requires.
//! [`evaluate`] is the single decision function; the services never filter
//! by tenant on their own, they ask the policy which tenant they may see.

use crate::{
    errors::AppError,
    structs::{Actor, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    RateCard,
    Message,
    UserRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateRate,
    ListRates,
    UpdateRate,
    DeleteRate,
    SubmitComplaint,
    SubmitQuotation,
    ListOwnMessages,
    ListTenantMessages,
    ReplyMessage,
    MarkMessageRead,
    DeleteMessage,
    ListUsers,
    AddUser,
    ManageUser,
    BuildReceipt,
}

impl Operation {
    pub fn resource(&self) -> Resource {
        use Operation::*;
        match self {
            CreateRate | ListRates | UpdateRate | DeleteRate | BuildReceipt => Resource::RateCard,
            SubmitComplaint | SubmitQuotation | ListOwnMessages | ListTenantMessages
            | ReplyMessage | MarkMessageRead | DeleteMessage => Resource::Message,
            ListUsers | AddUser | ManageUser => Resource::UserRecord,
        }
    }

    pub fn required_role(&self) -> Option<Role> {
        use Operation::*;
        match self {
            ListRates | ListOwnMessages | BuildReceipt => None,
            SubmitComplaint | SubmitQuotation => Some(Role::User),
            CreateRate | UpdateRate | DeleteRate | ListTenantMessages | ReplyMessage
            | MarkMessageRead | DeleteMessage | ListUsers | AddUser | ManageUser => {
                Some(Role::Admin)
            }
        }
    }
}

/// Which tenant owns the resource being acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The actor's own tenant: creating or listing within its scope.
    ActorScope,
    /// A stored record owned by the given tenant.
    Tenant(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    WrongRole { required: Role },
    NoTenant,
    CrossTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { tenant: i64 },
    Denied(Denial),
}

/// Pure decision: may `actor` perform `op` on a resource owned by `target`?
///
/// Rules apply in order: missing identity, role mismatch, tenant mismatch.
pub fn evaluate(actor: Option<&Actor>, op: Operation, target: Target) -> Decision {
    let Some(actor) = actor else {
        return Decision::Denied(Denial::Unauthenticated);
    };
    if let Some(required) = op.required_role() {
        if actor.role != required {
            return Decision::Denied(Denial::WrongRole { required });
        }
    }
    let Some(scope) = actor.scope() else {
        return Decision::Denied(Denial::NoTenant);
    };
    match target {
        Target::ActorScope => Decision::Allowed { tenant: scope },
        Target::Tenant(owner) if owner == scope => Decision::Allowed { tenant: scope },
        Target::Tenant(_) => Decision::Denied(Denial::CrossTenant),
    }
}

/// An allowed decision, carrying the authenticated actor and the tenant it
/// was allowed in.
#[derive(Debug, Clone, Copy)]
pub struct Grant<'a> {
    pub actor: &'a Actor,
    pub tenant: i64,
}

fn denial_error(actor: Option<&Actor>, op: Operation, denial: Denial) -> AppError {
    let actor_id = actor.map(|a| a.id);
    log::warn!("Denied {:?} on {:?} for actor {:?}: {:?}", op, op.resource(), actor_id, denial);
    match denial {
        Denial::Unauthenticated => AppError::Unauthenticated,
        Denial::WrongRole { required } => {
            AppError::Forbidden(format!("only {} accounts may do this", required))
        }
        Denial::NoTenant => AppError::Forbidden("account is not linked to an admin".to_owned()),
        Denial::CrossTenant => AppError::Forbidden("resource belongs to another tenant".to_owned()),
    }
}

/// Authorizes an operation, turning a denial into the matching error.
pub fn authorize(actor: Option<&Actor>, op: Operation, target: Target) -> Result<Grant<'_>, AppError> {
    match (evaluate(actor, op, target), actor) {
        (Decision::Allowed { tenant }, Some(actor)) => Ok(Grant { actor, tenant }),
        (Decision::Denied(denial), _) => Err(denial_error(actor, op, denial)),
        (Decision::Allowed { .. }, None) => Err(AppError::Unauthenticated),
    }
}

/// Authorizes an operation on an existing record whose owning tenant is
/// `owner` (`None` when the record does not exist or has no owner).
///
/// A missing record and another tenant's record look the same to the
/// caller: both are `NotFoundOrForbidden`. Identity and role failures are
/// reported as usual, before ownership is looked at.
pub fn authorize_owned(
    actor: Option<&Actor>,
    op: Operation,
    owner: Option<i64>,
) -> Result<Grant<'_>, AppError> {
    let grant = authorize(actor, op, Target::ActorScope)?;
    match owner {
        Some(owner) if owner == grant.tenant => Ok(grant),
        _ => {
            log::warn!(
                "Denied {:?} for actor {}: record not in tenant {}",
                op,
                grant.actor.id,
                grant.tenant
            );
            Err(AppError::NotFoundOrForbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Operation; 15] = [
        Operation::CreateRate,
        Operation::ListRates,
        Operation::UpdateRate,
        Operation::DeleteRate,
        Operation::SubmitComplaint,
        Operation::SubmitQuotation,
        Operation::ListOwnMessages,
        Operation::ListTenantMessages,
        Operation::ReplyMessage,
        Operation::MarkMessageRead,
        Operation::DeleteMessage,
        Operation::ListUsers,
        Operation::AddUser,
        Operation::ManageUser,
        Operation::BuildReceipt,
    ];

    fn orphan() -> Actor {
        Actor {
            id: 30,
            role: Role::User,
            tenant_id: None,
        }
    }

    #[test]
    fn missing_identity_is_unauthenticated_for_every_operation() {
        for op in ALL {
            assert_eq!(
                evaluate(None, op, Target::ActorScope),
                Decision::Denied(Denial::Unauthenticated)
            );
            assert_eq!(
                evaluate(None, op, Target::Tenant(1)),
                Decision::Denied(Denial::Unauthenticated)
            );
        }
    }

    #[test]
    fn role_restrictions_come_before_tenant_checks() {
        let admin = Actor::admin(1);
        let user = Actor::user(10, 1);
        for op in ALL {
            match op.required_role() {
                Some(Role::Admin) => assert_eq!(
                    evaluate(Some(&user), op, Target::Tenant(99)),
                    Decision::Denied(Denial::WrongRole { required: Role::Admin }),
                    "{op:?}"
                ),
                Some(Role::User) => assert_eq!(
                    evaluate(Some(&admin), op, Target::Tenant(99)),
                    Decision::Denied(Denial::WrongRole { required: Role::User }),
                    "{op:?}"
                ),
                None => {}
            }
        }
    }

    #[test]
    fn same_tenant_is_allowed_and_other_tenants_are_not() {
        let admin = Actor::admin(1);
        let user = Actor::user(10, 1);
        for op in ALL {
            let actor = match op.required_role() {
                Some(Role::User) => user,
                _ => admin,
            };
            assert_eq!(
                evaluate(Some(&actor), op, Target::Tenant(1)),
                Decision::Allowed { tenant: 1 },
                "{op:?}"
            );
            assert_eq!(
                evaluate(Some(&actor), op, Target::Tenant(2)),
                Decision::Denied(Denial::CrossTenant),
                "{op:?}"
            );
        }
    }

    #[test]
    fn read_path_resolves_tenant_by_role() {
        assert_eq!(
            evaluate(Some(&Actor::admin(5)), Operation::ListRates, Target::ActorScope),
            Decision::Allowed { tenant: 5 }
        );
        assert_eq!(
            evaluate(Some(&Actor::user(11, 5)), Operation::ListRates, Target::ActorScope),
            Decision::Allowed { tenant: 5 }
        );
    }

    #[test]
    fn user_without_tenant_is_forbidden_not_unscoped() {
        assert_eq!(
            evaluate(Some(&orphan()), Operation::ListRates, Target::ActorScope),
            Decision::Denied(Denial::NoTenant)
        );
        assert!(matches!(
            authorize(Some(&orphan()), Operation::SubmitComplaint, Target::ActorScope),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_is_its_own_scope_root() {
        // An admin's id is its tenant; another admin's id is a foreign tenant.
        assert_eq!(
            evaluate(Some(&Actor::admin(1)), Operation::UpdateRate, Target::Tenant(2)),
            Decision::Denied(Denial::CrossTenant)
        );
    }

    #[test]
    fn owned_records_conceal_foreign_and_missing_alike() {
        let admin = Actor::admin(1);
        assert!(matches!(
            authorize_owned(Some(&admin), Operation::DeleteRate, Some(2)),
            Err(AppError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            authorize_owned(Some(&admin), Operation::DeleteRate, None),
            Err(AppError::NotFoundOrForbidden)
        ));
        let grant = authorize_owned(Some(&admin), Operation::DeleteRate, Some(1)).unwrap();
        assert_eq!(grant.tenant, 1);
    }

    #[test]
    fn owned_records_still_report_role_and_identity_failures() {
        let user = Actor::user(10, 1);
        assert!(matches!(
            authorize_owned(Some(&user), Operation::UpdateRate, Some(1)),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_owned(None, Operation::UpdateRate, Some(1)),
            Err(AppError::Unauthenticated)
        ));
    }
}
