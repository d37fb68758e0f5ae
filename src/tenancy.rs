use crate::{
    auth::Identity,
    error::{AppError, AppResult},
    models::{DbId, EmpresaEstado, Role, UsuarioEstado},
    state::AppState,
};

/// What an actor is allowed to do, independent of which rows it may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageTickets,
    UpdateAssignedTickets,
    ViewTickets,
    ManageAgenda,
    ViewAgenda,
    ToggleWorkload,
    ManageTenantConfig,
    ViewTenantConfig,
}

use Capability::*;

const ALL_CAPABILITIES: &[Capability] = &[
    ManageTickets,
    UpdateAssignedTickets,
    ViewTickets,
    ManageAgenda,
    ViewAgenda,
    ToggleWorkload,
    ManageTenantConfig,
    ViewTenantConfig,
];

const OPERADOR_CAPABILITIES: &[Capability] = &[
    ManageTickets,
    UpdateAssignedTickets,
    ViewTickets,
    ManageAgenda,
    ViewAgenda,
    ToggleWorkload,
    ViewTenantConfig,
];

// Row-level narrowing (own calendar, assigned tickets) happens in the services.
const PROFESIONAL_CAPABILITIES: &[Capability] = &[
    UpdateAssignedTickets,
    ViewTickets,
    ManageAgenda,
    ViewAgenda,
    ToggleWorkload,
    ViewTenantConfig,
];

pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::Superadmin | Role::Owner => ALL_CAPABILITIES,
        Role::Operador => OPERADOR_CAPABILITIES,
        Role::Profesional => PROFESIONAL_CAPABILITIES,
    }
}

/// The resolved actor of a request.
///
/// `tenant_id` is `None` only for the platform superadmin, who is not bound
/// to a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub tenant_id: Option<DbId>,
    pub role: Role,
    pub user_id: DbId,
}

impl Scope {
    pub fn can(&self, capability: Capability) -> bool {
        capabilities(self.role).contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            return Ok(());
        }
        Err(AppError::Forbidden(format!(
            "Forbidden: role '{}' is not allowed for this action.",
            self.role
        )))
    }

    pub fn is_profesional(&self) -> bool {
        self.role == Role::Profesional
    }

    /// Tenant restriction for reads; `None` means every company.
    pub fn tenant_filter(&self) -> Option<DbId> {
        match self.role {
            Role::Superadmin => None,
            _ => self.tenant_id,
        }
    }

    /// The company an operation acts on.
    ///
    /// Company-bound roles always act on their own company and any
    /// client-supplied id is discarded. The superadmin must name one.
    pub fn tenant_for(&self, requested: Option<DbId>) -> AppResult<DbId> {
        if self.role == Role::Superadmin {
            return requested.ok_or_else(|| {
                AppError::Validation(
                    "empresa_id is required for platform administrators.".to_string(),
                )
            });
        }

        let tenant_id = self.tenant_id.ok_or_else(|| {
            AppError::Unauthorized("Unauthorized: user is not bound to a company.".to_string())
        })?;
        if let Some(requested) = requested.filter(|requested| *requested != tenant_id) {
            tracing::warn!(
                user_id = self.user_id,
                tenant_id,
                requested,
                "ignoring client-supplied company id"
            );
        }
        Ok(tenant_id)
    }
}

/// Turns an authenticated identity into a [`Scope`] using the persisted user.
pub async fn resolve_scope(state: &AppState, identity: &Identity) -> AppResult<Scope> {
    let usuario = state
        .store
        .usuario(identity.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: unknown user.".to_string()))?;

    if usuario.estado == UsuarioEstado::Bloqueado {
        return Err(AppError::Unauthorized(
            "Unauthorized: user is blocked.".to_string(),
        ));
    }
    if identity.role.is_some_and(|role| role != usuario.rol) {
        return Err(AppError::Unauthorized(
            "Unauthorized: token role does not match the user.".to_string(),
        ));
    }
    if identity
        .empresa_id
        .is_some_and(|empresa_id| Some(empresa_id) != usuario.empresa_id)
    {
        return Err(AppError::Unauthorized(
            "Unauthorized: token company does not match the user.".to_string(),
        ));
    }

    if usuario.rol == Role::Superadmin {
        return Ok(Scope {
            tenant_id: None,
            role: usuario.rol,
            user_id: usuario.id,
        });
    }

    let empresa_id = usuario.empresa_id.ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: user is not bound to a company.".to_string())
    })?;
    let empresa = state
        .store
        .empresa(empresa_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: unknown company.".to_string()))?;
    if empresa.estado == EmpresaEstado::Suspendida {
        return Err(AppError::Forbidden(
            "Forbidden: company is suspended.".to_string(),
        ));
    }

    Ok(Scope {
        tenant_id: Some(empresa_id),
        role: usuario.rol,
        user_id: usuario.id,
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve_scope, Capability, Scope};
    use crate::{
        auth::Identity,
        error::AppError,
        models::{Role, UsuarioEstado},
        test_support::seeded_state,
    };

    fn scope(role: Role, tenant_id: Option<i64>) -> Scope {
        Scope {
            tenant_id,
            role,
            user_id: 1,
        }
    }

    #[test]
    fn operador_cannot_touch_company_config() {
        let operador = scope(Role::Operador, Some(1000));
        assert!(operador.can(Capability::ManageTickets));
        assert!(operador.can(Capability::ViewTenantConfig));
        assert!(!operador.can(Capability::ManageTenantConfig));
        assert!(matches!(
            operador.require(Capability::ManageTenantConfig),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn profesional_is_read_mostly() {
        let profesional = scope(Role::Profesional, Some(1000));
        assert!(!profesional.can(Capability::ManageTickets));
        assert!(profesional.can(Capability::UpdateAssignedTickets));
        assert!(profesional.can(Capability::ToggleWorkload));
        assert!(profesional.can(Capability::ManageAgenda));
    }

    #[test]
    fn company_roles_ignore_client_supplied_tenant() {
        let owner = scope(Role::Owner, Some(1000));
        assert_eq!(owner.tenant_for(Some(2000)).unwrap(), 1000);
        assert_eq!(owner.tenant_for(None).unwrap(), 1000);
        assert_eq!(owner.tenant_filter(), Some(1000));
    }

    #[test]
    fn superadmin_must_name_a_tenant() {
        let admin = scope(Role::Superadmin, None);
        assert_eq!(admin.tenant_for(Some(2000)).unwrap(), 2000);
        assert!(matches!(admin.tenant_for(None), Err(AppError::Validation(_))));
        assert_eq!(admin.tenant_filter(), None);
    }

    fn identity(user_id: i64) -> Identity {
        Identity {
            user_id,
            role: None,
            empresa_id: None,
        }
    }

    #[tokio::test]
    async fn scope_takes_tenant_from_the_user_record() {
        let (state, _, _) = seeded_state();
        let scope = resolve_scope(&state, &identity(2)).await.unwrap();
        assert_eq!(scope.tenant_id, Some(1000));
        assert_eq!(scope.role, Role::Operador);

        let admin = resolve_scope(&state, &identity(99)).await.unwrap();
        assert_eq!(admin.tenant_id, None);
    }

    #[tokio::test]
    async fn mismatched_token_claims_are_rejected() {
        let (state, _, _) = seeded_state();
        let forged = Identity {
            user_id: 2,
            role: Some(Role::Owner),
            empresa_id: None,
        };
        assert!(matches!(
            resolve_scope(&state, &forged).await,
            Err(AppError::Unauthorized(_))
        ));

        let other_company = Identity {
            user_id: 2,
            role: None,
            empresa_id: Some(2000),
        };
        assert!(matches!(
            resolve_scope(&state, &other_company).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn blocked_users_and_suspended_companies_are_rejected() {
        let (state, store, _) = seeded_state();
        store
            .with_tables(|tables| {
                if let Some(usuario) = tables.usuarios.get_mut(&2) {
                    usuario.estado = UsuarioEstado::Bloqueado;
                }
            })
            .await;

        assert!(matches!(
            resolve_scope(&state, &identity(2)).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            resolve_scope(&state, &identity(31)).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            resolve_scope(&state, &identity(404)).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
