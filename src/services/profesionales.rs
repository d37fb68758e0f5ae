use crate::{
    error::{AppError, AppResult},
    models::{DbId, Usuario},
    schemas::AptoRecibirInput,
    state::AppState,
    tenancy::{Capability, Scope},
};

/// Toggles whether a professional accepts new tickets. Existing tickets and
/// calendar entries are left alone.
pub async fn set_apto_recibir(
    state: &AppState,
    scope: &Scope,
    profesional_id: DbId,
    input: AptoRecibirInput,
) -> AppResult<Usuario> {
    scope.require(Capability::ToggleWorkload)?;
    let empresa_id = scope.tenant_for(input.empresa_id)?;
    if scope.is_profesional() && profesional_id != scope.user_id {
        return Err(AppError::Forbidden(
            "Forbidden: professionals can only change their own availability.".to_string(),
        ));
    }

    let usuario = state
        .store
        .set_apto_recibir(empresa_id, profesional_id, input.apto_recibir)
        .await?
        .ok_or_else(|| {
            AppError::EntityNotFound(format!("Professional {profesional_id} not found."))
        })?;

    tracing::info!(
        empresa_id,
        profesional_id,
        apto_recibir = usuario.apto_recibir,
        "professional availability changed"
    );
    Ok(usuario)
}
