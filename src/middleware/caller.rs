// src/middleware/caller.rs

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{common::error::AppError, models::billing::CallerRole};

// Cabeçalhos preenchidos pelo gateway (a verificação da identidade acontece lá)
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Quem está consultando: papel + id do usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub role: CallerRole,
    pub caller_id: i64,
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = match header_str(parts, CALLER_ROLE_HEADER)? {
            "admin" => CallerRole::Admin,
            "landlord" => CallerRole::Landlord,
            "tenant" => CallerRole::Tenant,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "cabeçalho {} inválido: '{}' (esperado admin, landlord ou tenant)",
                    CALLER_ROLE_HEADER, other
                )))
            }
        };

        let caller_id = header_str(parts, CALLER_ID_HEADER)?
            .parse::<i64>()
            .map_err(|_| {
                AppError::InvalidInput(format!("cabeçalho {} deve ser um id numérico", CALLER_ID_HEADER))
            })?;

        Ok(CallerContext { role, caller_id })
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::InvalidInput(format!("o cabeçalho {} é obrigatório", name)))?
        .to_str()
        .map(str::trim)
        .map_err(|_| AppError::InvalidInput(format!("cabeçalho {} contém caracteres inválidos", name)))
}
