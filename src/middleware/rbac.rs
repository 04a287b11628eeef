// src/middleware/rbac.rs

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use std::marker::PhantomData;

use crate::{
    common::error::ApiError,
    models::auth::{Role, User},
};

/// 1. O Trait que define quais papéis uma rota aceita
pub trait RoleDef: Send + Sync + 'static {
    fn name() -> &'static str;
    fn allows(role: Role) -> bool;
}

/// 2. O Extractor (Guardião)
pub struct RequireRole<T>(pub PhantomData<T>);

// 3. Implementação do FromRequestParts
impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleDef,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // A. Usuário inserido pelo auth_guard
        let user = parts
            .extensions
            .get::<User>()
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Usuario no autenticado."))?;

        // B. Verifica o papel
        if !T::allows(user.role) {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                format!("Se requiere el rol '{}' para realizar esta acción.", T::name()),
            ));
        }

        Ok(RequireRole(PhantomData))
    }
}

// ---
// DEFINIÇÃO DOS PAPÉIS (TIPOS)
// ---

pub struct StaffOnly;
impl RoleDef for StaffOnly {
    fn name() -> &'static str { "staff" }
    fn allows(role: Role) -> bool { role.is_staff() }
}

pub struct AdminOnly;
impl RoleDef for AdminOnly {
    fn name() -> &'static str { "admin" }
    fn allows(role: Role) -> bool { role == Role::Admin }
}

pub struct MemberOnly;
impl RoleDef for MemberOnly {
    fn name() -> &'static str { "alumno" }
    fn allows(role: Role) -> bool { role == Role::Alumno }
}
