// src/models/auth.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Empleado,
    Alumno,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Empleado)
    }
}

// Estrutura de dados ("claims") dentro do JWT. A emissão fica no serviço de login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // DNI da pessoa
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// Usuário autenticado extraído do token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub dni: String,
    pub role: Role,
}

impl From<Claims> for User {
    fn from(claims: Claims) -> Self {
        Self { dni: claims.sub, role: claims.role }
    }
}
