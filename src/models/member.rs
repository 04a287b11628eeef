// src/models/member.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Titular usado quando nenhum instrutor pode ser atribuído à cuota.
pub const ADMINISTRATION_TITULAR: &str = "Administración";

/// Responsável pelos valores de uma cuota (quem recebe / em nome de quem se fatura).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Titular {
    Staff { dni: String, full_name: String },
    Administration,
}

impl Titular {
    pub fn label(&self) -> &str {
        match self {
            Titular::Staff { full_name, .. } => full_name,
            Titular::Administration => ADMINISTRATION_TITULAR,
        }
    }

    pub fn staff_dni(&self) -> Option<&str> {
        match self {
            Titular::Staff { dni, .. } => Some(dni),
            Titular::Administration => None,
        }
    }
}

/// Uma linha de "Asiste": grupo/dia que o alumno frequenta e o instrutor (se houver).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GroupAssignment {
    pub member_dni: String,
    pub group_no: i32,
    pub day_position: i16,
    pub staff_dni: Option<String>,
    pub staff_name: Option<String>,
}

/// Ponto único de decisão do titular, usado na preferência de pago, no webhook
/// e no agrupamento do cierre.
///
/// O titular é o instrutor do primeiro grupo/dia que o alumno frequenta
/// (menor número de grupo, depois dia da semana). Sem instrutor nesse grupo,
/// ou sem grupos, o titular é a Administración.
pub fn resolve_titular(assignments: &[GroupAssignment]) -> Titular {
    let first = assignments
        .iter()
        .min_by_key(|a| (a.group_no, a.day_position));

    match first {
        Some(GroupAssignment { staff_dni: Some(dni), staff_name: Some(name), .. }) => Titular::Staff {
            dni: dni.trim().to_string(),
            full_name: name.clone(),
        },
        _ => Titular::Administration,
    }
}

// Dados do pagador para o gateway
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MemberContact {
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl MemberContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// --- Ativação de alumno ---

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    #[schema(example = 3)]
    pub group_no: i32,
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Lunes")]
    pub day: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberActivation {
    #[validate(length(equal = 8, message = "El DNI debe tener 8 dígitos."))]
    #[schema(example = "30111222")]
    pub dni: String,

    #[schema(example = "F")]
    pub sex: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Musculación")]
    pub job_name: String,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "3 días")]
    pub plan_name: String,

    #[schema(example = "Intermedio")]
    pub level: Option<String>,
    #[schema(example = "Hockey")]
    pub sport: Option<String>,

    #[validate(nested)]
    #[serde(default)]
    pub schedules: Vec<ScheduleSlot>,
}

impl MemberActivation {
    pub fn has_numeric_dni(&self) -> bool {
        self.dni.len() == 8 && self.dni.chars().all(|c| c.is_ascii_digit())
    }
}
