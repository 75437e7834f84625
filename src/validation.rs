//! Field-level checks run before a form is sent to the backend.

use crate::api::admin::RewardDraft;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub const MAX_PASSWORD_LEN: usize = 72;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;

/// A single invalid field
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_email(email: &str, errors: &mut Vec<ValidationError>) {
    let email = email.trim();
    if email.is_empty() {
        errors.push(ValidationError::new("email", "El correo es obligatorio"));
    } else if !(*EMAIL_RE).as_ref().is_some_and(|re| re.is_match(email)) {
        errors.push(ValidationError::new("email", "Correo electrónico inválido"));
    }
}

fn check_name(field: &str, name: &str, errors: &mut Vec<ValidationError>) {
    let len = name.trim().chars().count();
    if !NAME_LEN.contains(&len) {
        errors.push(ValidationError::new(
            field,
            format!(
                "Debe tener entre {} y {} caracteres",
                NAME_LEN.start(),
                NAME_LEN.end()
            ),
        ));
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_email(email, &mut errors);
    let len = password.chars().count();
    if len == 0 {
        errors.push(ValidationError::new("password", "La contraseña es obligatoria"));
    } else if len > MAX_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            format!("Máximo {} caracteres", MAX_PASSWORD_LEN),
        ));
    }
    finish(errors)
}

pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_name("nombre", name, &mut errors);
    check_email(email, &mut errors);
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            format!("Mínimo {} caracteres", MIN_PASSWORD_LEN),
        ));
    } else if len > MAX_PASSWORD_LEN {
        errors.push(ValidationError::new(
            "password",
            format!("Máximo {} caracteres", MAX_PASSWORD_LEN),
        ));
    }
    finish(errors)
}

pub fn validate_reward(draft: &RewardDraft) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_name("nombre", &draft.nombre, &mut errors);
    if draft.puntos_requeridos <= 0 {
        errors.push(ValidationError::new(
            "puntos_requeridos",
            "Los puntos deben ser mayores a 0",
        ));
    }
    if draft.stock < 0 {
        errors.push(ValidationError::new("stock", "El stock no puede ser negativo"));
    }
    finish(errors)
}
