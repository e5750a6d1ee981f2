//! Form validation with German field messages.
//!
//! These checks run before a request is sent. The backend stays the
//! authority on uniqueness and referential integrity.

use crate::model::{
    ChangePasswordRequest, CompatibilityRequest, CreateMachineRequest, CreateUserRequest,
    MagazineProperties, PartRequest, UpdateMachineRequest, UpdateUserRequest,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const USERNAME_MIN_LEN: usize = 3;
pub const NUMBER_MAX_LEN: usize = 50;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Field name → message. Field names use the wire (camelCase) spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    #[serde(flatten)]
    fields: BTreeMap<String, String>,
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first message per field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn required(errors: &mut ValidationErrors, field: &str, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.add(field, format!("{} ist erforderlich.", label));
    }
}

fn max_len(errors: &mut ValidationErrors, field: &str, value: &str, max: usize, label: &str) {
    if value.trim().chars().count() > max {
        errors.add(field, format!("{} darf höchstens {} Zeichen lang sein.", label, max));
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email.trim()))
}

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

fn machine_fields(
    errors: &mut ValidationErrors,
    number: &str,
    machine_type: &str,
    operating_hours: i32,
    installation_date: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    required(errors, "number", number, "Maschinennummer");
    max_len(errors, "number", number, NUMBER_MAX_LEN, "Maschinennummer");
    required(errors, "type", machine_type, "Maschinentyp");
    if operating_hours < 0 {
        errors.add("operatingHours", "Betriebsstunden dürfen nicht negativ sein.");
    }
    if installation_date > now {
        errors.add(
            "installationDate",
            "Installationsdatum darf nicht in der Zukunft liegen.",
        );
    }
}

pub fn validate_machine(req: &CreateMachineRequest, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    machine_fields(
        &mut errors,
        &req.number,
        &req.machine_type,
        req.operating_hours,
        req.installation_date,
        now,
    );
    errors.into_result()
}

pub fn validate_machine_update(
    req: &UpdateMachineRequest,
    now: DateTime<Utc>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    machine_fields(
        &mut errors,
        &req.number,
        &req.machine_type,
        req.operating_hours,
        req.installation_date,
        now,
    );
    errors.into_result()
}

pub fn validate_magazine(props: &MagazineProperties) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if props.material_bar_length.is_some_and(|l| l <= 0) {
        errors.add(
            "materialBarLength",
            "Stangenlänge muss größer als 0 mm sein.",
        );
    }
    errors.into_result()
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

pub fn validate_part(req: &PartRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    required(&mut errors, "partNumber", &req.part_number, "Teilenummer");
    max_len(&mut errors, "partNumber", &req.part_number, NUMBER_MAX_LEN, "Teilenummer");
    required(&mut errors, "name", &req.name, "Bezeichnung");
    max_len(&mut errors, "name", &req.name, 200, "Bezeichnung");
    if !req.price.is_finite() || req.price < 0.0 {
        errors.add("price", "Preis darf nicht negativ sein.");
    }
    if req.stock_quantity < 0 {
        errors.add("stockQuantity", "Lagerbestand darf nicht negativ sein.");
    }
    errors.into_result()
}

pub fn validate_compatibility(req: &CompatibilityRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if req.part_id <= 0 {
        errors.add("partId", "Bitte wählen Sie ein Teil aus.");
    }
    required(
        &mut errors,
        "machineSeries",
        req.machine_series.as_deref().unwrap_or_default(),
        "Maschinenserie",
    );
    errors.into_result()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Minimum length plus at least one upper-case letter, lower-case letter and
/// digit.
pub fn password_problems(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LEN {
        problems.push("mindestens 8 Zeichen");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        problems.push("einen Großbuchstaben");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        problems.push("einen Kleinbuchstaben");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("eine Ziffer");
    }
    problems
}

fn password_field(errors: &mut ValidationErrors, field: &str, password: &str) {
    let problems = password_problems(password);
    if !problems.is_empty() {
        errors.add(
            field,
            format!("Passwort muss {} enthalten.", problems.join(", ")),
        );
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    password_field(&mut errors, "newPassword", password);
    errors.into_result()
}

pub fn validate_new_user(req: &CreateUserRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    required(&mut errors, "username", &req.username, "Benutzername");
    if !req.username.trim().is_empty() && req.username.trim().chars().count() < USERNAME_MIN_LEN {
        errors.add(
            "username",
            format!("Benutzername muss mindestens {} Zeichen lang sein.", USERNAME_MIN_LEN),
        );
    }
    if !is_valid_email(&req.email) {
        errors.add("email", "Bitte geben Sie eine gültige E-Mail-Adresse ein.");
    }
    password_field(&mut errors, "password", &req.password);
    errors.into_result()
}

pub fn validate_user_update(req: &UpdateUserRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if !is_valid_email(&req.email) {
        errors.add("email", "Bitte geben Sie eine gültige E-Mail-Adresse ein.");
    }
    errors.into_result()
}

/// `confirmation` is the repeated new password from the form.
pub fn validate_password_change(
    req: &ChangePasswordRequest,
    confirmation: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    required(&mut errors, "currentPassword", &req.current_password, "Aktuelles Passwort");
    password_field(&mut errors, "newPassword", &req.new_password);
    if req.new_password != confirmation {
        errors.add("confirmPassword", "Die Passwörter stimmen nicht überein.");
    }
    if !req.current_password.is_empty() && req.new_password == req.current_password {
        errors.add(
            "newPassword",
            "Das neue Passwort muss sich vom aktuellen unterscheiden.",
        );
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MachineStatus, PartCategory, Role};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    #[test]
    fn test_machine_form() {
        let mut req = CreateMachineRequest {
            number: "M-100".into(),
            machine_type: "CTX beta 800".into(),
            operating_hours: 1200,
            installation_date: DateTime::from_timestamp(1_500_000_000, 0).unwrap(),
            status: MachineStatus::Active,
        };
        assert!(validate_machine(&req, now()).is_ok());

        req.number = "  ".into();
        req.operating_hours = -1;
        req.installation_date = now() + chrono::Duration::days(1);
        let errors = validate_machine(&req, now()).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("number"), Some("Maschinennummer ist erforderlich."));
        assert!(errors.get("installationDate").is_some());
    }

    #[test]
    fn test_part_form() {
        let req = PartRequest {
            part_number: String::new(),
            name: "Spannzange".into(),
            description: None,
            category: PartCategory::WearPart,
            price: -3.0,
            manufacturer: None,
            stock_quantity: 4,
        };
        let errors = validate_part(&req).unwrap_err();
        assert!(errors.get("partNumber").is_some());
        assert!(errors.get("price").is_some());
        assert!(errors.get("stockQuantity").is_none());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Werkstatt2024").is_ok());
        let msg = validate_password("kurz").unwrap_err();
        let text = msg.get("newPassword").unwrap();
        assert!(text.contains("mindestens 8 Zeichen"));
        assert!(text.contains("Großbuchstaben"));
        assert!(text.contains("Ziffer"));
    }

    #[test]
    fn test_new_user_form() {
        let req = CreateUserRequest {
            username: "jo".into(),
            email: "jo@werk".into(),
            password: "Geheim123".into(),
            role: Role::Viewer,
        };
        let errors = validate_new_user(&req).unwrap_err();
        assert!(errors.get("username").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("password").is_none());
        assert!(is_valid_email("jo@werk.de"));
    }

    #[test]
    fn test_password_change_confirmation() {
        let req = ChangePasswordRequest {
            current_password: "Alt12345".into(),
            new_password: "Neu12345".into(),
        };
        assert!(validate_password_change(&req, "Neu12345").is_ok());
        let errors = validate_password_change(&req, "Neu1234").unwrap_err();
        assert!(errors.get("confirmPassword").is_some());
    }
}
