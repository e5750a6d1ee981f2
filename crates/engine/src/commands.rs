//! Command registry and the built-in commands.
//!
//! Commands are registered by name with a minimum role, invoked with JSON
//! input and produce a [`CommandResult`]. The role guard runs before the
//! handler; reads go through the query cache and mutations invalidate it.

use crate::cache::QueryKey;
use crate::context::AppContext;
use crate::dashboard::DashboardSummary;
use crate::error::ApiError;
use crate::guard::{self, AppRoute, GuardDecision};
use crate::import::ImportError;
use crate::model::*;
use crate::services::PdfUpload;
use crate::types::*;
use crate::validation::{self, ValidationErrors};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, CommandError>> + Send + 'a>>;

/// Signature for all engine commands.
pub type CommandHandler = for<'a> fn(Value, &'a AppContext) -> CommandFuture<'a>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error("{0}")]
    Import(#[from] ImportError),
    #[error("Bitte melden Sie sich an.")]
    Unauthenticated,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The machine exists, but its magazine data was rejected.
    #[error("Maschine angelegt, Magazindaten nicht gespeichert: {}", .source.user_message())]
    MagazineNotSaved { machine: Value, source: ApiError },
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::InvalidInput(_) => ErrorCode::InvalidInput,
            CommandError::Validation(_) => ErrorCode::ValidationFailed,
            CommandError::Api(e) => e.error_code(),
            CommandError::Import(ImportError::Extraction(e)) => e.error_code(),
            CommandError::Import(_) => ErrorCode::InvalidInput,
            CommandError::Unauthenticated => ErrorCode::Unauthenticated,
            CommandError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            CommandError::Io(_) => ErrorCode::IoError,
            CommandError::MagazineNotSaved { source, .. } => source.error_code(),
        }
    }

    /// Field-level messages, or the record that was created anyway.
    pub fn details(&self) -> Value {
        match self {
            CommandError::MagazineNotSaved { machine, .. } => json!({ "machine": machine }),
            CommandError::Validation(v) => json!({ "fields": v }),
            CommandError::Api(ApiError::Validation { fields, .. }) if !fields.is_empty() => {
                json!({ "fields": fields })
            }
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Registered {
    handler: CommandHandler,
    /// `None` for commands that work without a session.
    min_role: Option<Role>,
}

pub struct CommandRegistry {
    handlers: HashMap<String, Registered>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        // Session
        reg.register("ping", None, cmd_ping);
        reg.register("auth.login", None, cmd_auth_login);
        reg.register("auth.logout", None, cmd_auth_logout);
        reg.register("auth.refresh", Some(Role::Viewer), cmd_auth_refresh);
        reg.register("auth.me", Some(Role::Viewer), cmd_auth_me);
        reg.register("session.status", None, cmd_session_status);
        reg.register("route.check", None, cmd_route_check);

        // Machines
        reg.register("machines.list", Some(Role::Viewer), cmd_machines_list);
        reg.register("machines.get", Some(Role::Viewer), cmd_machines_get);
        reg.register("machines.create", Some(Role::Technician), cmd_machines_create);
        reg.register("machines.update", Some(Role::Technician), cmd_machines_update);
        reg.register(
            "machines.update_magazine",
            Some(Role::Technician),
            cmd_machines_update_magazine,
        );
        reg.register(
            "machines.update_status",
            Some(Role::Technician),
            cmd_machines_update_status,
        );

        // Parts
        reg.register("parts.list", Some(Role::Viewer), cmd_parts_list);
        reg.register("parts.get", Some(Role::Viewer), cmd_parts_get);
        reg.register("parts.create", Some(Role::Technician), cmd_parts_create);
        reg.register("parts.update", Some(Role::Technician), cmd_parts_update);
        reg.register("parts.delete", Some(Role::Technician), cmd_parts_delete);

        // Compatibility
        reg.register("compat.list", Some(Role::Viewer), cmd_compat_list);
        reg.register("compat.get", Some(Role::Viewer), cmd_compat_get);
        reg.register("compat.for_part", Some(Role::Viewer), cmd_compat_for_part);
        reg.register("compat.series", Some(Role::Viewer), cmd_compat_series);
        reg.register("compat.search", Some(Role::Viewer), cmd_compat_search);
        reg.register("compat.create", Some(Role::Technician), cmd_compat_create);
        reg.register("compat.update", Some(Role::Technician), cmd_compat_update);
        reg.register("compat.delete", Some(Role::Technician), cmd_compat_delete);

        // Users
        reg.register("users.list", Some(Role::Admin), cmd_users_list);
        reg.register("users.get", Some(Role::Admin), cmd_users_get);
        reg.register("users.create", Some(Role::Admin), cmd_users_create);
        reg.register("users.update", Some(Role::Admin), cmd_users_update);
        reg.register("users.delete", Some(Role::Admin), cmd_users_delete);
        reg.register("users.activate", Some(Role::Admin), cmd_users_activate);
        reg.register("users.deactivate", Some(Role::Admin), cmd_users_deactivate);
        reg.register("users.restore", Some(Role::Admin), cmd_users_restore);
        reg.register("users.reset_password", Some(Role::Admin), cmd_users_reset_password);
        reg.register(
            "users.change_password",
            Some(Role::Viewer),
            cmd_users_change_password,
        );

        // Backups
        reg.register("backups.list", Some(Role::Admin), cmd_backups_list);
        reg.register("backups.status", Some(Role::Admin), cmd_backups_status);
        reg.register("backups.active", Some(Role::Admin), cmd_backups_active);
        reg.register("backups.create", Some(Role::Admin), cmd_backups_create);
        reg.register("backups.progress", Some(Role::Admin), cmd_backups_progress);
        reg.register("backups.restore", Some(Role::Admin), cmd_backups_restore);
        reg.register("backups.delete", Some(Role::Admin), cmd_backups_delete);

        // Model training
        reg.register("models.list", Some(Role::Admin), cmd_models_list);
        reg.register("models.train", Some(Role::Admin), cmd_models_train);
        reg.register("models.operation", Some(Role::Admin), cmd_models_operation);
        reg.register("models.delete", Some(Role::Admin), cmd_models_delete);

        // Import and dashboard
        reg.register("import.extract", Some(Role::Technician), cmd_import_extract);
        reg.register("import.run", Some(Role::Technician), cmd_import_run);
        reg.register("dashboard.summary", Some(Role::Viewer), cmd_dashboard_summary);
        reg
    }

    pub fn register(&mut self, name: &str, min_role: Option<Role>, handler: CommandHandler) {
        self.handlers
            .insert(name.to_string(), Registered { handler, min_role });
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn min_role(&self, name: &str) -> Option<Role> {
        self.handlers.get(name).and_then(|r| r.min_role)
    }

    /// Execute a command by name and return a full CommandResult.
    pub async fn execute(&self, name: &str, args: Value, ctx: &AppContext) -> CommandResult {
        let run = Run::start("call", name);

        let Some(registered) = self.handlers.get(name).copied() else {
            return run.error(
                ErrorCode::InvalidInput,
                format!("unknown command: {}", name),
            );
        };

        let outcome = match authorize(registered.min_role, ctx) {
            Ok(()) => (registered.handler)(args, ctx).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(data) => run.pass().with_data(data),
            Err(e) => {
                tracing::debug!(command = name, error = %e, "command failed");
                run.error(e.error_code(), e.to_string())
                    .with_details(e.details())
            }
        };
        result.with_user(ctx.session().current_user().map(|u| u.username))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn authorize(min_role: Option<Role>, ctx: &AppContext) -> Result<(), CommandError> {
    let Some(min_role) = min_role else {
        return Ok(());
    };
    match guard::check(ctx.session().current_user().as_ref(), Some(min_role)) {
        GuardDecision::Allow => Ok(()),
        GuardDecision::RedirectToLogin => Err(CommandError::Unauthenticated),
        GuardDecision::RedirectToHome => Err(CommandError::PermissionDenied(format!(
            "Rolle {} erforderlich.",
            min_role.label_de()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, CommandError> {
    serde_json::from_value(args).map_err(|e| CommandError::InvalidInput(e.to_string()))
}

fn int_arg(args: &Value, key: &str) -> Result<i64, CommandError> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| CommandError::InvalidInput(format!("missing '{}' integer field", key)))
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, CommandError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidInput(format!("missing '{}' string field", key)))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::InvalidInput(e.to_string()))
}

fn read_pdf(path: &str) -> Result<PdfUpload, CommandError> {
    Ok(PdfUpload::from_path(&PathBuf::from(path))?)
}

// ===========================================================================
// Session commands
// ===========================================================================

/// `ping` – returns { "pong": true }. Proves wiring works.
fn cmd_ping(_args: Value, _ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { Ok(json!({ "pong": true })) })
}

/// Args: `{ "username": "...", "password": "..." }`
fn cmd_auth_login(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let username = str_arg(&args, "username")?;
        let password = str_arg(&args, "password")?;
        let user = ctx.auth().login(username, password).await?;
        ctx.cache().clear();
        to_value(&user)
    })
}

fn cmd_auth_logout(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        ctx.auth().logout().await?;
        ctx.cache().clear();
        Ok(json!({ "loggedOut": true }))
    })
}

fn cmd_auth_refresh(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        ctx.session_monitor().extend_session().await?;
        session_status(ctx)
    })
}

fn cmd_auth_me(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { to_value(&ctx.auth().me().await?) })
}

fn session_status(ctx: &AppContext) -> Result<Value, CommandError> {
    let monitor = ctx.session_monitor();
    let session = ctx.session().get();
    Ok(json!({
        "authenticated": session.is_some(),
        "user": session.as_ref().map(|s| &s.user),
        "expiresAt": session.as_ref().and_then(|s| s.expires_at()),
        "session": monitor.state(),
    }))
}

fn cmd_session_status(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { session_status(ctx) })
}

/// Args: `{ "path": "/machines/12/edit" }`
fn cmd_route_check(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let path = str_arg(&args, "path")?;
        let route = AppRoute::from_path(path)
            .ok_or_else(|| CommandError::InvalidInput(format!("unknown route: {}", path)))?;
        let decision = route.check(ctx.session().current_user().as_ref());
        let redirect = match decision {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin => Some(AppRoute::Login.pattern()),
            GuardDecision::RedirectToHome => Some(AppRoute::HOME.pattern()),
        };
        Ok(json!({
            "route": route,
            "requiredRole": route.required_role(),
            "decision": decision,
            "redirect": redirect,
        }))
    })
}

// ===========================================================================
// Machines
// ===========================================================================

fn cmd_machines_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.machines();
        let machines = ctx
            .cache()
            .get_or_fetch(QueryKey::Machines, || svc.list())
            .await?;
        to_value(&machines)
    })
}

/// Args: `{ "id": 12 }`
fn cmd_machines_get(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let svc = ctx.machines();
        let machine = ctx
            .cache()
            .get_or_fetch(QueryKey::Machine(id), || svc.get(id))
            .await?;
        to_value(&machine)
    })
}

/// Args: a machine form (`number`, `type`, `operatingHours`,
/// `installationDate`, `status`) plus optional magazine fields.
fn cmd_machines_create(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let magazine: MagazineProperties = parse(args.clone())?;
        let req: CreateMachineRequest = parse(args)?;
        validation::validate_machine(&req, ctx.clock().now())?;
        validation::validate_magazine(&magazine)?;

        let svc = ctx.machines();
        let machine = svc.create(&req).await?;
        ctx.cache().invalidate(QueryKey::Machines);
        if magazine.is_present() {
            if let Err(e) = svc.update_magazine(machine.id, &magazine).await {
                tracing::warn!(id = machine.id, error = %e, "magazine update failed after create");
                return Err(CommandError::MagazineNotSaved {
                    machine: to_value(&machine)?,
                    source: e,
                });
            }
        }
        to_value(&machine)
    })
}

/// Args: `{ "id": 12, ...machine form }`
fn cmd_machines_update(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let req: UpdateMachineRequest = parse(args)?;
        validation::validate_machine_update(&req, ctx.clock().now())?;
        ctx.machines().update(id, &req).await?;
        ctx.cache().invalidate(QueryKey::Machines);
        ctx.cache().invalidate(QueryKey::Machine(id));
        Ok(json!({ "id": id, "updated": true }))
    })
}

/// Args: `{ "id": 12, "magazineType": "...", "materialBarLength": 3200, ... }`
fn cmd_machines_update_magazine(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let props: MagazineProperties = parse(args)?;
        validation::validate_magazine(&props)?;
        ctx.machines().update_magazine(id, &props).await?;
        ctx.cache().invalidate(QueryKey::Machine(id));
        Ok(json!({ "id": id, "updated": true }))
    })
}

/// Args: `{ "id": 12, "status": "InMaintenance" }`
fn cmd_machines_update_status(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let status: MachineStatus = str_arg(&args, "status")?
            .parse()
            .map_err(CommandError::InvalidInput)?;
        ctx.machines().update_status(id, status).await?;
        ctx.cache().invalidate(QueryKey::Machines);
        ctx.cache().invalidate(QueryKey::Machine(id));
        Ok(json!({ "id": id, "status": status }))
    })
}

// ===========================================================================
// Parts
// ===========================================================================

fn cmd_parts_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.parts();
        let parts = ctx
            .cache()
            .get_or_fetch(QueryKey::Parts, || svc.list())
            .await?;
        to_value(&parts)
    })
}

/// Args: `{ "id": 4 }` or `{ "partNumber": "VS-2001" }`
fn cmd_parts_get(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.parts();
        let part = match args.get("partNumber").and_then(Value::as_str) {
            Some(number) => svc.get_by_number(number).await?,
            None => {
                let id = int_arg(&args, "id")?;
                ctx.cache()
                    .get_or_fetch(QueryKey::Part(id), || svc.get(id))
                    .await?
            }
        };
        to_value(&part)
    })
}

fn cmd_parts_create(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let req: PartRequest = parse(args)?;
        validation::validate_part(&req)?;
        let part = ctx.parts().create(&req).await?;
        ctx.cache().invalidate(QueryKey::Parts);
        to_value(&part)
    })
}

fn cmd_parts_update(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let req: PartRequest = parse(args)?;
        validation::validate_part(&req)?;
        ctx.parts().update(id, &req).await?;
        ctx.cache().invalidate(QueryKey::Parts);
        ctx.cache().invalidate(QueryKey::Part(id));
        Ok(json!({ "id": id, "updated": true }))
    })
}

fn cmd_parts_delete(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        ctx.parts().delete(id).await?;
        ctx.cache().invalidate(QueryKey::Parts);
        ctx.cache().invalidate(QueryKey::Part(id));
        ctx.cache().invalidate(QueryKey::Compatibility);
        Ok(json!({ "id": id, "deleted": true }))
    })
}

// ===========================================================================
// Compatibility
// ===========================================================================

fn cmd_compat_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.compatibility();
        let entries = ctx
            .cache()
            .get_or_fetch(QueryKey::Compatibility, || svc.list())
            .await?;
        to_value(&entries)
    })
}

fn cmd_compat_get(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        to_value(&ctx.compatibility().get(id).await?)
    })
}

/// Args: `{ "partId": 4 }`
fn cmd_compat_for_part(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let part_id = int_arg(&args, "partId")?;
        to_value(&ctx.compatibility().for_part(part_id).await?)
    })
}

fn cmd_compat_series(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { to_value(&ctx.compatibility().series().await?) })
}

/// Args: `{ "series": "CTX", "year": 2019, "model": "beta 800" }`, all optional.
fn cmd_compat_search(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let search: MachineSearch = parse(args)?;
        to_value(&ctx.compatibility().search(&search).await?)
    })
}

fn cmd_compat_create(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let req: CompatibilityRequest = parse(args)?;
        validation::validate_compatibility(&req)?;
        let entry = ctx.compatibility().create(&req).await?;
        ctx.cache().invalidate(QueryKey::Compatibility);
        to_value(&entry)
    })
}

fn cmd_compat_update(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let req: CompatibilityRequest = parse(args)?;
        validation::validate_compatibility(&req)?;
        ctx.compatibility().update(id, &req).await?;
        ctx.cache().invalidate(QueryKey::Compatibility);
        Ok(json!({ "id": id, "updated": true }))
    })
}

fn cmd_compat_delete(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        ctx.compatibility().delete(id).await?;
        ctx.cache().invalidate(QueryKey::Compatibility);
        Ok(json!({ "id": id, "deleted": true }))
    })
}

// ===========================================================================
// Users
// ===========================================================================

fn cmd_users_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.users();
        let users = ctx
            .cache()
            .get_or_fetch(QueryKey::Users, || svc.list())
            .await?;
        to_value(&users)
    })
}

fn cmd_users_get(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        to_value(&ctx.users().get(id).await?)
    })
}

fn cmd_users_create(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let req: CreateUserRequest = parse(args)?;
        validation::validate_new_user(&req)?;
        let user = ctx.users().create(&req).await?;
        ctx.cache().invalidate(QueryKey::Users);
        to_value(&user)
    })
}

fn cmd_users_update(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let req: UpdateUserRequest = parse(args)?;
        validation::validate_user_update(&req)?;
        ctx.users().update(id, &req).await?;
        ctx.cache().invalidate(QueryKey::Users);
        Ok(json!({ "id": id, "updated": true }))
    })
}

/// Soft delete; the user can be restored.
fn cmd_users_delete(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        if ctx.session().current_user().is_some_and(|u| u.id == id) {
            return Err(CommandError::InvalidInput(
                "Sie können Ihr eigenes Konto nicht löschen.".into(),
            ));
        }
        ctx.users().delete(id).await?;
        ctx.cache().invalidate(QueryKey::Users);
        Ok(json!({ "id": id, "deleted": true }))
    })
}

fn cmd_users_activate(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        ctx.users().activate(id).await?;
        ctx.cache().invalidate(QueryKey::Users);
        Ok(json!({ "id": id, "isActive": true }))
    })
}

fn cmd_users_deactivate(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        ctx.users().deactivate(id).await?;
        ctx.cache().invalidate(QueryKey::Users);
        Ok(json!({ "id": id, "isActive": false }))
    })
}

fn cmd_users_restore(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        ctx.users().restore(id).await?;
        ctx.cache().invalidate(QueryKey::Users);
        Ok(json!({ "id": id, "restored": true }))
    })
}

/// Args: `{ "id": 7, "newPassword": "..." }`
fn cmd_users_reset_password(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = int_arg(&args, "id")?;
        let new_password = str_arg(&args, "newPassword")?;
        validation::validate_password(new_password)?;
        ctx.users().reset_password(id, new_password).await?;
        Ok(json!({ "id": id, "passwordReset": true }))
    })
}

/// Changes the signed-in user's own password.
///
/// Args: `{ "currentPassword": "...", "newPassword": "...", "confirmPassword": "..." }`
fn cmd_users_change_password(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let user = ctx
            .session()
            .current_user()
            .ok_or(CommandError::Unauthenticated)?;
        let req: ChangePasswordRequest = parse(args.clone())?;
        let confirmation = args
            .get("confirmPassword")
            .and_then(Value::as_str)
            .unwrap_or(req.new_password.as_str());
        validation::validate_password_change(&req, confirmation)?;
        ctx.users()
            .change_password(user.id, &req.current_password, &req.new_password)
            .await?;
        Ok(json!({ "id": user.id, "passwordChanged": true }))
    })
}

// ===========================================================================
// Backups
// ===========================================================================

fn cmd_backups_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.backups();
        let backups = ctx
            .cache()
            .get_or_fetch(QueryKey::Backups, || svc.list())
            .await?;
        to_value(&backups)
    })
}

fn cmd_backups_status(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { to_value(&ctx.backups().status().await?) })
}

fn cmd_backups_active(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move { to_value(&ctx.backups().active().await?) })
}

/// Args: `{ "complete": true }` for database plus files; database only otherwise.
fn cmd_backups_create(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let complete = args.get("complete").and_then(Value::as_bool).unwrap_or(false);
        let svc = ctx.backups();
        let started = if complete {
            svc.create_complete().await?
        } else {
            svc.create().await?
        };
        ctx.cache().invalidate(QueryKey::Backups);
        to_value(&started)
    })
}

/// Args: `{ "backupId": "..." }`
fn cmd_backups_progress(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = str_arg(&args, "backupId")?;
        to_value(&ctx.backups().progress(id).await?)
    })
}

/// Args: `{ "fileName": "backup_20241001.zip" }`
fn cmd_backups_restore(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let file_name = str_arg(&args, "fileName")?;
        ctx.backups().restore(file_name).await?;
        // Everything may have changed.
        ctx.cache().clear();
        Ok(json!({ "fileName": file_name, "restored": true }))
    })
}

fn cmd_backups_delete(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let file_name = str_arg(&args, "fileName")?;
        ctx.backups().delete(file_name).await?;
        ctx.cache().invalidate(QueryKey::Backups);
        Ok(json!({ "fileName": file_name, "deleted": true }))
    })
}

// ===========================================================================
// Model training
// ===========================================================================

fn cmd_models_list(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let svc = ctx.training();
        let custom = ctx
            .cache()
            .get_or_fetch(QueryKey::CustomModels, || svc.custom_models())
            .await?;
        let prebuilt = svc.prebuilt_models().await?;
        Ok(json!({ "custom": custom, "prebuilt": prebuilt }))
    })
}

/// Args: `{ "name": "lieferscheine", "description": "...", "files": ["a.pdf"] }`
fn cmd_models_train(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let name = str_arg(&args, "name")?;
        let description = args.get("description").and_then(Value::as_str);
        let files = args
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| CommandError::InvalidInput("missing 'files' array field".into()))?;
        let samples = files
            .iter()
            .map(|f| {
                f.as_str()
                    .ok_or_else(|| CommandError::InvalidInput("'files' must hold paths".into()))
                    .and_then(read_pdf)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let op = ctx.training().train(name, description, &samples).await?;
        ctx.cache().invalidate(QueryKey::CustomModels);
        to_value(&op)
    })
}

/// Args: `{ "operationId": "..." }`
fn cmd_models_operation(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = str_arg(&args, "operationId")?;
        let op = ctx.training().operation(id).await?;
        if op.status.is_terminal() {
            ctx.cache().invalidate(QueryKey::CustomModels);
        }
        to_value(&op)
    })
}

/// Args: `{ "modelId": "..." }`
fn cmd_models_delete(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = str_arg(&args, "modelId")?;
        ctx.training().delete_model(id).await?;
        ctx.cache().invalidate(QueryKey::CustomModels);
        Ok(json!({ "modelId": id, "deleted": true }))
    })
}

// ===========================================================================
// Import and dashboard
// ===========================================================================

/// Upload and extract only; nothing is created.
///
/// Args: `{ "path": "maschinen.pdf" }`
fn cmd_import_extract(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let upload = read_pdf(str_arg(&args, "path")?)?;
        let mut wizard = ctx.import_wizard();
        wizard.select_file(upload)?;
        wizard.process().await?;
        Ok(json!({
            "step": wizard.step(),
            "records": wizard.records(),
            "selected": wizard.selected_indices(),
        }))
    })
}

/// Full import: extract, select, create, return to the list.
///
/// Args: `{ "path": "maschinen.pdf", "select": [0, 2] }`. Without `select`
/// the preselection (valid and not yet existing) is used.
fn cmd_import_run(args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let upload = read_pdf(str_arg(&args, "path")?)?;
        let selection: Option<Vec<usize>> = match args.get("select") {
            Some(v) if !v.is_null() => Some(parse(v.clone())?),
            _ => None,
        };

        let mut wizard = ctx.import_wizard();
        wizard.select_file(upload)?;
        wizard.process().await?;
        if let Some(indices) = selection {
            wizard.clear_selection()?;
            for i in indices {
                wizard.select(i)?;
            }
        }
        let summary = wizard.create_selected().await?.clone();
        wizard.finish_to_list(ctx.cache())?;
        to_value(&summary)
    })
}

fn cmd_dashboard_summary(_args: Value, ctx: &AppContext) -> CommandFuture<'_> {
    Box::pin(async move {
        let machines_svc = ctx.machines();
        let parts_svc = ctx.parts();
        let machines = ctx
            .cache()
            .get_or_fetch(QueryKey::Machines, || machines_svc.list())
            .await?;
        let parts = ctx
            .cache()
            .get_or_fetch(QueryKey::Parts, || parts_svc.list())
            .await?;
        to_value(&DashboardSummary::compute(
            &machines,
            &parts,
            &ctx.config().dashboard,
        ))
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::sample_session;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx_for(base_url: &str) -> AppContext {
        let mut config = EngineConfig::defaults().unwrap();
        config.api.base_url = base_url.to_string();
        config.retry.max_retries = 0;
        AppContext::in_memory(config).unwrap()
    }

    fn signed_in(base_url: &str, role: Role) -> AppContext {
        let ctx = ctx_for(base_url);
        ctx.session().set(sample_session(role, 4_000_000_000)).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_ping_command() {
        let ctx = ctx_for("http://127.0.0.1:9");
        let reg = CommandRegistry::new();
        let result = reg.execute("ping", json!({}), &ctx).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.data.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let ctx = ctx_for("http://127.0.0.1:9");
        let reg = CommandRegistry::new();
        let result = reg.execute("nonexistent", json!({}), &ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_guard_runs_before_handler() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Machines"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let reg = CommandRegistry::new();

        let anonymous = ctx_for(&server.uri());
        let r = reg.execute("machines.list", json!({}), &anonymous).await;
        assert_eq!(r.error.unwrap().code, ErrorCode::Unauthenticated);

        let viewer = signed_in(&server.uri(), Role::Viewer);
        let r = reg
            .execute("machines.create", json!({"number": "M-1"}), &viewer)
            .await;
        assert_eq!(r.error.unwrap().code, ErrorCode::PermissionDenied);
        assert_eq!(r.user.as_deref(), Some("schmidt"));
    }

    #[tokio::test]
    async fn test_validation_errors_carry_fields() {
        let ctx = signed_in("http://127.0.0.1:9", Role::Technician);
        let reg = CommandRegistry::new();
        let r = reg
            .execute(
                "machines.create",
                json!({
                    "number": "", "type": "CTX", "operatingHours": 10,
                    "installationDate": "2020-01-01", "status": "Active"
                }),
                &ctx,
            )
            .await;
        let err = r.error.unwrap();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.details["fields"]["number"].is_string());
    }

    #[tokio::test]
    async fn test_create_invalidates_machine_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Machines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/Machines"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 41, "number": "M-200", "type": "CTX", "operatingHours": 0,
                "installationDate": "2024-02-01T00:00:00Z", "status": "Active"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = signed_in(&server.uri(), Role::Technician);
        let reg = CommandRegistry::new();
        // Second list is served from cache.
        reg.execute("machines.list", json!({}), &ctx).await;
        reg.execute("machines.list", json!({}), &ctx).await;

        let created = reg
            .execute(
                "machines.create",
                json!({
                    "number": "M-200", "type": "CTX", "operatingHours": 0,
                    "installationDate": "2024-02-01", "status": "Active"
                }),
                &ctx,
            )
            .await;
        assert_eq!(created.status, Status::Pass, "{:?}", created.error);
        assert_eq!(created.data.unwrap()["id"], 41);

        let listed = reg.execute("machines.list", json!({}), &ctx).await;
        assert_eq!(listed.status, Status::Pass);
    }

    #[tokio::test]
    async fn test_create_reports_machine_when_magazine_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Machines"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 42, "number": "M-201", "type": "CTX", "operatingHours": 0,
                "installationDate": "2024-02-01T00:00:00Z", "status": "Active"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/Machines/42/magazine"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = signed_in(&server.uri(), Role::Technician);
        let reg = CommandRegistry::new();
        let r = reg
            .execute(
                "machines.create",
                json!({
                    "number": "M-201", "type": "CTX", "operatingHours": 0,
                    "installationDate": "2024-02-01", "status": "Active",
                    "magazineType": "LM 1200"
                }),
                &ctx,
            )
            .await;
        assert_eq!(r.status, Status::Error);
        let err = r.error.unwrap();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert!(err.message.starts_with("Maschine angelegt"));
        assert_eq!(err.details["machine"]["id"], 42);
    }

    #[tokio::test]
    async fn test_route_check() {
        let ctx = signed_in("http://127.0.0.1:9", Role::Technician);
        let reg = CommandRegistry::new();
        let r = reg
            .execute("route.check", json!({"path": "/users"}), &ctx)
            .await;
        let data = r.data.unwrap();
        assert_eq!(data["decision"], "redirectToHome");
        assert_eq!(data["redirect"], "/");
        assert_eq!(data["requiredRole"], "Admin");
    }

    #[test]
    fn test_list_commands() {
        let reg = CommandRegistry::new();
        let names = reg.list();
        assert!(names.contains(&"ping"));
        assert!(names.contains(&"import.run"));
        assert_eq!(reg.min_role("users.list"), Some(Role::Admin));
        assert_eq!(reg.min_role("auth.login"), None);
    }
}
