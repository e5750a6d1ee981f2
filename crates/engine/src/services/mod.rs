//! Typed wrappers per backend resource. Each service is a thin, cloneable
//! handle over the shared [`ApiClient`](crate::client::ApiClient).

pub mod auth;
pub mod backups;
pub mod compatibility;
pub mod machines;
pub mod parts;
pub mod pdf;
pub mod training;
pub mod users;

pub use auth::AuthService;
pub use backups::{BackupService, BackupWatch};
pub use compatibility::CompatibilityService;
pub use machines::MachineService;
pub use parts::PartService;
pub use pdf::{PdfService, PdfUpload};
pub use training::{sanitize_model_name, TrainingService};
pub use users::UserService;
