//! Wire types for the maintenance backend. All payloads are camelCase JSON.

pub mod auth;
pub mod backup;
pub mod compatibility;
pub mod extraction;
pub mod machine;
pub mod part;
pub mod timestamp;
pub mod training;
pub mod user;

pub use auth::{LoginRequest, LoginResponse, RefreshRequest};
pub use backup::{
    BackupInfo, BackupKind, BackupProgress, BackupRunStatus, BackupStarted, BackupStatus, BackupStep,
};
pub use compatibility::{Compatibility, CompatibilityRequest, MachineSearch};
pub use extraction::{ExtractedMachine, PdfExtractionResponse};
pub use machine::{
    CreateMachineRequest, Machine, MachineStatus, MagazineProperties, UpdateMachineRequest,
    UpdateStatusRequest,
};
pub use part::{CategoryEncoding, MaintenancePart, PartCategory, PartRequest};
pub use training::{CustomModel, PrebuiltModel, TrainingOperation, TrainingStatus};
pub use user::{
    ChangePasswordRequest, CreateUserRequest, ResetPasswordRequest, Role, UpdateUserRequest, User,
};
