pub mod backup;
pub mod health;
pub mod list_backups;
pub mod plan;
pub mod provision;
pub mod verify;
