mod archive;
mod config;
mod consumers;
mod fs_utils;
mod inspect;
mod layout;
mod reload;
mod replace;
mod swap;
mod types;

pub use archive::{make_scratch_dir, resolve_input};
pub use config::{ReplaceOptions, SwapConfig};
pub use consumers::{
    collect_origins, container_path_from_descriptor, detach_consumers, find_consumers,
    ConsumerRegistry, RegistryEntity,
};
pub use fs_utils::{copy_with_metadata, remove_file_if_exists, sha256_file_hex};
pub use inspect::inspect_container;
pub use layout::{default_user_prefix, SwapLayout, DEFAULT_BACKUP_DIR_NAME};
pub use reload::{schedule_reload, HostProject, ReloadOutcome, ReloadQueue, ReloadRequest, ReloadScheduler};
pub use replace::{
    preview, replace_container, PreviewReport, PreviewSide, ReplaceContext, ReplaceRequest,
};
pub use swap::{
    backup_and_swap, backup_file_name, copy_over, create_backup, create_backup_at, list_backups,
};
pub use types::{
    BackupRecord, ConsumerRef, NullObserver, ReplaceObserver, ReplaceOutcome, ReplaceState,
    ReplaceStep, Severity, SwapOperation,
};

#[cfg(test)]
mod tests;
