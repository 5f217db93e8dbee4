//!  Settings are kept as a single record, [entities::ExtensionSettings].
//!  The basic idea is:
//!   - Every reader loads the whole record and every writer replaces the whole record.
//!   - [store::SettingsStore] is the only way to touch it. Typed helpers live in
//!     [store::SettingsStoreExt].
//!   - The host process and the cli share the record through [file_store::FileSettingsStore].

pub mod entities;
pub mod file_store;
pub mod memory_store;
pub mod store;
