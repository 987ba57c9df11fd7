//! Configuration for cardwright.
//!
//! Settings come from a single KDL file, `cardwright.kdl` (see [`schema`]),
//! with environment overrides for the tracker URL and credentials (see
//! [`resolver`]). Credentials are resolved once at startup and passed to the
//! tracker client explicitly.

pub mod resolver;
pub mod schema;

pub use resolver::{
    API_TOKEN_ENV, BASE_URL_ENV, CONFIG_FILE_NAME, CONFIG_PATH_ENV, CustomFieldIds, FolderLayout,
    Resolved, Settings, USERNAME_ENV, ValueSource, resolve_settings, resolve_settings_with,
};
pub use schema::ConfigFile;
