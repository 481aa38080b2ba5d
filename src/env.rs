//! Environment constants and path utilities for subtask.
//!
//! This module centralizes the file names, directory names and environment
//! variables the crate looks at, so configuration discovery and logging agree
//! on them.

use std::path::{Path, PathBuf};

/// Hidden configuration directory name (like .git, .vscode)
pub const SUBTASK_DIR_NAME: &str = ".subtask";

/// Configuration file name inside the hidden directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name in a project root
pub const LOCAL_CONFIG_FILE_NAME: &str = "subtask.toml";

/// Environment variable overriding the configured log filter
pub const LOG_ENV_VAR: &str = "SUBTASK_LOG";

/// Log filter used when neither the config nor the environment set one
pub const DEFAULT_LOG_FILTER: &str = "subtask=info";

/// Build the hidden .subtask directory path from a root directory
pub fn subtask_dir_path(root: &Path) -> PathBuf {
    root.join(SUBTASK_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    subtask_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build the hidden config file path in the current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    subtask_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build the stand-alone config file path in the current directory
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}
