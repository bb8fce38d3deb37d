//! Import allowlist for submission code.
//!
//! Python's `os.path` is a submodule of `os`, and `import os.path` binds the
//! whole `os` module; `os` is therefore granted whenever `os.path` is allowed,
//! which is why the default list leaves both out. Submodules of an allowed
//! package (`json.decoder` under `json`) are allowed as well.

use std::collections::HashSet;

use crate::types::ExecutionSettings;

/// The allowlist as a set for O(1) lookups inside the import hook.
pub fn build_allowed_set(settings: &ExecutionSettings) -> HashSet<String> {
    settings.allowed_modules.iter().cloned().collect()
}

/// Whether the import hook lets submission code import `module_name`.
pub fn is_module_allowed(module_name: &str, allowed_set: &HashSet<String>) -> bool {
    if allowed_set.contains(module_name) {
        return true;
    }
    if module_name == "os" && allowed_set.contains("os.path") {
        return true;
    }
    match module_name.split_once('.') {
        Some((parent, _)) => allowed_set.contains(parent),
        None => false,
    }
}
