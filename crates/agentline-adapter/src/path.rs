// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

/// Return `true` when `name` can be found as an executable on `PATH`.
/// Manual split-and-join rather than an external crate, matching the
/// teacher's own `which_available` helper.
pub fn binary_on_path(name: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            if PathBuf::from(dir).join(name).exists() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_binary_known_to_exist_in_test_environment() {
        assert!(binary_on_path("sh"));
    }

    #[test]
    fn returns_false_for_nonexistent_binary() {
        assert!(!binary_on_path("agentline_definitely_not_a_real_binary_xyz"));
    }
}
