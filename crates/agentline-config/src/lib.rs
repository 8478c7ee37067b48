// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod env;
mod loader;
mod schema;

pub use env::GlobalConfig;
pub use loader::{load_bots, ConfigError};
pub use schema::*;
