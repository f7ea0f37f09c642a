// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

mod args;
mod run;

pub use args::{Cli, Cmd};
pub use run::run;
