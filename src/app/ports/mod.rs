// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod remote_session;
pub mod transport;

pub use remote_session::{RemoteSessionPort, SessionFactory};
pub use transport::{Connection, Connector, FileChannel};
