// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP/1.1 wire codec, operation dispatch, subscription/event translation,
// and the HTTP listener that ties them together. Has no printer registry,
// job queue, or device layer of its own — those live in pressd-system,
// which implements `backend::IppBackend` and hands this crate to
// `server::IppServer` to run.

pub mod backend;
pub mod dispatch;
pub mod http;
pub mod server;
pub mod subscriptions;
pub mod wire;

pub use backend::{IppBackend, PrinterAttributesPatch, SystemAttributes, SystemAttributesPatch};
pub use dispatch::dispatch;
pub use server::{IppServer, ServerOptions, ServerStatus};
pub use subscriptions::SubscriptionRequest;
