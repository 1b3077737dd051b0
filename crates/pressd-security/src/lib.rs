// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Security primitives: the append-only audit trail, TLS server identity
// (ECDSA P-256 key generation), and SHA-256 integrity/CSRF hashing.

pub mod audit;
pub mod certificates;
pub mod integrity;

pub use audit::{AuditEntry, AuditLog};
pub use certificates::SelfSignedCert;
pub use integrity::{derive_csrf_token, hash_bytes, verify_hash};
