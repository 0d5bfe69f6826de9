//! # pqid-core
//!
//! Post-quantum identity orchestration over a native ML-DSA-65 engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    IdentityEngine                            │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ SubjectInfo  │  │   KeyPair    │  │  Csr / Cert  │      │
//! │  │ (validated)  │  │ (sized keys) │  │  Signature   │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              ForeignArena                         │      │
//! │  │   (scoped heap buffers, freed on every path)     │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              LifecycleGuard                       │      │
//! │  │     (load once, serialize engine access)         │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │        NativeEngine (pqid-native)                 │      │
//! │  │    (linear heap, ML-DSA-65, CSR/cert records)    │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **No leaks**: every engine allocation made by an operation is freed
//!   before the operation returns, on success and failure alike
//! - **Validate first**: malformed arguments never reach the engine
//! - **Exact outputs**: results are copied out at the length the engine
//!   reports, never at buffer capacity
//! - **Verification is boolean**: a bad signature is `Ok(false)`, not an error

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod arena;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod types;

pub use arena::{ForeignArena, ForeignBuffer, StringArray};
pub use codec::{
    bytes_to_hex, fingerprint, from_pem, from_pem_labeled, from_pem_lenient, hex_to_bytes, to_pem,
};
pub use config::{PkiConfig, DEFAULT_OUTPUT_CAPACITY, DEFAULT_VALIDITY_DAYS, MAX_OUTPUT_CAPACITY};
pub use engine::IdentityEngine;
pub use error::PkiError;
pub use lifecycle::{EngineLoader, LifecycleGuard, LifecycleState, SoftwareEngineLoader};
pub use types::{Certificate, Csr, KeyPair, Signature, SubjectInfo};

pub use pqid_crypto::{
    ML_DSA_65_PRIVATE_KEY_SIZE, ML_DSA_65_PUBLIC_KEY_SIZE, ML_DSA_65_SIGNATURE_SIZE,
};
pub use pqid_native::{
    EngineConfig, EngineError, HeapStats, NativeEngine, NativeHeap, Ptr, SoftwareEngine,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target triple this library was built for.
pub const BUILD_TARGET: &str = env!("PQID_BUILD_TARGET");
