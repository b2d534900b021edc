//! Core CFDI 4.0 types, tax computation, and canonical rendering.
//!
//! This module provides the foundational types for issuing Mexican fiscal
//! documents (comprobantes): the ordered document tree, the tax engine, the
//! document builders, and the cadena-original serializer.

mod builder;
pub mod cadena;
mod currencies;
mod error;
mod node;
mod schema;
mod signer;
mod tax;
mod types;

pub use builder::*;
pub use cadena::cadena_original;
pub use currencies::{decimals_for, Rounder};
pub use error::*;
pub use node::{DocumentNode, Value};
pub use signer::Signer;
pub use types::*;
