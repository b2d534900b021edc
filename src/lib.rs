//! # cfdimx
//!
//! Mexican CFDI 4.0 invoicing library: document assembly, exact tax
//! computation, and canonical rendering (cadena original) for sealing.
//!
//! All monetary values use [`rust_decimal::Decimal`] — never floating point.
//! Field order follows the SAT Anexo 20 specification, so the canonical
//! string this crate renders is the byte sequence a CSD seal is computed
//! over.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use cfdimx::core::*;
//! use rust_decimal_macros::dec;
//!
//! let comprobante = ComprobanteBuilder::new(
//!     Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601"),
//!     "85000",
//!     NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(9, 30, 0).unwrap(),
//! )
//! .receiver(Receiver::new("URE180429TM6", "UNIVERSIDAD ROBOTICA", "86991", "601", "G03"))
//! .payment_form("01")
//! .payment_method("PUE")
//! .add_concept(
//!     ConceptBuilder::new("84111506", "Servicios de facturación", dec!(10), "E48", dec!(150.00))
//!         .transfer("IVA|Tasa|0.16")
//!         .build()
//!         .unwrap(),
//! )
//! .build()
//! .unwrap();
//!
//! assert_eq!(comprobante.total, dec!(1740.00));
//! assert!(comprobante.cadena_original().starts_with("||4.0|"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Document tree, tax engine, builders, cadena original |
//! | `catalogs` | Human-readable descriptions for common SAT catalog codes |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "catalogs")]
pub mod catalogs;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
