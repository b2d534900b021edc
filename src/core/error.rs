use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while assembling or sealing a comprobante.
///
/// All variants are raised synchronously at the point of detection and abort
/// the build of that document; the core performs no I/O and has no transient
/// failure class. A build either yields a fully assembled comprobante or one
/// of these errors — partial documents are never returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CfdiError {
    /// A compact tax specification string could not be parsed.
    #[error("malformed tax spec '{0}': expected kind|factor[|rate]")]
    MalformedTaxSpec(String),

    /// A tax-inclusive unit price cannot be back-solved because a tax record
    /// already carries an explicit base or amount.
    #[error("ambiguous tax base: tax record already carries a base or amount")]
    AmbiguousTaxBase,

    /// Payment documents must reference source documents in a single currency.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// Source documents batched under one payment disagree on issuer or
    /// receiver identity.
    #[error("issuer/receiver mismatch: {0}")]
    IssuerReceiverMismatch(String),

    /// The currency code is absent from the rounding precision table.
    #[error("unknown currency code '{0}'")]
    UnknownCurrency(String),

    /// A computed or supplied quantity/amount is negative.
    #[error("negative amount in {field}: {value}")]
    NegativeAmount { field: String, value: Decimal },

    /// Builder encountered invalid or missing input.
    #[error("builder error: {0}")]
    Builder(String),

    /// The external signer failed; propagated unchanged to the caller.
    #[error("signer error: {0}")]
    Signer(String),
}

impl CfdiError {
    pub(crate) fn negative(field: impl Into<String>, value: Decimal) -> Self {
        Self::NegativeAmount {
            field: field.into(),
            value,
        }
    }
}
