//! External signing boundary.

use super::error::CfdiError;

/// Seal provider for comprobantes (CSD certificate holder).
///
/// The core calls [`sign`](Signer::sign) exactly once per document, on the
/// cadena original of the fully assembled unsigned tree, and stores the
/// result verbatim as the `Sello` field. Key handling, hashing, and signature
/// encoding live entirely behind this trait; retries, if any, belong to the
/// caller.
pub trait Signer {
    /// Certificate serial number (`NoCertificado`), part of the signed
    /// pre-image.
    fn certificate_number(&self) -> &str;

    /// Certificate body, base64-encoded (`Certificado`). Not part of the
    /// pre-image.
    fn certificate_base64(&self) -> String;

    /// Sign the canonical byte sequence, returning the encoded seal.
    ///
    /// Failures should be mapped to [`CfdiError::Signer`]; the core
    /// propagates them unchanged.
    fn sign(&self, data: &[u8]) -> Result<String, CfdiError>;
}
