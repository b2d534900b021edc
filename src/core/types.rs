use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::node::DocumentNode;

/// CFDI version this crate produces.
pub const CFDI_VERSION: &str = "4.0";

/// Pagos complement version.
pub const PAGOS_VERSION: &str = "2.0";

/// c_Impuesto — federal tax identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaxKind {
    /// 001 — Impuesto Sobre la Renta (income tax, typically withheld).
    Isr,
    /// 002 — Impuesto al Valor Agregado (value-added tax).
    Iva,
    /// 003 — Impuesto Especial sobre Producción y Servicios.
    Ieps,
}

impl TaxKind {
    /// SAT catalog code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Isr => "001",
            Self::Iva => "002",
            Self::Ieps => "003",
        }
    }

    /// Short name as used in compact tax specs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Isr => "ISR",
            Self::Iva => "IVA",
            Self::Ieps => "IEPS",
        }
    }

    /// Parse from the SAT code or the short name.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "001" | "ISR" => Some(Self::Isr),
            "002" | "IVA" => Some(Self::Iva),
            "003" | "IEPS" => Some(Self::Ieps),
            _ => None,
        }
    }
}

/// c_TipoFactor — how a tax applies to its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactorType {
    /// Tasa — percentage rate over the base.
    Rate,
    /// Cuota — fixed fee, independent of base and quantity.
    Fee,
    /// Exento — exempt; carries a base but never a rate or amount.
    Exempt,
}

impl FactorType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rate => "Tasa",
            Self::Fee => "Cuota",
            Self::Exempt => "Exento",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Tasa" => Some(Self::Rate),
            "Cuota" => Some(Self::Fee),
            "Exento" => Some(Self::Exempt),
            _ => None,
        }
    }
}

/// c_ObjetoImp — whether a concept is subject to tax.
///
/// Not merely descriptive: the per-concept classification feeds the
/// document-level tax node and is matched exhaustively wherever consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxStatus {
    /// 01 — not subject to tax.
    NotSubject,
    /// 02 — subject to tax, with per-concept breakdown.
    Subject,
    /// 03 — subject to tax, breakdown not required.
    SubjectNoBreakdown,
}

impl TaxStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotSubject => "01",
            Self::Subject => "02",
            Self::SubjectNoBreakdown => "03",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::NotSubject),
            "02" => Some(Self::Subject),
            "03" => Some(Self::SubjectNoBreakdown),
            _ => None,
        }
    }
}

/// c_TipoDeComprobante — fiscal effect of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    /// I — income (ordinary invoice).
    Income,
    /// E — expense (credit note).
    Expense,
    /// T — transfer.
    Transfer,
    /// P — payment (Pagos complement).
    Payment,
}

impl DocumentKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Income => "I",
            Self::Expense => "E",
            Self::Transfer => "T",
            Self::Payment => "P",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Income),
            "E" => Some(Self::Expense),
            "T" => Some(Self::Transfer),
            "P" => Some(Self::Payment),
            _ => None,
        }
    }
}

/// A single tax line on a concept.
///
/// Built either structurally or from the compact form `"IVA|Tasa|0.16"` via
/// [`TaxRecord::parse`]. `base` and `amount` are filled in by
/// [`TaxRecord::compute`] during document assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRecord {
    pub kind: TaxKind,
    pub factor: FactorType,
    /// TasaOCuota — percentage for `Rate`, fixed fee for `Fee`, absent for
    /// `Exempt`.
    pub rate: Option<Decimal>,
    /// Base — taxable base, never negative.
    pub base: Option<Decimal>,
    /// Importe — computed tax amount, never negative; absent for `Exempt`.
    pub amount: Option<Decimal>,
}

impl TaxRecord {
    /// Percentage-rate tax (TipoFactor Tasa).
    pub fn rate(kind: TaxKind, rate: Decimal) -> Self {
        Self {
            kind,
            factor: FactorType::Rate,
            rate: Some(rate),
            base: None,
            amount: None,
        }
    }

    /// Fixed-fee tax (TipoFactor Cuota).
    pub fn fee(kind: TaxKind, fee: Decimal) -> Self {
        Self {
            kind,
            factor: FactorType::Fee,
            rate: Some(fee),
            base: None,
            amount: None,
        }
    }

    /// Exempt tax line (TipoFactor Exento).
    pub fn exempt(kind: TaxKind) -> Self {
        Self {
            kind,
            factor: FactorType::Exempt,
            rate: None,
            base: None,
            amount: None,
        }
    }
}

/// Emisor — issuing taxpayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Rfc — federal taxpayer registry key.
    pub rfc: String,
    /// Nombre — registered legal name.
    pub legal_name: String,
    /// RegimenFiscal — tax regime code (c_RegimenFiscal).
    pub tax_regime: String,
}

impl Issuer {
    pub fn new(
        rfc: impl Into<String>,
        legal_name: impl Into<String>,
        tax_regime: impl Into<String>,
    ) -> Self {
        Self {
            rfc: rfc.into(),
            legal_name: legal_name.into(),
            tax_regime: tax_regime.into(),
        }
    }
}

/// Receptor — receiving taxpayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    /// Rfc.
    pub rfc: String,
    /// Nombre.
    pub name: String,
    /// DomicilioFiscalReceptor — postal code of the fiscal address.
    pub postal_code: String,
    /// RegimenFiscalReceptor — tax regime code.
    pub tax_regime: String,
    /// UsoCFDI — intended use code (c_UsoCFDI).
    pub cfdi_use: String,
    /// ResidenciaFiscal — ISO 3166-1 alpha-3 country, foreign receivers only.
    pub foreign_country: Option<String>,
    /// NumRegIdTrib — foreign tax registration id.
    pub foreign_tax_id: Option<String>,
}

impl Receiver {
    pub fn new(
        rfc: impl Into<String>,
        name: impl Into<String>,
        postal_code: impl Into<String>,
        tax_regime: impl Into<String>,
        cfdi_use: impl Into<String>,
    ) -> Self {
        Self {
            rfc: rfc.into(),
            name: name.into(),
            postal_code: postal_code.into(),
            tax_regime: tax_regime.into(),
            cfdi_use: cfdi_use.into(),
            foreign_country: None,
            foreign_tax_id: None,
        }
    }
}

/// Concepto — one line item of goods or services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// ClaveProdServ — SAT product/service catalog code.
    pub product_code: String,
    /// Cantidad.
    pub quantity: Decimal,
    /// ClaveUnidad — standardized unit code (c_ClaveUnidad).
    pub unit_code: String,
    /// Unidad — issuer's own unit name.
    pub unit_name: Option<String>,
    /// Descripcion.
    pub description: String,
    /// ValorUnitario — net unit price. When `tax_inclusive` is set, the
    /// builder back-solves this from the inclusive price before computing
    /// the amount.
    pub unit_price: Decimal,
    /// NoIdentificacion — SKU or part number.
    pub identification: Option<String>,
    /// Descuento — absolute discount on this concept, never negative.
    pub discount: Option<Decimal>,
    /// ObjetoImp. `None` lets the builder derive it from the tax records.
    pub tax_status: Option<TaxStatus>,
    /// Traslados — taxes charged to the receiver.
    pub transferred: Vec<TaxRecord>,
    /// Retenciones — taxes withheld by the issuer.
    pub withheld: Vec<TaxRecord>,
    /// `unit_price` includes the applicable rate/fee taxes.
    pub tax_inclusive: bool,
    /// Importe — `round(quantity × unit_price)`, set during assembly.
    pub amount: Option<Decimal>,
}

/// CfdiRelacionados — references to prior comprobantes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedDocuments {
    /// TipoRelacion — relation code (c_TipoRelacion).
    pub relation_code: String,
    /// Fiscal UUIDs of the related comprobantes.
    pub uuids: Vec<String>,
}

/// InformacionGlobal — period data for global (public-at-large) invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalInformation {
    /// Periodicidad (c_Periodicidad).
    pub periodicity: String,
    /// Meses (c_Meses).
    pub months: String,
    /// Año.
    pub year: i32,
}

/// One aggregated tax group at document level.
///
/// Groups are keyed by `(kind, factor, rate)` with exact decimal rate
/// equality; exempt groups are keyed by kind alone and never carry an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxGroup {
    pub kind: TaxKind,
    pub factor: FactorType,
    pub rate: Option<Decimal>,
    pub base: Decimal,
    pub amount: Option<Decimal>,
}

/// Impuestos — document-level tax aggregation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Traslados, grouped and summed across all concepts.
    pub transferred: Vec<TaxGroup>,
    /// Retenciones, grouped and summed across all concepts.
    pub withheld: Vec<TaxGroup>,
    /// TotalImpuestosTrasladados — absent when no group carries an amount.
    pub total_transferred: Option<Decimal>,
    /// TotalImpuestosRetenidos.
    pub total_withheld: Option<Decimal>,
}

impl DocumentTotals {
    pub fn is_empty(&self) -> bool {
        self.transferred.is_empty() && self.withheld.is_empty()
    }
}

/// Comprobante — the fully assembled fiscal document.
///
/// Built in one pass by [`ComprobanteBuilder`](super::ComprobanteBuilder);
/// never mutated after sealing.
#[derive(Debug, Clone)]
pub struct Comprobante {
    /// Version — always "4.0".
    pub version: &'static str,
    pub kind: DocumentKind,
    pub serie: Option<String>,
    pub folio: Option<String>,
    /// Fecha — local issuing timestamp, zone-less.
    pub date: NaiveDateTime,
    /// FormaPago (c_FormaPago).
    pub payment_form: Option<String>,
    /// MetodoPago (PUE/PPD).
    pub payment_method: Option<String>,
    /// CondicionesDePago.
    pub payment_conditions: Option<String>,
    /// Moneda — ISO 4217.
    pub currency: String,
    /// TipoCambio — pesos per unit of `currency`.
    pub exchange_rate: Option<Decimal>,
    /// Exportacion (c_Exportacion).
    pub export_code: String,
    /// LugarExpedicion — postal code of issuance.
    pub place_of_issue: String,
    /// Confirmacion — PAC confirmation key for out-of-range values.
    pub confirmation: Option<String>,
    /// SubTotal — Σ concept amounts, never re-rounded.
    pub subtotal: Decimal,
    /// Descuento — Σ concept discounts, absent when zero.
    pub discount: Option<Decimal>,
    /// Total = subtotal − discount + transferred − withheld.
    pub total: Decimal,
    pub issuer: Issuer,
    pub receiver: Receiver,
    pub concepts: Vec<Concept>,
    pub totals: DocumentTotals,
    pub global_information: Option<GlobalInformation>,
    pub related: Vec<RelatedDocuments>,
    /// NoCertificado — empty string on unsigned drafts.
    pub certificate_number: String,
    /// The assembled document tree (wire/storage shape).
    pub tree: DocumentNode,
    /// The canonical signing pre-image derived from the unsigned tree.
    pub cadena: String,
    /// Sello — empty string on unsigned drafts, never absent.
    pub seal: String,
}

impl Comprobante {
    /// The canonical byte sequence the seal was (or would be) computed over.
    pub fn cadena_original(&self) -> &str {
        &self.cadena
    }

    pub fn is_signed(&self) -> bool {
        !self.seal.is_empty()
    }
}

/// A comprobante that has been stamped by the tax authority, pairing the
/// document with its fiscal UUID. Payment documents reference sources in
/// this form because the UUID is assigned outside this core.
#[derive(Debug, Clone, Copy)]
pub struct StampedDocument<'a> {
    pub uuid: &'a str,
    pub document: &'a Comprobante,
}
