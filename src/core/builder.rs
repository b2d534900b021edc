//! Comprobante assembly.
//!
//! All derived values (unit prices, amounts, bases, tax groups, totals) are
//! computed here in one pass; the resulting [`Comprobante`] is immutable.
//! Rounding is half-up to the document currency's precision at every
//! intermediate step that the canonical string renders.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use super::cadena;
use super::currencies::Rounder;
use super::error::CfdiError;
use super::node::{DocumentNode, Value};
use super::schema;
use super::signer::Signer;
use super::types::*;

/// Builder for constructing comprobantes.
///
/// ```
/// use cfdimx::core::*;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let issuer = Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601");
/// let receiver = Receiver::new("URE180429TM6", "UNIVERSIDAD ROBOTICA", "86991", "601", "G03");
/// let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(9, 30, 0).unwrap();
///
/// let comprobante = ComprobanteBuilder::new(issuer, "85000", date)
///     .receiver(receiver)
///     .payment_form("01")
///     .payment_method("PUE")
///     .add_concept(
///         ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
///             .transfer("IVA|Tasa|0.16")
///             .build()?,
///     )
///     .build()?;
///
/// assert_eq!(comprobante.total, dec!(116.00));
/// # Ok::<(), CfdiError>(())
/// ```
pub struct ComprobanteBuilder<'a> {
    issuer: Issuer,
    place_of_issue: String,
    date: NaiveDateTime,
    kind: DocumentKind,
    currency: String,
    export_code: String,
    receiver: Option<Receiver>,
    serie: Option<String>,
    folio: Option<String>,
    payment_form: Option<String>,
    payment_method: Option<String>,
    payment_conditions: Option<String>,
    exchange_rate: Option<Decimal>,
    confirmation: Option<String>,
    global_information: Option<GlobalInformation>,
    related: Vec<RelatedDocuments>,
    concepts: Vec<Concept>,
    complement: Option<DocumentNode>,
    signer: Option<&'a dyn Signer>,
}

impl<'a> ComprobanteBuilder<'a> {
    pub fn new(issuer: Issuer, place_of_issue: impl Into<String>, date: NaiveDateTime) -> Self {
        Self {
            issuer,
            place_of_issue: place_of_issue.into(),
            date,
            kind: DocumentKind::Income,
            currency: "MXN".to_string(),
            export_code: "01".to_string(),
            receiver: None,
            serie: None,
            folio: None,
            payment_form: None,
            payment_method: None,
            payment_conditions: None,
            exchange_rate: None,
            confirmation: None,
            global_information: None,
            related: Vec::new(),
            concepts: Vec::new(),
            complement: None,
            signer: None,
        }
    }

    pub fn kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn receiver(mut self, receiver: Receiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }

    /// Pesos per unit of the document currency. Required for any currency
    /// other than MXN and XXX.
    pub fn exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn export_code(mut self, code: impl Into<String>) -> Self {
        self.export_code = code.into();
        self
    }

    pub fn serie(mut self, serie: impl Into<String>) -> Self {
        self.serie = Some(serie.into());
        self
    }

    pub fn folio(mut self, folio: impl Into<String>) -> Self {
        self.folio = Some(folio.into());
        self
    }

    pub fn payment_form(mut self, code: impl Into<String>) -> Self {
        self.payment_form = Some(code.into());
        self
    }

    pub fn payment_method(mut self, code: impl Into<String>) -> Self {
        self.payment_method = Some(code.into());
        self
    }

    pub fn payment_conditions(mut self, conditions: impl Into<String>) -> Self {
        self.payment_conditions = Some(conditions.into());
        self
    }

    pub fn confirmation(mut self, key: impl Into<String>) -> Self {
        self.confirmation = Some(key.into());
        self
    }

    pub fn global_information(mut self, info: GlobalInformation) -> Self {
        self.global_information = Some(info);
        self
    }

    pub fn add_related(mut self, related: RelatedDocuments) -> Self {
        self.related.push(related);
        self
    }

    pub fn add_concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Attach an already-assembled complement node (e.g. Pagos).
    pub fn complement(mut self, node: DocumentNode) -> Self {
        self.complement = Some(node);
        self
    }

    pub fn signer(mut self, signer: &'a dyn Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Assemble, canonicalize, and (when a signer is attached) seal the
    /// document.
    pub fn build(self) -> Result<Comprobante, CfdiError> {
        let receiver = self
            .receiver
            .ok_or_else(|| CfdiError::Builder("receiver is required".into()))?;
        if self.concepts.is_empty() {
            return Err(CfdiError::Builder(
                "at least one concept is required".into(),
            ));
        }

        let rounder = Rounder::for_currency(&self.currency)?;
        if self.exchange_rate.is_none() && self.currency != "MXN" && self.currency != "XXX" {
            return Err(CfdiError::Builder(format!(
                "exchange rate is required for currency {}",
                self.currency
            )));
        }
        if let Some(rate) = self.exchange_rate {
            if rate <= Decimal::ZERO {
                return Err(CfdiError::negative("TipoCambio", rate));
            }
        }

        let concepts = self
            .concepts
            .into_iter()
            .map(|c| normalize_concept(c, rounder))
            .collect::<Result<Vec<_>, _>>()?;

        let subtotal: Decimal = concepts.iter().filter_map(|c| c.amount).sum();
        let discount_sum: Decimal = concepts.iter().filter_map(|c| c.discount).sum();
        let discount = (!discount_sum.is_zero()).then_some(discount_sum);

        let totals = DocumentTotals::aggregate(&concepts);
        let mut total = subtotal - discount_sum;
        total += totals.total_transferred.unwrap_or_default();
        total -= totals.total_withheld.unwrap_or_default();
        if total.is_sign_negative() {
            return Err(CfdiError::negative("Total", total));
        }

        let certificate_number = self
            .signer
            .map(|s| s.certificate_number().to_string())
            .unwrap_or_default();

        let mut root = schema::new_node(schema::COMPROBANTE);
        root.set("Version", CFDI_VERSION);
        root.set_opt("Serie", self.serie.clone());
        root.set_opt("Folio", self.folio.clone());
        root.set("Fecha", self.date);
        root.set_opt("FormaPago", self.payment_form.clone());
        root.set("NoCertificado", certificate_number.as_str());
        root.set_opt("CondicionesDePago", self.payment_conditions.clone());
        root.set("SubTotal", subtotal);
        root.set_opt("Descuento", discount);
        root.set("Moneda", self.currency.as_str());
        root.set_opt("TipoCambio", self.exchange_rate);
        root.set("Total", total);
        root.set("TipoDeComprobante", self.kind.code());
        root.set("Exportacion", self.export_code.as_str());
        root.set_opt("MetodoPago", self.payment_method.clone());
        root.set("LugarExpedicion", self.place_of_issue.as_str());
        root.set_opt("Confirmacion", self.confirmation.clone());
        root.set_opt(
            "InformacionGlobal",
            self.global_information.as_ref().map(global_node),
        );
        if !self.related.is_empty() {
            root.set(
                "CfdiRelacionados",
                self.related
                    .iter()
                    .map(|r| Value::Node(related_node(r)))
                    .collect::<Vec<_>>(),
            );
        }
        root.set("Emisor", issuer_node(&self.issuer));
        root.set("Receptor", receiver_node(&receiver));
        root.set(
            "Conceptos",
            concepts
                .iter()
                .map(|c| Value::Node(concept_node(c)))
                .collect::<Vec<_>>(),
        );
        if !totals.is_empty() {
            root.set("Impuestos", totals_node(&totals));
        }
        root.set_opt("Complemento", self.complement.map(|pagos| {
            let mut node = schema::new_node(schema::COMPLEMENTO);
            node.set("Pagos", pagos);
            node
        }));

        // The pre-image is derived while Sello and Certificado are still
        // absent; they are filled in afterwards and never enter it.
        let cadena = cadena::cadena_original(&root);
        let (seal, certificate) = match self.signer {
            Some(signer) => (signer.sign(cadena.as_bytes())?, signer.certificate_base64()),
            None => (String::new(), String::new()),
        };
        root.set("Sello", seal.as_str());
        root.set("Certificado", certificate);

        Ok(Comprobante {
            version: CFDI_VERSION,
            kind: self.kind,
            serie: self.serie,
            folio: self.folio,
            date: self.date,
            payment_form: self.payment_form,
            payment_method: self.payment_method,
            payment_conditions: self.payment_conditions,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            export_code: self.export_code,
            place_of_issue: self.place_of_issue,
            confirmation: self.confirmation,
            subtotal,
            discount,
            total,
            issuer: self.issuer,
            receiver,
            concepts,
            totals,
            global_information: self.global_information,
            related: self.related,
            certificate_number,
            tree: root,
            cadena,
            seal,
        })
    }
}

/// Fill in the derived fields of one concept.
///
/// When `tax_inclusive` is set, the net unit price is back-solved from the
/// inclusive price over the transferred rate/fee records before anything is
/// rounded; the stated amount then comes from the unrounded net price.
fn normalize_concept(mut concept: Concept, rounder: Rounder) -> Result<Concept, CfdiError> {
    if concept.quantity.is_sign_negative() {
        return Err(CfdiError::negative("Cantidad", concept.quantity));
    }
    if concept.unit_price.is_sign_negative() {
        return Err(CfdiError::negative("ValorUnitario", concept.unit_price));
    }
    if let Some(d) = concept.discount {
        if d.is_sign_negative() {
            return Err(CfdiError::negative("Descuento", d));
        }
    }

    let mut unit_price = concept.unit_price;
    if concept.tax_inclusive {
        let mut rate_sum = Decimal::ZERO;
        let mut fee_sum = Decimal::ZERO;
        for record in &concept.transferred {
            match record.factor {
                FactorType::Exempt => {}
                FactorType::Rate | FactorType::Fee => {
                    if record.base.is_some() || record.amount.is_some() {
                        return Err(CfdiError::AmbiguousTaxBase);
                    }
                    match record.factor {
                        FactorType::Rate => rate_sum += record.require_rate()?,
                        _ => fee_sum += record.require_rate()?,
                    }
                }
            }
        }
        unit_price = (unit_price - fee_sum) / (rate_sum + Decimal::ONE);
        if unit_price.is_sign_negative() {
            return Err(CfdiError::negative("ValorUnitario", unit_price));
        }
        concept.unit_price = rounder.round(unit_price);
    }

    let amount = rounder.round(concept.quantity * unit_price);
    concept.amount = Some(amount);

    match concept.tax_status {
        // Explicitly out of scope for taxes: drop any records.
        Some(TaxStatus::NotSubject) | Some(TaxStatus::SubjectNoBreakdown) => {
            concept.transferred.clear();
            concept.withheld.clear();
        }
        _ => {
            let base = amount - concept.discount.unwrap_or_default();
            if base.is_sign_negative() {
                return Err(CfdiError::negative("Base", base));
            }
            concept.transferred = concept
                .transferred
                .iter()
                .map(|r| r.compute(base, rounder))
                .collect::<Result<Vec<_>, _>>()?;
            concept.withheld = concept
                .withheld
                .iter()
                .map(|r| r.compute(base, rounder))
                .collect::<Result<Vec<_>, _>>()?;
            let has_taxes = !concept.transferred.is_empty() || !concept.withheld.is_empty();
            concept.tax_status = Some(if has_taxes {
                TaxStatus::Subject
            } else {
                TaxStatus::NotSubject
            });
        }
    }
    Ok(concept)
}

/// TasaOCuota is rendered with exactly six decimals (`0.160000`).
fn canonical_rate(rate: Decimal) -> Decimal {
    let mut r = rate;
    r.rescale(6);
    r
}

fn issuer_node(issuer: &Issuer) -> DocumentNode {
    let mut node = schema::new_node(schema::EMISOR);
    node.set("Rfc", issuer.rfc.as_str());
    node.set("Nombre", issuer.legal_name.as_str());
    node.set("RegimenFiscal", issuer.tax_regime.as_str());
    node
}

fn receiver_node(receiver: &Receiver) -> DocumentNode {
    let mut node = schema::new_node(schema::RECEPTOR);
    node.set("Rfc", receiver.rfc.as_str());
    node.set("Nombre", receiver.name.as_str());
    node.set("DomicilioFiscalReceptor", receiver.postal_code.as_str());
    node.set_opt("ResidenciaFiscal", receiver.foreign_country.as_deref());
    node.set_opt("NumRegIdTrib", receiver.foreign_tax_id.as_deref());
    node.set("RegimenFiscalReceptor", receiver.tax_regime.as_str());
    node.set("UsoCFDI", receiver.cfdi_use.as_str());
    node
}

fn global_node(info: &GlobalInformation) -> DocumentNode {
    let mut node = schema::new_node(schema::INFORMACION_GLOBAL);
    node.set("Periodicidad", info.periodicity.as_str());
    node.set("Meses", info.months.as_str());
    node.set("Año", i64::from(info.year));
    node
}

fn related_node(related: &RelatedDocuments) -> DocumentNode {
    let mut node = schema::new_node(schema::CFDI_RELACIONADOS);
    node.set("TipoRelacion", related.relation_code.as_str());
    node.set(
        "CfdiRelacionado",
        related
            .uuids
            .iter()
            .map(|u| Value::Text(u.clone()))
            .collect::<Vec<_>>(),
    );
    node
}

fn concept_node(concept: &Concept) -> DocumentNode {
    let mut node = schema::new_node(schema::CONCEPTO);
    node.set("ClaveProdServ", concept.product_code.as_str());
    node.set_opt("NoIdentificacion", concept.identification.as_deref());
    node.set("Cantidad", concept.quantity);
    node.set("ClaveUnidad", concept.unit_code.as_str());
    node.set_opt("Unidad", concept.unit_name.as_deref());
    node.set("Descripcion", concept.description.as_str());
    node.set("ValorUnitario", concept.unit_price);
    node.set_opt("Importe", concept.amount);
    node.set_opt("Descuento", concept.discount);
    node.set_opt("ObjetoImp", concept.tax_status.map(|s| s.code()));

    if !concept.transferred.is_empty() || !concept.withheld.is_empty() {
        let mut taxes = schema::new_node(schema::CONCEPTO_IMPUESTOS);
        if !concept.transferred.is_empty() {
            taxes.set(
                "Traslados",
                concept
                    .transferred
                    .iter()
                    .map(|r| Value::Node(record_node(schema::TRASLADO, r)))
                    .collect::<Vec<_>>(),
            );
        }
        if !concept.withheld.is_empty() {
            taxes.set(
                "Retenciones",
                concept
                    .withheld
                    .iter()
                    .map(|r| Value::Node(record_node(schema::RETENCION, r)))
                    .collect::<Vec<_>>(),
            );
        }
        node.set("Impuestos", taxes);
    }
    node
}

fn record_node(kind: &'static str, record: &TaxRecord) -> DocumentNode {
    let mut node = schema::new_node(kind);
    node.set_opt("Base", record.base);
    node.set("Impuesto", record.kind.code());
    node.set("TipoFactor", record.factor.code());
    node.set_opt("TasaOCuota", record.rate.map(canonical_rate));
    node.set_opt("Importe", record.amount);
    node
}

fn totals_node(totals: &DocumentTotals) -> DocumentNode {
    let mut node = schema::new_node(schema::IMPUESTOS);
    // Document-level withholdings collapse to one line per tax kind.
    let collapsed = collapse_withheld(&totals.withheld);
    if !collapsed.is_empty() {
        node.set(
            "Retenciones",
            collapsed
                .into_iter()
                .map(|(kind, amount)| {
                    let mut line = schema::new_node(schema::RETENCION_RESUMEN);
                    line.set("Impuesto", kind.code());
                    line.set("Importe", amount);
                    Value::Node(line)
                })
                .collect::<Vec<_>>(),
        );
    }
    node.set_opt("TotalImpuestosRetenidos", totals.total_withheld);
    if !totals.transferred.is_empty() {
        node.set(
            "Traslados",
            totals
                .transferred
                .iter()
                .map(|g| Value::Node(group_node(schema::TRASLADO, g)))
                .collect::<Vec<_>>(),
        );
    }
    node.set_opt("TotalImpuestosTrasladados", totals.total_transferred);
    node
}

fn collapse_withheld(groups: &[TaxGroup]) -> Vec<(TaxKind, Decimal)> {
    let mut collapsed: Vec<(TaxKind, Decimal)> = Vec::new();
    for group in groups {
        let Some(amount) = group.amount else { continue };
        match collapsed.iter_mut().find(|(k, _)| *k == group.kind) {
            Some((_, sum)) => *sum += amount,
            None => collapsed.push((group.kind, amount)),
        }
    }
    collapsed
}

fn group_node(kind: &'static str, group: &TaxGroup) -> DocumentNode {
    let mut node = schema::new_node(kind);
    node.set("Base", group.base);
    node.set("Impuesto", group.kind.code());
    node.set("TipoFactor", group.factor.code());
    node.set_opt("TasaOCuota", group.rate.map(canonical_rate));
    node.set_opt("Importe", group.amount);
    node
}

/// Builder for one concept line.
pub struct ConceptBuilder {
    product_code: String,
    description: String,
    quantity: Decimal,
    unit_code: String,
    unit_price: Decimal,
    unit_name: Option<String>,
    identification: Option<String>,
    discount: Option<Decimal>,
    tax_status: Option<TaxStatus>,
    transferred: Vec<TaxLine>,
    withheld: Vec<TaxLine>,
    tax_inclusive: bool,
}

enum TaxLine {
    Spec(String),
    Record(TaxRecord),
}

impl TaxLine {
    fn into_record(self) -> Result<TaxRecord, CfdiError> {
        match self {
            TaxLine::Spec(spec) => TaxRecord::parse(&spec),
            TaxLine::Record(record) => Ok(record),
        }
    }
}

impl ConceptBuilder {
    pub fn new(
        product_code: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_code: impl Into<String>,
        unit_price: Decimal,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            description: description.into(),
            quantity,
            unit_code: unit_code.into(),
            unit_price,
            unit_name: None,
            identification: None,
            discount: None,
            tax_status: None,
            transferred: Vec::new(),
            withheld: Vec::new(),
            tax_inclusive: false,
        }
    }

    pub fn unit_name(mut self, name: impl Into<String>) -> Self {
        self.unit_name = Some(name.into());
        self
    }

    pub fn identification(mut self, id: impl Into<String>) -> Self {
        self.identification = Some(id.into());
        self
    }

    pub fn discount(mut self, discount: Decimal) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn tax_status(mut self, status: TaxStatus) -> Self {
        self.tax_status = Some(status);
        self
    }

    /// Add a transferred tax from its compact form, e.g. `"IVA|Tasa|0.16"`.
    /// Parsed at [`build`](Self::build).
    pub fn transfer(mut self, spec: impl Into<String>) -> Self {
        self.transferred.push(TaxLine::Spec(spec.into()));
        self
    }

    pub fn transfer_record(mut self, record: TaxRecord) -> Self {
        self.transferred.push(TaxLine::Record(record));
        self
    }

    /// Add a withheld tax from its compact form, e.g. `"ISR|Tasa|0.10"`.
    pub fn withhold(mut self, spec: impl Into<String>) -> Self {
        self.withheld.push(TaxLine::Spec(spec.into()));
        self
    }

    pub fn withhold_record(mut self, record: TaxRecord) -> Self {
        self.withheld.push(TaxLine::Record(record));
        self
    }

    /// Treat `unit_price` as including the transferred rate/fee taxes.
    pub fn tax_inclusive(mut self) -> Self {
        self.tax_inclusive = true;
        self
    }

    pub fn build(self) -> Result<Concept, CfdiError> {
        Ok(Concept {
            product_code: self.product_code,
            quantity: self.quantity,
            unit_code: self.unit_code,
            unit_name: self.unit_name,
            description: self.description,
            unit_price: self.unit_price,
            identification: self.identification,
            discount: self.discount,
            tax_status: self.tax_status,
            transferred: self
                .transferred
                .into_iter()
                .map(TaxLine::into_record)
                .collect::<Result<Vec<_>, _>>()?,
            withheld: self
                .withheld
                .into_iter()
                .map(TaxLine::into_record)
                .collect::<Result<Vec<_>, _>>()?,
            tax_inclusive: self.tax_inclusive,
            amount: None,
        })
    }
}

struct PaymentEntry<'a> {
    source: StampedDocument<'a>,
    installment: u32,
    balance_before: Decimal,
    paid_now: Decimal,
}

/// Builder for payment comprobantes (Pagos 2.0 complement).
///
/// The resulting document is of type `P` with currency `XXX`, a single
/// zero-amount payment concept, and the receiver taken from the first
/// referenced source with `UsoCFDI` forced to `CP01`. Every referenced
/// source must share the payment currency and agree on issuer and receiver
/// identity.
pub struct PaymentBuilder<'a> {
    issuer: Issuer,
    place_of_issue: String,
    date: NaiveDateTime,
    payment_date: NaiveDateTime,
    payment_form: String,
    serie: Option<String>,
    folio: Option<String>,
    exchange_rate: Option<Decimal>,
    confirmation: Option<String>,
    related: Vec<RelatedDocuments>,
    entries: Vec<PaymentEntry<'a>>,
    signer: Option<&'a dyn Signer>,
}

impl<'a> PaymentBuilder<'a> {
    pub fn new(
        issuer: Issuer,
        place_of_issue: impl Into<String>,
        date: NaiveDateTime,
        payment_date: NaiveDateTime,
        payment_form: impl Into<String>,
    ) -> Self {
        Self {
            issuer,
            place_of_issue: place_of_issue.into(),
            date,
            payment_date,
            payment_form: payment_form.into(),
            serie: None,
            folio: None,
            exchange_rate: None,
            confirmation: None,
            related: Vec::new(),
            entries: Vec::new(),
            signer: None,
        }
    }

    pub fn serie(mut self, serie: impl Into<String>) -> Self {
        self.serie = Some(serie.into());
        self
    }

    pub fn folio(mut self, folio: impl Into<String>) -> Self {
        self.folio = Some(folio.into());
        self
    }

    /// Pesos per unit of the payment currency (`TipoCambioP`). Defaults to 1
    /// when the sources are in MXN; required otherwise.
    pub fn exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn confirmation(mut self, key: impl Into<String>) -> Self {
        self.confirmation = Some(key.into());
        self
    }

    pub fn add_related(mut self, related: RelatedDocuments) -> Self {
        self.related.push(related);
        self
    }

    pub fn signer(mut self, signer: &'a dyn Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Record a partial payment against a stamped source document.
    pub fn pay_installment(
        mut self,
        source: StampedDocument<'a>,
        installment: u32,
        balance_before: Decimal,
        paid_now: Decimal,
    ) -> Self {
        self.entries.push(PaymentEntry {
            source,
            installment,
            balance_before,
            paid_now,
        });
        self
    }

    /// Pay a stamped source document in full, as installment 1.
    pub fn settle(self, source: StampedDocument<'a>) -> Self {
        let total = source.document.total;
        self.pay_installment(source, 1, total, total)
    }

    pub fn build(self) -> Result<Comprobante, CfdiError> {
        let first = self
            .entries
            .first()
            .ok_or_else(|| CfdiError::Builder("at least one paid document is required".into()))?;

        let currency = first.source.document.currency.clone();
        let mut receiver = first.source.document.receiver.clone();
        receiver.cfdi_use = "CP01".to_string();

        for entry in &self.entries {
            let doc = entry.source.document;
            if doc.currency != currency {
                return Err(CfdiError::CurrencyMismatch {
                    expected: currency.clone(),
                    found: doc.currency.clone(),
                });
            }
            if doc.issuer.rfc != self.issuer.rfc || doc.issuer.tax_regime != self.issuer.tax_regime
            {
                return Err(CfdiError::IssuerReceiverMismatch(format!(
                    "document {} was issued by {} ({}), payment issuer is {} ({})",
                    entry.source.uuid,
                    doc.issuer.rfc,
                    doc.issuer.tax_regime,
                    self.issuer.rfc,
                    self.issuer.tax_regime
                )));
            }
            if doc.receiver.rfc != receiver.rfc || doc.receiver.tax_regime != receiver.tax_regime {
                return Err(CfdiError::IssuerReceiverMismatch(format!(
                    "document {} is addressed to {} ({}), payment receiver is {} ({})",
                    entry.source.uuid,
                    doc.receiver.rfc,
                    doc.receiver.tax_regime,
                    receiver.rfc,
                    receiver.tax_regime
                )));
            }
        }

        // TipoCambioP defaults to 1 for MXN (CRP204); any other currency
        // needs an explicit rate.
        let exchange_rate = match self.exchange_rate {
            Some(rate) => rate,
            None if currency == "MXN" => Decimal::ONE,
            None => {
                return Err(CfdiError::Builder(format!(
                    "exchange rate is required for payment currency {currency}"
                )))
            }
        };

        let rounder = Rounder::for_currency(&currency)?;
        let mut documents: Vec<Value> = Vec::new();
        let mut prorated: Vec<DocumentTotals> = Vec::new();
        let mut paid_sum = Decimal::ZERO;

        for entry in &self.entries {
            let doc = entry.source.document;
            if entry.paid_now.is_sign_negative() {
                return Err(CfdiError::negative("ImpPagado", entry.paid_now));
            }
            let balance_after = entry.balance_before - entry.paid_now;
            if balance_after.is_sign_negative() {
                return Err(CfdiError::negative("ImpSaldoInsoluto", balance_after));
            }
            paid_sum += entry.paid_now;

            let mut node = schema::new_node(schema::DOCTO_RELACIONADO);
            node.set("IdDocumento", entry.source.uuid);
            node.set_opt("Serie", doc.serie.as_deref());
            node.set_opt("Folio", doc.folio.as_deref());
            node.set("MonedaDR", doc.currency.as_str());
            node.set("EquivalenciaDR", Decimal::ONE);
            node.set("NumParcialidad", entry.installment);
            node.set("ImpSaldoAnt", rounder.round(entry.balance_before));
            node.set("ImpPagado", rounder.round(entry.paid_now));
            node.set("ImpSaldoInsoluto", rounder.round(balance_after));

            if doc.totals.is_empty() {
                node.set("ObjetoImpDR", "01");
            } else {
                node.set("ObjetoImpDR", "02");
                let share = doc.totals.prorate(entry.paid_now, doc.total, rounder)?;
                node.set("ImpuestosDR", taxes_dr_node(&share));
                prorated.push(share);
            }
            documents.push(Value::Node(node));
        }

        let merged = DocumentTotals::merge(&prorated);

        let mut pago = schema::new_node(schema::PAGO);
        pago.set("FechaPago", self.payment_date);
        pago.set("FormaDePagoP", self.payment_form.as_str());
        pago.set("MonedaP", currency.as_str());
        pago.set("TipoCambioP", exchange_rate);
        pago.set("Monto", rounder.round(paid_sum));
        pago.set("DoctoRelacionado", documents);
        if !merged.is_empty() {
            pago.set("ImpuestosP", taxes_p_node(&merged));
        }

        // MontoTotalPagos is always expressed in pesos.
        let pesos = Rounder::for_currency("MXN")?;
        let mut totales = schema::new_node(schema::PAGOS_TOTALES);
        totales.set("MontoTotalPagos", pesos.round(paid_sum * exchange_rate));

        let mut pagos = schema::new_node(schema::PAGOS);
        pagos.set("Version", PAGOS_VERSION);
        pagos.set("Totales", totales);
        pagos.set("Pago", vec![Value::Node(pago)]);

        let mut builder = ComprobanteBuilder::new(self.issuer, self.place_of_issue, self.date)
            .kind(DocumentKind::Payment)
            .currency("XXX")
            .receiver(receiver)
            .add_concept(payment_concept())
            .complement(pagos);
        if let Some(serie) = self.serie {
            builder = builder.serie(serie);
        }
        if let Some(folio) = self.folio {
            builder = builder.folio(folio);
        }
        if let Some(key) = self.confirmation {
            builder = builder.confirmation(key);
        }
        for related in self.related {
            builder = builder.add_related(related);
        }
        if let Some(signer) = self.signer {
            builder = builder.signer(signer);
        }
        builder.build()
    }
}

fn payment_concept() -> Concept {
    Concept {
        product_code: "84111506".to_string(),
        quantity: Decimal::ONE,
        unit_code: "ACT".to_string(),
        unit_name: None,
        description: "Pago".to_string(),
        unit_price: Decimal::ZERO,
        identification: None,
        discount: None,
        tax_status: Some(TaxStatus::NotSubject),
        transferred: Vec::new(),
        withheld: Vec::new(),
        tax_inclusive: false,
        amount: None,
    }
}

fn taxes_dr_node(totals: &DocumentTotals) -> DocumentNode {
    let mut node = schema::new_node(schema::IMPUESTOS_DR);
    if !totals.withheld.is_empty() {
        node.set(
            "RetencionesDR",
            totals
                .withheld
                .iter()
                .map(|g| Value::Node(group_dr_node(schema::RETENCION_DR, g)))
                .collect::<Vec<_>>(),
        );
    }
    if !totals.transferred.is_empty() {
        node.set(
            "TrasladosDR",
            totals
                .transferred
                .iter()
                .map(|g| Value::Node(group_dr_node(schema::TRASLADO_DR, g)))
                .collect::<Vec<_>>(),
        );
    }
    node
}

fn group_dr_node(kind: &'static str, group: &TaxGroup) -> DocumentNode {
    let mut node = schema::new_node(kind);
    node.set("BaseDR", group.base);
    node.set("ImpuestoDR", group.kind.code());
    node.set("TipoFactorDR", group.factor.code());
    node.set_opt("TasaOCuotaDR", group.rate.map(canonical_rate));
    node.set_opt("ImporteDR", group.amount);
    node
}

fn taxes_p_node(totals: &DocumentTotals) -> DocumentNode {
    let mut node = schema::new_node(schema::IMPUESTOS_P);
    let collapsed = collapse_withheld(&totals.withheld);
    if !collapsed.is_empty() {
        node.set(
            "RetencionesP",
            collapsed
                .into_iter()
                .map(|(kind, amount)| {
                    let mut line = schema::new_node(schema::RETENCION_P);
                    line.set("ImpuestoP", kind.code());
                    line.set("ImporteP", amount);
                    Value::Node(line)
                })
                .collect::<Vec<_>>(),
        );
    }
    if !totals.transferred.is_empty() {
        node.set(
            "TrasladosP",
            totals
                .transferred
                .iter()
                .map(|g| {
                    let mut line = schema::new_node(schema::TRASLADO_P);
                    line.set("BaseP", g.base);
                    line.set("ImpuestoP", g.kind.code());
                    line.set("TipoFactorP", g.factor.code());
                    line.set_opt("TasaOCuotaP", g.rate.map(canonical_rate));
                    line.set_opt("ImporteP", g.amount);
                    Value::Node(line)
                })
                .collect::<Vec<_>>(),
        );
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn issuer() -> Issuer {
        Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601")
    }

    fn receiver() -> Receiver {
        Receiver::new("URE180429TM6", "UNIVERSIDAD ROBOTICA", "86991", "601", "G03")
    }

    #[test]
    fn build_requires_receiver_and_concepts() {
        let err = ComprobanteBuilder::new(issuer(), "85000", date())
            .build()
            .unwrap_err();
        assert!(matches!(err, CfdiError::Builder(_)));

        let err = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .build()
            .unwrap_err();
        assert!(matches!(err, CfdiError::Builder(_)));
    }

    #[test]
    fn foreign_currency_needs_exchange_rate() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
            .build()
            .unwrap();
        let err = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .currency("USD")
            .add_concept(concept)
            .build()
            .unwrap_err();
        assert!(matches!(err, CfdiError::Builder(_)));
    }

    #[test]
    fn tax_inclusive_back_solves_unit_price() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(116.00))
            .transfer("IVA|Tasa|0.16")
            .tax_inclusive()
            .build()
            .unwrap();
        let comprobante = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(concept)
            .build()
            .unwrap();

        assert_eq!(comprobante.concepts[0].unit_price, dec!(100.00));
        assert_eq!(comprobante.subtotal, dec!(100.00));
        assert_eq!(comprobante.total, dec!(116.00));
    }

    #[test]
    fn not_subject_concepts_drop_taxes() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
            .transfer("IVA|Tasa|0.16")
            .tax_status(TaxStatus::NotSubject)
            .build()
            .unwrap();
        let comprobante = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(concept)
            .build()
            .unwrap();

        assert!(comprobante.concepts[0].transferred.is_empty());
        assert!(comprobante.totals.is_empty());
        assert_eq!(comprobante.total, dec!(100.00));
    }

    #[test]
    fn tax_status_derived_from_records() {
        let with_taxes = ConceptBuilder::new("01010101", "A", dec!(1), "E48", dec!(100.00))
            .transfer("IVA|Tasa|0.16")
            .build()
            .unwrap();
        let without = ConceptBuilder::new("01010101", "B", dec!(1), "E48", dec!(50.00))
            .build()
            .unwrap();
        let comprobante = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(with_taxes)
            .add_concept(without)
            .build()
            .unwrap();

        assert_eq!(comprobante.concepts[0].tax_status, Some(TaxStatus::Subject));
        assert_eq!(
            comprobante.concepts[1].tax_status,
            Some(TaxStatus::NotSubject)
        );
    }

    #[test]
    fn discount_reduces_base_and_total() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
            .discount(dec!(20.00))
            .transfer("IVA|Tasa|0.16")
            .build()
            .unwrap();
        let comprobante = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(concept)
            .build()
            .unwrap();

        assert_eq!(comprobante.concepts[0].transferred[0].base, Some(dec!(80.00)));
        assert_eq!(comprobante.subtotal, dec!(100.00));
        assert_eq!(comprobante.discount, Some(dec!(20.00)));
        // 100 - 20 + 12.80
        assert_eq!(comprobante.total, dec!(92.80));
    }

    #[test]
    fn excessive_discount_rejected() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
            .discount(dec!(150.00))
            .transfer("IVA|Tasa|0.16")
            .build()
            .unwrap();
        let err = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(concept)
            .build()
            .unwrap_err();
        assert!(matches!(err, CfdiError::NegativeAmount { .. }));
    }

    #[test]
    fn unsigned_draft_has_empty_seal_fields() {
        let concept = ConceptBuilder::new("01010101", "Servicio", dec!(1), "E48", dec!(100.00))
            .build()
            .unwrap();
        let comprobante = ComprobanteBuilder::new(issuer(), "85000", date())
            .receiver(receiver())
            .add_concept(concept)
            .build()
            .unwrap();

        assert!(!comprobante.is_signed());
        assert_eq!(comprobante.seal, "");
        assert_eq!(comprobante.certificate_number, "");
        // Present but empty in the tree, so renderers emit the attributes.
        assert_eq!(
            comprobante.tree.get("Sello").and_then(|v| v.as_text()),
            Some("")
        );
    }
}
