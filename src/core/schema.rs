//! Fixed field order per node kind.
//!
//! The order of every table follows the CFDI 4.0 cadena-original sequence:
//! the canonical string walks these fields depth-first, so reordering any
//! entry invalidates every previously produced seal. Treat changes here as
//! schema-version changes, never as refactors.

use super::node::DocumentNode;

pub(crate) const COMPROBANTE: &str = "Comprobante";
pub(crate) const INFORMACION_GLOBAL: &str = "InformacionGlobal";
pub(crate) const CFDI_RELACIONADOS: &str = "CfdiRelacionados";
pub(crate) const EMISOR: &str = "Emisor";
pub(crate) const RECEPTOR: &str = "Receptor";
pub(crate) const CONCEPTO: &str = "Concepto";
pub(crate) const CONCEPTO_IMPUESTOS: &str = "ConceptoImpuestos";
pub(crate) const TRASLADO: &str = "Traslado";
pub(crate) const RETENCION: &str = "Retencion";
pub(crate) const IMPUESTOS: &str = "Impuestos";
pub(crate) const RETENCION_RESUMEN: &str = "RetencionResumen";
pub(crate) const COMPLEMENTO: &str = "Complemento";
pub(crate) const PAGOS: &str = "Pagos";
pub(crate) const PAGOS_TOTALES: &str = "PagosTotales";
pub(crate) const PAGO: &str = "Pago";
pub(crate) const DOCTO_RELACIONADO: &str = "DoctoRelacionado";
pub(crate) const IMPUESTOS_DR: &str = "ImpuestosDR";
pub(crate) const TRASLADO_DR: &str = "TrasladoDR";
pub(crate) const RETENCION_DR: &str = "RetencionDR";
pub(crate) const IMPUESTOS_P: &str = "ImpuestosP";
pub(crate) const TRASLADO_P: &str = "TrasladoP";
pub(crate) const RETENCION_P: &str = "RetencionP";

/// Create an empty node of a known kind.
///
/// # Panics
///
/// Panics on an unknown kind — build-time programmer error.
pub(crate) fn new_node(kind: &'static str) -> DocumentNode {
    DocumentNode::new(kind, fields_for(kind))
}

fn fields_for(kind: &str) -> &'static [&'static str] {
    match kind {
        // The seal and certificate body sit at the end: they are populated
        // only after the cadena original has been derived, so they never
        // enter the signing pre-image. NoCertificado does.
        COMPROBANTE => &[
            "Version",
            "Serie",
            "Folio",
            "Fecha",
            "FormaPago",
            "NoCertificado",
            "CondicionesDePago",
            "SubTotal",
            "Descuento",
            "Moneda",
            "TipoCambio",
            "Total",
            "TipoDeComprobante",
            "Exportacion",
            "MetodoPago",
            "LugarExpedicion",
            "Confirmacion",
            "InformacionGlobal",
            "CfdiRelacionados",
            "Emisor",
            "Receptor",
            "Conceptos",
            "Impuestos",
            "Complemento",
            "Sello",
            "Certificado",
        ],
        INFORMACION_GLOBAL => &["Periodicidad", "Meses", "Año"],
        CFDI_RELACIONADOS => &["TipoRelacion", "CfdiRelacionado"],
        EMISOR => &["Rfc", "Nombre", "RegimenFiscal"],
        RECEPTOR => &[
            "Rfc",
            "Nombre",
            "DomicilioFiscalReceptor",
            "ResidenciaFiscal",
            "NumRegIdTrib",
            "RegimenFiscalReceptor",
            "UsoCFDI",
        ],
        CONCEPTO => &[
            "ClaveProdServ",
            "NoIdentificacion",
            "Cantidad",
            "ClaveUnidad",
            "Unidad",
            "Descripcion",
            "ValorUnitario",
            "Importe",
            "Descuento",
            "ObjetoImp",
            "Impuestos",
        ],
        CONCEPTO_IMPUESTOS => &["Traslados", "Retenciones"],
        TRASLADO | RETENCION => &["Base", "Impuesto", "TipoFactor", "TasaOCuota", "Importe"],
        // Document-level withholdings collapse to tax kind and amount.
        RETENCION_RESUMEN => &["Impuesto", "Importe"],
        IMPUESTOS => &[
            "Retenciones",
            "TotalImpuestosRetenidos",
            "Traslados",
            "TotalImpuestosTrasladados",
        ],
        COMPLEMENTO => &["Pagos"],
        PAGOS => &["Version", "Totales", "Pago"],
        PAGOS_TOTALES => &["MontoTotalPagos"],
        PAGO => &[
            "FechaPago",
            "FormaDePagoP",
            "MonedaP",
            "TipoCambioP",
            "Monto",
            "DoctoRelacionado",
            "ImpuestosP",
        ],
        DOCTO_RELACIONADO => &[
            "IdDocumento",
            "Serie",
            "Folio",
            "MonedaDR",
            "EquivalenciaDR",
            "NumParcialidad",
            "ImpSaldoAnt",
            "ImpPagado",
            "ImpSaldoInsoluto",
            "ObjetoImpDR",
            "ImpuestosDR",
        ],
        IMPUESTOS_DR => &["RetencionesDR", "TrasladosDR"],
        TRASLADO_DR | RETENCION_DR => &[
            "BaseDR",
            "ImpuestoDR",
            "TipoFactorDR",
            "TasaOCuotaDR",
            "ImporteDR",
        ],
        IMPUESTOS_P => &["RetencionesP", "TrasladosP"],
        TRASLADO_P => &["BaseP", "ImpuestoP", "TipoFactorP", "TasaOCuotaP", "ImporteP"],
        RETENCION_P => &["ImpuestoP", "ImporteP"],
        other => panic!("unknown node kind '{other}'"),
    }
}
