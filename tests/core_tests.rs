use cfdimx::core::*;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn issuer() -> Issuer {
    Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601")
}

fn receiver() -> Receiver {
    Receiver::new("URE180429TM6", "UNIVERSIDAD ROBOTICA", "86991", "601", "G03")
}

// --- Income invoice with transferred and withheld taxes ---

#[test]
fn income_invoice_with_iva_and_isr() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .payment_form("03")
        .payment_method("PPD")
        .add_concept(
            ConceptBuilder::new(
                "80131500",
                "Renta de oficinas",
                dec!(1),
                "E48",
                dec!(2250000.00),
            )
            .transfer("IVA|Tasa|0.16")
            .withhold("ISR|Tasa|0.30")
            .build()
            .unwrap(),
        )
        .build()
        .unwrap();

    assert_eq!(comprobante.subtotal, dec!(2250000.00));
    assert_eq!(comprobante.discount, None);

    let transferred = &comprobante.totals.transferred;
    assert_eq!(transferred.len(), 1);
    assert_eq!(transferred[0].kind, TaxKind::Iva);
    assert_eq!(transferred[0].base, dec!(2250000.00));
    assert_eq!(transferred[0].amount, Some(dec!(360000.00)));
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(360000.00)));

    let withheld = &comprobante.totals.withheld;
    assert_eq!(withheld.len(), 1);
    assert_eq!(withheld[0].kind, TaxKind::Isr);
    assert_eq!(withheld[0].amount, Some(dec!(675000.00)));
    assert_eq!(comprobante.totals.total_withheld, Some(dec!(675000.00)));

    // 2250000 + 360000 - 675000
    assert_eq!(comprobante.total, dec!(1935000.00));
    assert_eq!(comprobante.concepts[0].tax_status, Some(TaxStatus::Subject));
}

#[test]
fn concepts_with_same_rate_share_a_group() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio A", dec!(1), "E48", dec!(100.00))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio B", dec!(2), "E48", dec!(50.00))
                .transfer("002|Tasa|0.160")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    assert_eq!(comprobante.subtotal, dec!(200.00));
    assert_eq!(comprobante.totals.transferred.len(), 1);
    assert_eq!(comprobante.totals.transferred[0].base, dec!(200.00));
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(32.00)));
    assert_eq!(comprobante.total, dec!(232.00));
}

#[test]
fn exempt_concept_contributes_base_but_no_amount() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("01010101", "Libro", dec!(1), "H87", dec!(300.00))
                .transfer("IVA|Exento")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let group = &comprobante.totals.transferred[0];
    assert_eq!(group.factor, FactorType::Exempt);
    assert_eq!(group.base, dec!(300.00));
    assert_eq!(group.amount, None);
    assert_eq!(comprobante.totals.total_transferred, None);
    assert_eq!(comprobante.total, dec!(300.00));
}

#[test]
fn mixed_exempt_and_taxed_concepts() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("01010101", "Libro", dec!(1), "H87", dec!(300.00))
                .transfer("IVA|Exento")
                .build()
                .unwrap(),
        )
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    // Exempt and rated IVA are distinct groups; only the rated one totals.
    assert_eq!(comprobante.totals.transferred.len(), 2);
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(16.00)));
    assert_eq!(comprobante.total, dec!(416.00));
}

#[test]
fn fee_tax_is_fixed_per_concept() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("50202306", "Bebida saborizada", dec!(10), "H87", dec!(12.00))
                .transfer("IEPS|Cuota|1.2705")
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let ieps = comprobante
        .totals
        .transferred
        .iter()
        .find(|g| g.kind == TaxKind::Ieps)
        .unwrap();
    // Cuota does not scale with the base.
    assert_eq!(ieps.amount, Some(dec!(1.27)));
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(20.47)));
}

// --- Rounding ---

#[test]
fn amounts_round_half_up_per_concept() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(3), "E48", dec!(33.335))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    // 3 × 33.335 = 100.005 → 100.01
    assert_eq!(comprobante.concepts[0].amount, Some(dec!(100.01)));
    assert_eq!(comprobante.subtotal, dec!(100.01));
    // 100.01 × 0.16 = 16.0016 → 16.00
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(16.00)));
}

#[test]
fn zero_decimal_currency_rounds_to_integers() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .currency("JPY")
        .exchange_rate(dec!(0.12))
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(3), "E48", dec!(100.50))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    // 3 × 100.50 = 301.5 → 302
    assert_eq!(comprobante.concepts[0].amount, Some(dec!(302)));
    assert_eq!(comprobante.totals.total_transferred, Some(dec!(48)));
    assert_eq!(comprobante.total, dec!(350));
}

// --- Rejections ---

#[test]
fn unknown_currency_rejected() {
    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .currency("PESOS")
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::UnknownCurrency(_)));
}

#[test]
fn negative_quantity_rejected() {
    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(-1), "E48", dec!(100.00))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::NegativeAmount { .. }));
}

#[test]
fn negative_discount_rejected() {
    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
                .discount(dec!(-5.00))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::NegativeAmount { .. }));
}

#[test]
fn inclusive_price_with_preset_amount_is_ambiguous() {
    let mut record = TaxRecord::rate(TaxKind::Iva, dec!(0.16));
    record.amount = Some(dec!(16.00));
    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(116.00))
                .transfer_record(record)
                .tax_inclusive()
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::AmbiguousTaxBase));
}

#[test]
fn malformed_tax_spec_surfaces_from_concept_builder() {
    let err = ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
        .transfer("IVA|Porcentaje|0.16")
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::MalformedTaxSpec(_)));

    let err = ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
        .transfer("IVA|Tasa|-0.16")
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::MalformedTaxSpec(_)));
}

#[test]
fn negative_rate_never_reaches_the_document() {
    // A structurally built record bypasses the compact-spec parser; the
    // build must still refuse it rather than seal a negative Importe.
    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
                .transfer_record(TaxRecord::rate(TaxKind::Iva, dec!(-0.16)))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::NegativeAmount { .. }));

    let err = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(20.00))
                .withhold_record(TaxRecord::fee(TaxKind::Ieps, dec!(-1.27)))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, CfdiError::NegativeAmount { .. }));
}

// --- Credit note and related documents ---

#[test]
fn credit_note_references_original() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 20))
        .receiver(receiver())
        .kind(DocumentKind::Expense)
        .serie("NC")
        .folio("77")
        .add_related(RelatedDocuments {
            relation_code: "01".into(),
            uuids: vec!["5FB2822E-396D-4725-8521-CDC4BDD20CCF".into()],
        })
        .add_concept(
            ConceptBuilder::new("84111506", "Bonificación", dec!(1), "ACT", dec!(100.00))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    assert_eq!(comprobante.kind, DocumentKind::Expense);
    let related = comprobante.tree.get("CfdiRelacionados").unwrap();
    let node = related.as_sequence().unwrap()[0].as_node().unwrap();
    assert_eq!(
        node.get("TipoRelacion").and_then(|v| v.as_text()),
        Some("01")
    );
}

#[test]
fn global_invoice_carries_period_information() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 2, 1))
        .receiver(Receiver::new(
            "XAXX010101000",
            "PUBLICO EN GENERAL",
            "85000",
            "616",
            "S01",
        ))
        .global_information(GlobalInformation {
            periodicity: "04".into(),
            months: "01".into(),
            year: 2026,
        })
        .add_concept(
            ConceptBuilder::new("01010101", "Venta", dec!(1), "ACT", dec!(540.00))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let info = comprobante
        .tree
        .get("InformacionGlobal")
        .and_then(|v| v.as_node())
        .unwrap();
    assert_eq!(info.get("Periodicidad").and_then(|v| v.as_text()), Some("04"));
    assert_eq!(info.get("Año"), Some(&Value::Integer(2026)));
}

// --- Serde ---

#[test]
fn totals_serialize_with_string_decimals() {
    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(receiver())
        .add_concept(
            ConceptBuilder::new("84111506", "Servicio", dec!(1), "E48", dec!(100.00))
                .transfer("IVA|Tasa|0.16")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let json = serde_json::to_value(&comprobante.totals).unwrap();
    // rust_decimal's serde-with-str keeps amounts exact and scale-preserving.
    assert_eq!(json["total_transferred"], "16.00");

    let back: DocumentTotals = serde_json::from_value(json).unwrap();
    assert_eq!(back, comprobante.totals);
}

// --- Foreign receiver ---

#[test]
fn foreign_receiver_fields_render() {
    let mut foreign = Receiver::new("XEXX010101000", "ACME INC", "85000", "616", "S01");
    foreign.foreign_country = Some("USA".into());
    foreign.foreign_tax_id = Some("121585958".into());

    let comprobante = ComprobanteBuilder::new(issuer(), "85000", date(2026, 3, 14))
        .receiver(foreign)
        .export_code("02")
        .currency("USD")
        .exchange_rate(dec!(17.1234))
        .add_concept(
            ConceptBuilder::new("84111506", "Service", dec!(1), "E48", dec!(100.00))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let receptor = comprobante
        .tree
        .get("Receptor")
        .and_then(|v| v.as_node())
        .unwrap();
    assert_eq!(
        receptor.get("ResidenciaFiscal").and_then(|v| v.as_text()),
        Some("USA")
    );
    assert_eq!(
        receptor.get("NumRegIdTrib").and_then(|v| v.as_text()),
        Some("121585958")
    );
    assert_eq!(
        comprobante.tree.get("TipoCambio").and_then(|v| v.as_amount()),
        Some(dec!(17.1234))
    );
}
