use cfdimx::core::*;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn main() {
    // Create a standard income comprobante (factura)
    let comprobante = ComprobanteBuilder::new(
        Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601"),
        "85000",
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    )
    .serie("F")
    .folio("123")
    .receiver(Receiver::new(
        "URE180429TM6",
        "UNIVERSIDAD ROBOTICA ESPACIAL",
        "86991",
        "601",
        "G03",
    ))
    .payment_form("03")
    .payment_method("PUE")
    .add_concept(
        ConceptBuilder::new(
            "84111506",
            "Desarrollo de software",
            dec!(80),
            "E48",
            dec!(650.00),
        )
        .transfer("IVA|Tasa|0.16")
        .build()
        .unwrap(),
    )
    .add_concept(
        ConceptBuilder::new("81112105", "Hosting (mensual)", dec!(1), "E48", dec!(890.00))
            .transfer("IVA|Tasa|0.16")
            .discount(dec!(90.00))
            .build()
            .unwrap(),
    )
    .build()
    .unwrap();

    println!("SubTotal: {}", comprobante.subtotal);
    if let Some(discount) = comprobante.discount {
        println!("Descuento: {discount}");
    }
    for group in &comprobante.totals.transferred {
        println!(
            "Traslado {} {} {}: {}",
            group.kind.name(),
            group.factor.code(),
            group.rate.map(|r| r.to_string()).unwrap_or_default(),
            group.amount.map(|a| a.to_string()).unwrap_or_default(),
        );
    }
    println!("Total: {}", comprobante.total);
    println!();
    println!("Cadena original:");
    println!("{}", comprobante.cadena_original());
}
