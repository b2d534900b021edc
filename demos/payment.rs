use cfdimx::core::*;
use chrono::NaiveDate;
use rust_decimal_macros::dec;

fn main() {
    let issuer = Issuer::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601");
    let receiver = Receiver::new(
        "URE180429TM6",
        "UNIVERSIDAD ROBOTICA ESPACIAL",
        "86991",
        "601",
        "G03",
    );

    // A PPD invoice to be paid later in two installments
    let invoice = ComprobanteBuilder::new(
        issuer.clone(),
        "85000",
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    )
    .receiver(receiver)
    .payment_form("99")
    .payment_method("PPD")
    .add_concept(
        ConceptBuilder::new("84111506", "Servicios", dec!(10), "E48", dec!(150.00))
            .transfer("IVA|Tasa|0.16")
            .build()
            .unwrap(),
    )
    .build()
    .unwrap();

    println!("Factura total: {} {}", invoice.total, invoice.currency);

    // The invoice gets its UUID from the stamping service; here it is given
    let stamped = StampedDocument {
        uuid: "AAAAAAAA-BBBB-CCCC-DDDD-000000000001",
        document: &invoice,
    };

    // First installment: half the total
    let payment = PaymentBuilder::new(
        issuer,
        "85000",
        NaiveDate::from_ymd_opt(2026, 4, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(16, 45, 0)
            .unwrap(),
        "03",
    )
    .pay_installment(stamped, 1, invoice.total, dec!(870.00))
    .build()
    .unwrap();

    let monto_total = payment
        .tree
        .get("Complemento")
        .and_then(Value::as_node)
        .and_then(|complemento| complemento.get("Pagos"))
        .and_then(Value::as_node)
        .and_then(|pagos| pagos.get("Totales"))
        .and_then(Value::as_node)
        .and_then(|totales| totales.get("MontoTotalPagos"))
        .and_then(Value::as_amount);

    println!("Tipo de comprobante: {}", payment.kind.code());
    println!("Moneda: {}", payment.currency);
    println!("MontoTotalPagos: {}", monto_total.unwrap());
    println!();
    println!("Cadena original:");
    println!("{}", payment.cadena_original());
}
