//! Tax computation and document-level aggregation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::currencies::Rounder;
use super::error::CfdiError;
use super::types::{Concept, DocumentTotals, FactorType, TaxGroup, TaxKind, TaxRecord};

impl TaxRecord {
    /// Parse the compact form `"kind|factor[|rate]"`, e.g. `"IVA|Tasa|0.16"`
    /// or `"003|Exento"`. The kind is accepted by short name or SAT code.
    pub fn parse(spec: &str) -> Result<Self, CfdiError> {
        let malformed = || CfdiError::MalformedTaxSpec(spec.to_string());

        let mut parts = spec.split('|');
        let kind = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(TaxKind::from_code)
            .ok_or_else(malformed)?;
        let factor = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(FactorType::from_code)
            .ok_or_else(malformed)?;
        let rate = match parts.next() {
            Some(s) if !s.is_empty() => {
                let rate = s.parse::<Decimal>().map_err(|_| malformed())?;
                // TasaOCuota is never negative.
                if rate.is_sign_negative() {
                    return Err(malformed());
                }
                Some(rate)
            }
            _ => None,
        };
        if parts.next().is_some() {
            return Err(malformed());
        }

        match factor {
            // Exempt records never carry a rate; Rate/Fee records require one.
            FactorType::Exempt if rate.is_some() => Err(malformed()),
            FactorType::Rate | FactorType::Fee if rate.is_none() => Err(malformed()),
            _ => Ok(Self {
                kind,
                factor,
                rate,
                base: None,
                amount: None,
            }),
        }
    }

    /// Compute `base` and `amount` for this record against a concept base.
    ///
    /// Returns a new record; fails with [`CfdiError::AmbiguousTaxBase`] if
    /// the record already carries either value (a pre-set base or amount
    /// would make later inverse derivations ambiguous).
    pub fn compute(&self, base: Decimal, rounder: Rounder) -> Result<TaxRecord, CfdiError> {
        if self.base.is_some() || self.amount.is_some() {
            return Err(CfdiError::AmbiguousTaxBase);
        }
        if base.is_sign_negative() {
            return Err(CfdiError::negative("tax base", base));
        }
        // Structurally built records bypass parse, so the rate is checked
        // here as well; a negative TasaOCuota would sign a negative Importe.
        if let Some(rate) = self.rate {
            if rate.is_sign_negative() {
                return Err(CfdiError::negative("TasaOCuota", rate));
            }
        }

        let mut computed = self.clone();
        computed.base = Some(base);
        computed.amount = match self.factor {
            FactorType::Exempt => None,
            FactorType::Rate => {
                let rate = self.require_rate()?;
                Some(rounder.round(base * rate))
            }
            // A Cuota is a fixed fee; the base is carried but does not scale it.
            FactorType::Fee => {
                let fee = self.require_rate()?;
                Some(rounder.round(fee))
            }
        };
        Ok(computed)
    }

    pub(crate) fn require_rate(&self) -> Result<Decimal, CfdiError> {
        self.rate.ok_or_else(|| {
            CfdiError::Builder(format!(
                "{} tax record of factor {} has no rate",
                self.kind.name(),
                self.factor.code()
            ))
        })
    }
}

/// Grouping key: exact decimal comparison of the rate, so rates that print
/// identically always merge into one group.
type GroupKey = (TaxKind, FactorType, Option<Decimal>);

#[derive(Default)]
struct GroupAcc {
    base: Decimal,
    amount: Option<Decimal>,
}

fn accumulate(groups: &mut BTreeMap<GroupKey, GroupAcc>, record: &TaxRecord) {
    // Exempt groups are keyed by kind alone and never accumulate an amount.
    let key = match record.factor {
        FactorType::Exempt => (record.kind, FactorType::Exempt, None),
        _ => (record.kind, record.factor, record.rate),
    };
    let acc = groups.entry(key).or_default();
    acc.base += record.base.unwrap_or_default();
    if let Some(amount) = record.amount {
        *acc.amount.get_or_insert(Decimal::ZERO) += amount;
    }
}

fn into_groups(groups: BTreeMap<GroupKey, GroupAcc>) -> (Vec<TaxGroup>, Option<Decimal>) {
    let mut total: Option<Decimal> = None;
    let lines = groups
        .into_iter()
        .map(|((kind, factor, rate), acc)| {
            if let Some(amount) = acc.amount {
                *total.get_or_insert(Decimal::ZERO) += amount;
            }
            TaxGroup {
                kind,
                factor,
                rate,
                base: acc.base,
                amount: acc.amount,
            }
        })
        .collect();
    (lines, total)
}

impl DocumentTotals {
    /// Aggregate the computed per-concept tax records across the whole
    /// concept list. Deterministic: groups are ordered by key, so running
    /// the aggregation twice yields identical totals.
    pub fn aggregate(concepts: &[Concept]) -> Self {
        let mut transferred: BTreeMap<GroupKey, GroupAcc> = BTreeMap::new();
        let mut withheld: BTreeMap<GroupKey, GroupAcc> = BTreeMap::new();

        for concept in concepts {
            for record in &concept.transferred {
                accumulate(&mut transferred, record);
            }
            for record in &concept.withheld {
                accumulate(&mut withheld, record);
            }
        }

        let (transferred, total_transferred) = into_groups(transferred);
        let (withheld, total_withheld) = into_groups(withheld);
        Self {
            transferred,
            withheld,
            total_transferred,
            total_withheld,
        }
    }

    /// Allocate a fraction of these totals to a partial payment.
    ///
    /// Each group contributes `round(group_value × paid_now / original_total)`
    /// independently; no rounding remainder is redistributed between groups.
    /// Paying the full total reproduces every group exactly. Exempt groups
    /// carry only a prorated base, never an amount.
    pub fn prorate(
        &self,
        paid_now: Decimal,
        original_total: Decimal,
        rounder: Rounder,
    ) -> Result<DocumentTotals, CfdiError> {
        if original_total <= Decimal::ZERO {
            return Err(CfdiError::Builder(format!(
                "cannot prorate against non-positive document total {original_total}"
            )));
        }
        if paid_now.is_sign_negative() {
            return Err(CfdiError::negative("paid amount", paid_now));
        }

        let scale = |value: Decimal| rounder.round(value * paid_now / original_total);
        let prorate_groups = |groups: &[TaxGroup]| -> (Vec<TaxGroup>, Option<Decimal>) {
            let mut total: Option<Decimal> = None;
            let lines = groups
                .iter()
                .map(|g| {
                    let amount = g.amount.map(scale);
                    if let Some(a) = amount {
                        *total.get_or_insert(Decimal::ZERO) += a;
                    }
                    TaxGroup {
                        kind: g.kind,
                        factor: g.factor,
                        rate: g.rate,
                        base: scale(g.base),
                        amount,
                    }
                })
                .collect();
            (lines, total)
        };

        let (transferred, total_transferred) = prorate_groups(&self.transferred);
        let (withheld, total_withheld) = prorate_groups(&self.withheld);
        Ok(DocumentTotals {
            transferred,
            withheld,
            total_transferred,
            total_withheld,
        })
    }

    /// Merge several totals into one, re-grouping by the same keys. Used for
    /// the payment-level summary across related documents.
    pub fn merge<'a>(parts: impl IntoIterator<Item = &'a DocumentTotals>) -> DocumentTotals {
        let mut transferred: BTreeMap<GroupKey, GroupAcc> = BTreeMap::new();
        let mut withheld: BTreeMap<GroupKey, GroupAcc> = BTreeMap::new();

        for part in parts {
            for g in &part.transferred {
                accumulate_group(&mut transferred, g);
            }
            for g in &part.withheld {
                accumulate_group(&mut withheld, g);
            }
        }

        let (transferred, total_transferred) = into_groups(transferred);
        let (withheld, total_withheld) = into_groups(withheld);
        DocumentTotals {
            transferred,
            withheld,
            total_transferred,
            total_withheld,
        }
    }
}

fn accumulate_group(groups: &mut BTreeMap<GroupKey, GroupAcc>, group: &TaxGroup) {
    let key = (group.kind, group.factor, group.rate);
    let acc = groups.entry(key).or_default();
    acc.base += group.base;
    if let Some(amount) = group.amount {
        *acc.amount.get_or_insert(Decimal::ZERO) += amount;
    }
}
