use crate::headers::HeaderMap;
use chrono::NaiveDate;
use facnet_schemas::BillingRecord;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

/// Parse a Quebec-locale decimal amount. Accepts both `,` and `.` as the
/// fractional separator (French-locale exports use `,`); rejects anything
/// with more than one separator or non-numeric characters, since a
/// misparsed amount would silently corrupt a monetary-impact calculation
/// downstream.
pub fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let trimmed = raw.trim().replace('\u{a0}', "").replace(' ', "");
    if trimmed.is_empty() {
        return Err("empty amount".to_string());
    }

    let normalized = if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed
    };

    Decimal::from_str(&normalized).map_err(|e| format!("invalid amount '{raw}': {e}"))
}

/// Parse a date in either `yyyy-MM-dd` or `dd/MM/yyyy` (the two formats
/// seen across RAMQ export vintages).
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .map_err(|_| format!("invalid date '{raw}', expected yyyy-MM-dd or dd/MM/yyyy"))
}

/// Sanity check used to reject obviously-corrupt monetary pairs: a paid
/// amount may legitimately be zero (unpaid) but never negative, and should
/// never exceed the preliminary amount by more than a cent of rounding
/// slack.
pub fn price_is_sane(preliminaire: Decimal, paye: Decimal) -> bool {
    paye >= Decimal::ZERO && preliminaire >= Decimal::ZERO && paye <= preliminaire + Decimal::new(1, 2)
}

pub fn parse_row(headers: &HeaderMap, rec: &csv::StringRecord, run_id: Uuid) -> Result<BillingRecord, String> {
    let get = |field: &str| -> Result<String, String> {
        headers
            .get(rec, field)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("missing required field '{field}'"))
    };

    let facture = get("facture")?;
    let id_ramq = get("id_ramq")?;
    let patient = get("patient")?;
    let doctor_info = get("doctor_info")?;
    let date_service = parse_date(&get("date_service")?)?;
    let lieu_pratique = get("lieu_pratique")?;
    let code = get("code")?;

    let montant_preliminaire = parse_amount(&get("montant_preliminaire")?)?;
    let montant_paye = parse_amount(&get("montant_paye")?)?;
    if !price_is_sane(montant_preliminaire, montant_paye) {
        return Err(format!(
            "montant_paye ({montant_paye}) exceeds montant_preliminaire ({montant_preliminaire})"
        ));
    }

    let debut = headers.get(rec, "debut").map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let fin = headers.get(rec, "fin").map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let secteur_activite = headers
        .get(rec, "secteur_activite")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let diagnostic = headers
        .get(rec, "diagnostic")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let element_contexte = headers
        .get(rec, "element_contexte")
        .map(|v| v.trim().to_string())
        .unwrap_or_default();

    let unites = match headers.get(rec, "unites").map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Some(parse_amount(v)?),
        None => None,
    };

    let mut custom_fields = serde_json::Map::new();
    for (name, value) in headers.extra_columns(rec) {
        if !value.trim().is_empty() {
            custom_fields.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    Ok(BillingRecord {
        id: Uuid::new_v4(),
        validation_run_id: run_id,
        facture,
        id_ramq,
        patient,
        doctor_info,
        date_service,
        debut,
        fin,
        lieu_pratique,
        secteur_activite,
        diagnostic,
        code,
        unites,
        element_contexte,
        montant_preliminaire,
        montant_paye,
        custom_fields: serde_json::Value::Object(custom_fields),
        created_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_decimal_amount() {
        assert_eq!(parse_amount("64,80").unwrap(), Decimal::new(6480, 2));
    }

    #[test]
    fn parses_dot_decimal_amount() {
        assert_eq!(parse_amount("64.80").unwrap(), Decimal::new(6480, 2));
    }

    #[test]
    fn rejects_malformed_amount() {
        assert!(parse_amount("64,80,00").is_err());
    }

    #[test]
    fn parses_iso_date() {
        assert_eq!(parse_date("2025-06-01").unwrap(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn parses_slash_date() {
        assert_eq!(parse_date("01/06/2025").unwrap(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn rejects_paid_amount_exceeding_preliminary() {
        assert!(!price_is_sane(Decimal::new(3000, 2), Decimal::new(6000, 2)));
    }
}
