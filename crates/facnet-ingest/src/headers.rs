use std::collections::HashMap;

/// Canonical field name -> accepted header spellings (French and English,
/// lowercased, accents stripped). The RAMQ export header row is not
/// standardized across clinics, so this is a synonym table rather than a
/// fixed column list.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("facture", &["facture", "invoice"]),
    ("id_ramq", &["id ramq", "idramq", "# ramq", "ramq"]),
    ("patient", &["patient"]),
    ("doctor_info", &["doctorinfo", "medecin", "docteur", "doctor"]),
    ("date_service", &["date de service", "dateservice", "date service", "service date"]),
    ("debut", &["debut", "heure debut", "start"]),
    ("fin", &["fin", "heure fin", "end"]),
    ("lieu_pratique", &["lieu de pratique", "lieupratique", "lieu", "practice location"]),
    ("secteur_activite", &["secteur d'activite", "secteur dactivite", "secteuractivite", "sector"]),
    ("diagnostic", &["diagnostic", "diagnosis"]),
    ("code", &["code"]),
    ("unites", &["unites", "unites\u{a0}", "units"]),
    ("element_contexte", &["element de contexte", "elementcontexte", "context element", "contexte"]),
    ("montant_preliminaire", &["montant preliminaire", "montantpreliminaire", "preliminary amount"]),
    ("montant_paye", &["montant paye", "montantpaye", "paid amount"]),
];

const REQUIRED: &[&str] = &[
    "facture",
    "id_ramq",
    "patient",
    "doctor_info",
    "date_service",
    "lieu_pratique",
    "code",
    "montant_preliminaire",
    "montant_paye",
];

fn normalize(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '\u{e9}' | '\u{e8}' | '\u{ea}' | '\u{eb}' => 'e',
            '\u{e0}' | '\u{e2}' => 'a',
            '\u{f4}' => 'o',
            '\u{fb}' | '\u{f9}' => 'u',
            '\u{ee}' | '\u{ef}' => 'i',
            '\u{e7}' => 'c',
            other => other,
        })
        .collect()
}

pub struct HeaderMap {
    idx: HashMap<&'static str, usize>,
    original_headers: Vec<String>,
}

impl HeaderMap {
    pub fn from_headers(headers: &csv::StringRecord) -> Result<Self, String> {
        let mut normalized_to_col = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            normalized_to_col.insert(normalize(h), i);
        }

        let mut idx = HashMap::new();
        for (canonical, synonyms) in SYNONYMS {
            for syn in *synonyms {
                if let Some(&col) = normalized_to_col.get(*syn) {
                    idx.insert(*canonical, col);
                    break;
                }
            }
        }

        let missing: Vec<&str> = REQUIRED.iter().filter(|f| !idx.contains_key(*f)).copied().collect();
        if !missing.is_empty() {
            return Err(format!("CSV missing required column(s): {}", missing.join(", ")));
        }

        Ok(Self {
            idx,
            original_headers: headers.iter().map(|h| h.to_string()).collect(),
        })
    }

    pub fn get<'a>(&self, rec: &'a csv::StringRecord, field: &str) -> Option<&'a str> {
        self.idx.get(field).and_then(|&i| rec.get(i))
    }

    /// Columns present in the file that don't map to any canonical field —
    /// carried through to `BillingRecord::custom_fields` rather than dropped.
    pub fn extra_columns<'a>(&self, rec: &'a csv::StringRecord) -> Vec<(&str, &'a str)> {
        let mapped_cols: std::collections::HashSet<usize> = self.idx.values().copied().collect();
        self.original_headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !mapped_cols.contains(i))
            .filter_map(|(i, name)| rec.get(i).map(|v| (name.as_str(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_french_headers() {
        let headers = csv::StringRecord::from(vec![
            "Facture",
            "ID RAMQ",
            "Patient",
            "Medecin",
            "Date de service",
            "Lieu de pratique",
            "Code",
            "Montant preliminaire",
            "Montant paye",
        ]);
        assert!(HeaderMap::from_headers(&headers).is_ok());
    }

    #[test]
    fn rejects_missing_required_column() {
        let headers = csv::StringRecord::from(vec!["Facture", "Patient"]);
        let err = HeaderMap::from_headers(&headers).unwrap_err();
        assert!(err.contains("missing required column"));
    }
}
