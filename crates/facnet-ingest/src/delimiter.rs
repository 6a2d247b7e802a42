//! Quebec exports use `;` (common in French-locale Excel, where `,` is the
//! decimal separator), but `,` and tab-delimited exports also show up.

const CANDIDATES: [char; 3] = [';', ',', '\t'];

/// Score each candidate delimiter by how consistent its column count is
/// across the first few lines, and prefer `;` on a tie — the dominant
/// convention in the source data this ingestor targets.
pub fn detect_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text.lines().take(5).collect();
    if sample.is_empty() {
        return ';';
    }

    let mut best = ';';
    let mut best_score = -1i64;

    for &candidate in &CANDIDATES {
        let counts: Vec<usize> = sample.iter().map(|line| line.matches(candidate).count()).collect();
        if counts.iter().all(|&c| c == 0) {
            continue;
        }
        let first = counts[0];
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let score = (consistent as i64) * 1000 + first as i64;

        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_semicolon() {
        let text = "facture;patient;code\nF1;Jean;19929\nF2;Marie;19928\n";
        assert_eq!(detect_delimiter(text), ';');
    }

    #[test]
    fn detects_comma() {
        let text = "facture,patient,code\nF1,Jean,19929\nF2,Marie,19928\n";
        assert_eq!(detect_delimiter(text), ',');
    }

    #[test]
    fn ties_prefer_semicolon() {
        // Single column, neither delimiter present anywhere: default wins.
        let text = "facture\nF1\nF2\n";
        assert_eq!(detect_delimiter(text), ';');
    }
}
