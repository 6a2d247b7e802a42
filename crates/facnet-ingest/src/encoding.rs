//! Quebec RAMQ billing exports are inconsistently encoded: recent exports
//! are UTF-8 (sometimes with a BOM), older ones are Windows-1252 (the
//! Microsoft superset of Latin-1 used by French-Canadian Excel exports).

pub struct DetectedEncoding {
    pub text: String,
    pub label: &'static str,
}

/// Decode raw bytes, preferring UTF-8 (stripping a BOM if present) and
/// falling back to Windows-1252 when the bytes aren't valid UTF-8.
pub fn decode_bytes(bytes: &[u8]) -> Result<DetectedEncoding, String> {
    let without_bom = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(without_bom) {
        return Ok(DetectedEncoding {
            text: text.to_string(),
            label: "utf-8",
        });
    }

    let (cow, _, had_errors) = encoding_rs::WINDOWS_1252.decode(without_bom);
    if had_errors {
        return Err("file is neither valid UTF-8 nor decodable as Windows-1252".to_string());
    }

    Ok(DetectedEncoding {
        text: cow.into_owned(),
        label: "windows-1252",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_utf8() {
        let d = decode_bytes("facture,patient\nF1,Jean".as_bytes()).unwrap();
        assert_eq!(d.label, "utf-8");
        assert!(d.text.contains("Jean"));
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"facture,patient\nF1,Jean");
        let d = decode_bytes(&bytes).unwrap();
        assert!(d.text.starts_with("facture"));
    }

    #[test]
    fn falls_back_to_windows_1252_for_accented_bytes() {
        // 0xE9 in Windows-1252 is 'é'; invalid as a standalone UTF-8 byte.
        let mut bytes = b"facture,patient\nF1,Ren".to_vec();
        bytes.push(0xE9);
        let d = decode_bytes(&bytes).unwrap();
        assert_eq!(d.label, "windows-1252");
        assert!(d.text.contains('é'));
    }
}
