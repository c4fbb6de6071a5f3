//! Recovery bundle: the server-less escape hatch.
//!
//! A bundle is a text container of armored sections:
//!
//! ```text
//! -----BEGIN REDOUBT METADATA-----
//! <base64, 64 columns>
//! -----END REDOUBT METADATA-----
//! -----BEGIN REDOUBT EKEY-----
//! <base64>
//! -----END REDOUBT EKEY-----
//! ```
//!
//! `METADATA` carries the raw vault metadata record, `EKEY` the raw
//! effective key.  Anyone holding a bundle can read the vault without
//! passphrase or server, so it is meant to be printed and locked away,
//! never stored next to the vault.

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use redoubt_core::{VaultError, VaultResult};
use zeroize::Zeroizing;

pub const SECTION_METADATA: &str = "METADATA";
pub const SECTION_EKEY: &str = "EKEY";

const ARMOR_COLS: usize = 64;

/// The two byte sections the vault core consumes.
pub struct RecoveryBundle {
    pub metadata: Vec<u8>,
    pub ekey: Zeroizing<Vec<u8>>,
}

fn begin_line(name: &str) -> String {
    format!("-----BEGIN REDOUBT {name}-----")
}

fn end_line(name: &str) -> String {
    format!("-----END REDOUBT {name}-----")
}

fn write_section(out: &mut dyn Write, name: &str, data: &[u8]) -> VaultResult<()> {
    writeln!(out, "{}", begin_line(name))?;
    let encoded = BASE64.encode(data);
    for chunk in encoded.as_bytes().chunks(ARMOR_COLS) {
        // chunks() of valid base64 output is always ASCII.
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    writeln!(out, "{}", end_line(name))?;
    Ok(())
}

/// Write a bundle containing the metadata record and the effective key.
pub fn export(out: &mut dyn Write, metadata: &[u8], ekey: &[u8]) -> VaultResult<()> {
    write_section(out, SECTION_METADATA, metadata)?;
    write_section(out, SECTION_EKEY, ekey)?;
    out.flush()?;
    Ok(())
}

fn parse_section(lines: &mut std::str::Lines<'_>, name: &str) -> VaultResult<Vec<u8>> {
    // Skip blanks and comments between sections.
    let begin = begin_line(name);
    loop {
        let line = lines
            .next()
            .ok_or_else(|| VaultError::BadRecovery(format!("missing {name} section")))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == begin {
            break;
        }
        return Err(VaultError::BadRecovery(format!(
            "expected {name} section header"
        )));
    }

    let end = end_line(name);
    let mut encoded = String::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| VaultError::BadRecovery(format!("unterminated {name} section")))?;
        let line = line.trim();
        if line == end {
            break;
        }
        encoded.push_str(line);
    }

    BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| VaultError::BadRecovery(format!("{name} section is not valid base64")))
}

/// Parse a bundle, returning the two required sections.
pub fn import(text: &str) -> VaultResult<RecoveryBundle> {
    let mut lines = text.lines();
    let metadata = parse_section(&mut lines, SECTION_METADATA)?;
    let ekey = Zeroizing::new(parse_section(&mut lines, SECTION_EKEY)?);

    if metadata.is_empty() {
        return Err(VaultError::BadRecovery("empty METADATA section".into()));
    }
    if ekey.is_empty() {
        return Err(VaultError::BadRecovery("empty EKEY section".into()));
    }
    Ok(RecoveryBundle { metadata, ekey })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(meta: &[u8], key: &[u8]) -> RecoveryBundle {
        let mut buf = Vec::new();
        export(&mut buf, meta, key).unwrap();
        import(std::str::from_utf8(&buf).unwrap()).unwrap()
    }

    #[test]
    fn test_export_import_roundtrip() {
        let meta: Vec<u8> = (0..=255).collect();
        let key = [0xEEu8; 32];
        let bundle = roundtrip(&meta, &key);

        assert_eq!(bundle.metadata, meta);
        assert_eq!(bundle.ekey.as_slice(), &key);
    }

    #[test]
    fn test_armor_is_wrapped() {
        let mut buf = Vec::new();
        export(&mut buf, &[0u8; 300], &[1u8; 32]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().all(|l| l.len() <= 64 + 21));
        assert!(text.contains("-----BEGIN REDOUBT METADATA-----"));
        assert!(text.contains("-----END REDOUBT EKEY-----"));
    }

    #[test]
    fn test_import_tolerates_comments_and_blanks() {
        let mut buf = Vec::new();
        export(&mut buf, b"meta", b"key0key0key0key0").unwrap();
        let text = format!(
            "# printed 2026-02-21, keep offline\n\n{}",
            String::from_utf8(buf).unwrap()
        );
        let bundle = import(&text).unwrap();
        assert_eq!(bundle.metadata, b"meta");
    }

    #[test]
    fn test_import_rejects_missing_ekey() {
        let mut buf = Vec::new();
        write_section(&mut buf, SECTION_METADATA, b"meta").unwrap();
        assert!(matches!(
            import(std::str::from_utf8(&buf).unwrap()),
            Err(VaultError::BadRecovery(_))
        ));
    }

    #[test]
    fn test_import_rejects_bad_base64() {
        let text = "-----BEGIN REDOUBT METADATA-----\n@@@@\n-----END REDOUBT METADATA-----\n";
        assert!(matches!(import(text), Err(VaultError::BadRecovery(_))));
    }

    #[test]
    fn test_import_rejects_unterminated_section() {
        let text = "-----BEGIN REDOUBT METADATA-----\nAAAA\n";
        assert!(matches!(import(text), Err(VaultError::BadRecovery(_))));
    }

    #[test]
    fn test_import_rejects_swapped_sections() {
        let mut buf = Vec::new();
        write_section(&mut buf, SECTION_EKEY, b"key").unwrap();
        write_section(&mut buf, SECTION_METADATA, b"meta").unwrap();
        assert!(matches!(
            import(std::str::from_utf8(&buf).unwrap()),
            Err(VaultError::BadRecovery(_))
        ));
    }
}
