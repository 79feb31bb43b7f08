use anyhow::{Context, Result, anyhow};
use bytesize::ByteSize;
use dshare_core::{FileId, QuotaSnapshot, RecipientAddress, StoredFile};
use std::time::UNIX_EPOCH;

pub fn parse_did(s: &str) -> Result<FileId> {
    let s = s.trim();
    if s.len() != 64 {
        return Err(anyhow!(
            "expected 64-character hex file id, got {} characters",
            s.len()
        ));
    }
    hex::decode(s).context("failed to decode hex file id")?;
    Ok(FileId::new(s.to_ascii_lowercase()))
}

pub fn parse_address(s: &str) -> Result<RecipientAddress> {
    Ok(RecipientAddress::parse(s)?)
}

/// One listing line: id, size and creation time (unix seconds).
pub fn file_line(file: &StoredFile) -> String {
    let created = file
        .created_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}  {:>10}  {}", file.id, ByteSize(file.size).to_string(), created)
}

pub fn quota_lines(quota: &QuotaSnapshot) -> [String; 2] {
    [
        format!(
            "storage:   {} / {} ({} free)",
            ByteSize(quota.storage_used),
            ByteSize(quota.total_storage),
            ByteSize(quota.storage_remaining())
        ),
        format!(
            "bandwidth: {} / {} ({} free)",
            ByteSize(quota.bandwidth_used),
            ByteSize(quota.total_bandwidth),
            ByteSize(quota.bandwidth_remaining())
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_must_be_64_hex_chars() {
        let did = "AB".repeat(32);
        assert_eq!(parse_did(&did).unwrap().as_str(), "ab".repeat(32));
        assert!(parse_did("abc").is_err());
        assert!(parse_did(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn address_parsing_normalises_case() {
        let address = parse_address(&format!("0X{}", "AB".repeat(20))).unwrap();
        assert_eq!(address.as_str(), format!("0x{}", "ab".repeat(20)));
        assert!(parse_address("0x1234").is_err());
    }
}
