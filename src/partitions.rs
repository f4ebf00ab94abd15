//! Partition-table CSV parsing and binary emission.
//!
//! The flash layout is described by a CSV of `name, type, subtype, offset,
//! size, flags` rows. Offsets may be left empty, in which case a row
//! continues at the previous row's `offset + size`. The binary form is a
//! sequence of 32-byte little-endian records flashed alongside the program
//! image.

use std::fmt::Write as _;
use thiserror::Error;

/// Magic tag of a binary partition record.
pub const ENTRY_MAGIC: [u8; 2] = [0xAA, 0x50];
/// Required alignment of app partition offsets.
pub const APP_ALIGNMENT: u32 = 0x10000;
/// Flash offset where the partition table itself lives.
pub const TABLE_OFFSET: u32 = 0x8000;

/// Errors raised while parsing or emitting a partition table.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// A row does not carry the expected minimum of fields.
    #[error("partition row {line}: expected `name, type, subtype, offset, size`")]
    MalformedRow {
        /// 1-based CSV line number.
        line: usize,
    },
    /// A numeric field failed to parse.
    #[error("partition row {line}: invalid literal {value:?} for {field}")]
    BadNumber {
        /// 1-based CSV line number.
        line: usize,
        /// Field name.
        field: &'static str,
        /// Offending text.
        value: String,
    },
    /// The first row has no offset to continue from.
    #[error("partition row {line}: first row must carry an explicit offset")]
    MissingInitialOffset {
        /// 1-based CSV line number.
        line: usize,
    },
    /// An app partition offset violates the flash mapping alignment.
    #[error("partition {name}: app offset {offset:#x} is not {APP_ALIGNMENT:#x}-aligned")]
    Misaligned {
        /// Partition name.
        name: String,
        /// Offending offset.
        offset: u32,
    },
    /// A partition label exceeds the 16-byte record field.
    #[error("partition name {0:?} exceeds 16 bytes")]
    NameTooLong(String),
}

/// Partition kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// Application image.
    App,
    /// Data partition.
    Data,
    /// Vendor-specific raw type byte.
    Custom(u8),
}

impl PartitionType {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "app" => Some(Self::App),
            "data" => Some(Self::Data),
            other => parse_number(other)
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .map(Self::Custom),
        }
    }

    const fn as_byte(self) -> u8 {
        match self {
            Self::App => 0x00,
            Self::Data => 0x01,
            Self::Custom(v) => v,
        }
    }
}

fn subtype_byte(partition_type: PartitionType, text: &str) -> Option<u8> {
    let named = match (partition_type, text) {
        (PartitionType::App, "factory") => Some(0x00),
        (PartitionType::App, "test") => Some(0x20),
        (PartitionType::Data, "ota") => Some(0x00),
        (PartitionType::Data, "phy") => Some(0x01),
        (PartitionType::Data, "nvs") => Some(0x02),
        (PartitionType::Data, "coredump") => Some(0x03),
        (PartitionType::Data, "nvs_keys") => Some(0x04),
        (PartitionType::Data, "fat") => Some(0x81),
        (PartitionType::Data, "spiffs") => Some(0x82),
        _ => None,
    };
    if named.is_some() {
        return named;
    }
    if let (PartitionType::App, Some(index)) = (partition_type, text.strip_prefix("ota_")) {
        return index.parse::<u8>().ok().and_then(|i| i.checked_add(0x10));
    }
    parse_number(text).ok().and_then(|v| u8::try_from(v).ok())
}

/// One parsed partition row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Partition label, at most 16 bytes.
    pub name: String,
    /// Partition kind.
    pub partition_type: PartitionType,
    /// Subtype byte.
    pub subtype: u8,
    /// Flash offset.
    pub offset: u32,
    /// Partition size in bytes.
    pub size: u32,
    /// Flags field (bit 0: encrypted).
    pub flags: u32,
}

/// Parse a `0x`-hex, decimal, or `K`/`M`-suffixed literal.
fn parse_number(text: &str) -> Result<u32, ()> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|_| ());
    }
    if let Some(kilo) = text.strip_suffix(['K', 'k']) {
        return kilo
            .parse::<u32>()
            .ok()
            .and_then(|v| v.checked_mul(1024))
            .ok_or(());
    }
    if let Some(mega) = text.strip_suffix(['M', 'm']) {
        return mega
            .parse::<u32>()
            .ok()
            .and_then(|v| v.checked_mul(1024 * 1024))
            .ok_or(());
    }
    text.parse::<u32>().map_err(|_| ())
}

fn parse_field(
    text: &str,
    line: usize,
    field: &'static str,
) -> Result<u32, PartitionError> {
    parse_number(text).map_err(|()| PartitionError::BadNumber {
        line,
        field,
        value: text.to_owned(),
    })
}

/// Parse a partition CSV, applying offset auto-continuation.
///
/// # Errors
///
/// Returns [`PartitionError`] for malformed rows, unparsable numbers, a
/// leading row without an offset, or misaligned app partitions.
pub fn parse_csv(csv: &str) -> Result<Vec<Partition>, PartitionError> {
    let mut partitions: Vec<Partition> = Vec::new();
    let mut next_offset: Option<u32> = None;

    for (index, raw) in csv.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.len() < 5 {
            return Err(PartitionError::MalformedRow { line });
        }
        let name = (*fields.first().ok_or(PartitionError::MalformedRow { line })?).to_owned();
        if name.len() > 16 {
            return Err(PartitionError::NameTooLong(name));
        }
        let type_text = fields.get(1).copied().unwrap_or_default();
        let partition_type =
            PartitionType::parse(type_text).ok_or_else(|| PartitionError::BadNumber {
                line,
                field: "type",
                value: type_text.to_owned(),
            })?;
        let subtype_text = fields.get(2).copied().unwrap_or_default();
        let subtype =
            subtype_byte(partition_type, subtype_text).ok_or_else(|| PartitionError::BadNumber {
                line,
                field: "subtype",
                value: subtype_text.to_owned(),
            })?;

        let offset_text = fields.get(3).copied().unwrap_or_default();
        let offset = if offset_text.is_empty() {
            next_offset.ok_or(PartitionError::MissingInitialOffset { line })?
        } else {
            parse_field(offset_text, line, "offset")?
        };
        let size = parse_field(fields.get(4).copied().unwrap_or_default(), line, "size")?;
        let flags_text = fields.get(5).copied().unwrap_or_default();
        let flags = if flags_text.is_empty() {
            0
        } else if flags_text == "encrypted" {
            1
        } else {
            parse_field(flags_text, line, "flags")?
        };

        if partition_type == PartitionType::App && offset % APP_ALIGNMENT != 0 {
            return Err(PartitionError::Misaligned { name, offset });
        }

        next_offset = offset.checked_add(size);
        partitions.push(Partition {
            name,
            partition_type,
            subtype,
            offset,
            size,
            flags,
        });
    }
    Ok(partitions)
}

/// Emit the 32-byte-record binary form of a parsed table.
#[must_use]
pub fn to_binary(partitions: &[Partition]) -> Vec<u8> {
    let mut out = Vec::with_capacity(partitions.len() * 32);
    for partition in partitions {
        out.extend_from_slice(&ENTRY_MAGIC);
        out.push(partition.partition_type.as_byte());
        out.push(partition.subtype);
        out.extend_from_slice(&partition.offset.to_le_bytes());
        out.extend_from_slice(&partition.size.to_le_bytes());
        let mut label = [0_u8; 16];
        for (slot, byte) in label.iter_mut().zip(partition.name.bytes()) {
            *slot = byte;
        }
        out.extend_from_slice(&label);
        out.extend_from_slice(&partition.flags.to_le_bytes());
    }
    out
}

/// Render a parsed table back to canonical CSV, used for diagnostics.
#[must_use]
pub fn to_csv(partitions: &[Partition]) -> String {
    let mut out = String::from("# name, type, subtype, offset, size, flags\n");
    for p in partitions {
        let type_text = match p.partition_type {
            PartitionType::App => "app".to_owned(),
            PartitionType::Data => "data".to_owned(),
            PartitionType::Custom(v) => format!("{v:#x}"),
        };
        let _ = writeln!(
            out,
            "{}, {}, {:#x}, {:#x}, {:#x}, {:#x}",
            p.name, type_text, p.subtype, p.offset, p.size, p.flags
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn offset_auto_continuation_uses_prior_offset_plus_size() {
        let csv = "\
# Name,   Type, SubType, Offset,  Size, Flags
nvs,      data, nvs,     0x9000,  0x5000,
app0,     app,  factory, 0x10000, 0x100000,
app1,     app,  ota_0,   ,        0x100000,
";
        let parts = parse_csv(csv).expect("parse");
        let app1 = parts.iter().find(|p| p.name == "app1").expect("app1");
        assert_eq!(app1.offset, 0x0011_0000);
    }

    #[rstest]
    fn first_row_requires_offset() {
        let csv = "nvs, data, nvs, , 0x5000,\n";
        assert!(matches!(
            parse_csv(csv),
            Err(PartitionError::MissingInitialOffset { line: 1 })
        ));
    }

    #[rstest]
    fn misaligned_app_offset_is_fatal() {
        let csv = "app0, app, factory, 0x9000, 0x100000,\n";
        assert!(matches!(
            parse_csv(csv),
            Err(PartitionError::Misaligned { .. })
        ));
    }

    #[rstest]
    #[case("0x5000", 0x5000)]
    #[case("20480", 20_480)]
    #[case("64K", 65_536)]
    #[case("1M", 1_048_576)]
    fn numeric_literals_parse(#[case] text: &str, #[case] expected: u32) {
        assert_eq!(parse_number(text), Ok(expected));
    }

    #[rstest]
    #[case("storage, 0x1FF, 0x00, 0x110000, 0x1000,\n", "type")]
    #[case("storage, data, 0x1FF, 0x110000, 0x1000,\n", "subtype")]
    fn oversized_type_bytes_are_rejected(#[case] csv: &str, #[case] field: &'static str) {
        match parse_csv(csv) {
            Err(PartitionError::BadNumber { field: got, value, .. }) => {
                assert_eq!(got, field);
                assert_eq!(value, "0x1FF");
            }
            other => panic!("expected a bad-number rejection, got {other:?}"),
        }
    }

    #[rstest]
    fn binary_records_are_32_bytes_little_endian() {
        let csv = "nvs, data, nvs, 0x9000, 0x5000,\n";
        let parts = parse_csv(csv).expect("parse");
        let bin = to_binary(&parts);
        assert_eq!(bin.len(), 32);
        assert_eq!(bin.get(..4), Some(&[0xAA, 0x50, 0x01, 0x02][..]));
        assert_eq!(bin.get(4..8), Some(&0x9000_u32.to_le_bytes()[..]));
        assert_eq!(bin.get(8..12), Some(&0x5000_u32.to_le_bytes()[..]));
    }
}
