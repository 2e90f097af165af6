//! Piece serialization: JSON, CSV and plain text.
//!
//! ```text
//! JSON  {"pieceNum":1,"version":"0.1.0","keypairs":[{"ticker":"BTC",...}]}
//!
//! CSV   TICKER,PUBLIC_ADDRESS,PRIVATE_WIF,ENCRYPTION,SHARE_NUM
//!       BTC,1HZw...,5HueCGU8...,NONE,null
//!
//! TXT   ===== #1 Bitcoin =====
//!       Public Address:
//!       1HZw...
//!       Private Key (unencrypted):
//!       5HueCGU8...
//! ```
//!
//! CSV readers also accept `PRIVATE_HEX` and `MIN_SHARES` columns, which are
//! never written. Empty cells and the literal `null` both mean "no value".

use serde::{Deserialize, Serialize};

use super::Piece;
use crate::crypto::EncryptionScheme;
use crate::error::{Error, Result};
use crate::key::Keypair;
use crate::plugin::PluginRegistry;

// ============================================================================
// OPTIONS
// ============================================================================

/// Which halves of each keypair CSV and text exports include
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Include public addresses
    pub include_public: bool,
    /// Include private keys
    pub include_private: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_public: true,
            include_private: true,
        }
    }
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PieceRecord {
    piece_num: Option<u8>,
    #[serde(default)]
    version: String,
    keypairs: Vec<KeypairRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeypairRecord {
    ticker: String,
    address: Option<String>,
    wif: String,
    encryption: Option<EncryptionScheme>,
    share_num: Option<u8>,
}

impl KeypairRecord {
    fn from_keypair(keypair: &Keypair) -> Self {
        Self {
            ticker: keypair.ticker().to_string(),
            address: keypair.address().map(str::to_string),
            wif: keypair.private_wif().to_string(),
            encryption: keypair.encryption(),
            share_num: keypair.share_num(),
        }
    }
}

/// Rebuild one keypair from its exported fields, checking the declared
/// encryption against what the key string actually is
fn import_keypair(
    registry: &PluginRegistry,
    ticker: &str,
    key: &str,
    address: Option<&str>,
    encryption: Option<Option<EncryptionScheme>>,
    share_num: Option<u8>,
) -> Result<Keypair> {
    let plugin = registry.get(ticker)?;
    let mut keypair = match address.filter(|a| !a.is_empty()) {
        Some(address) => Keypair::with_address(plugin, key, address)?,
        None => Keypair::new(plugin, key)?,
    };
    if let Some(declared) = encryption {
        if declared != keypair.encryption() {
            return Err(Error::DecodeError(format!(
                "{} key does not match its declared encryption",
                ticker
            )));
        }
    }
    keypair.set_share_num(share_num);
    Ok(keypair)
}

impl Piece {
    fn to_record(&self) -> PieceRecord {
        PieceRecord {
            piece_num: self.piece_num,
            version: crate::version().to_string(),
            keypairs: self.keypairs.iter().map(KeypairRecord::from_keypair).collect(),
        }
    }

    /// Export as a JSON value
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.to_record()).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Export as compact JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.to_record()).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Import from JSON produced by [`Self::to_json`]
    pub fn from_json(json: &str, registry: &PluginRegistry) -> Result<Self> {
        let record: PieceRecord =
            serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))?;
        let keypairs = record
            .keypairs
            .iter()
            .map(|kp| {
                import_keypair(
                    registry,
                    &kp.ticker,
                    &kp.wif,
                    kp.address.as_deref(),
                    Some(kp.encryption),
                    kp.share_num,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Imported piece of {} keypairs from JSON", keypairs.len());
        Piece::new(keypairs, record.piece_num)
    }

    // ========================================================================
    // CSV
    // ========================================================================

    /// Export as CSV, one row per keypair
    pub fn to_csv(&self, options: ExportOptions) -> String {
        let mut header = vec![COL_TICKER];
        if options.include_public {
            header.push(COL_ADDRESS);
        }
        if options.include_private {
            header.push(COL_WIF);
        }
        header.extend([COL_ENCRYPTION, COL_SHARE_NUM]);

        let mut lines = vec![header.join(",")];
        for keypair in &self.keypairs {
            let mut row = vec![keypair.ticker().to_string()];
            if options.include_public {
                row.push(keypair.address().unwrap_or_default().to_string());
            }
            if options.include_private {
                row.push(keypair.private_wif().to_string());
            }
            row.push(
                keypair
                    .encryption()
                    .map_or_else(|| NULL.to_string(), |s| s.as_str().to_string()),
            );
            row.push(
                keypair
                    .share_num()
                    .map_or_else(|| NULL.to_string(), |n| n.to_string()),
            );
            lines.push(row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","));
        }
        lines.join("\n")
    }

    /// Import from CSV.
    ///
    /// Needs a `TICKER` column and a `PRIVATE_WIF` or `PRIVATE_HEX` column.
    pub fn from_csv(csv: &str, registry: &PluginRegistry) -> Result<Self> {
        let mut rows = csv
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_csv_line);
        let header = rows
            .next()
            .ok_or_else(|| Error::InvalidPiece("empty CSV".into()))??;
        let columns = CsvColumns::from_header(&header)?;

        let keypairs = rows
            .map(|row| columns.keypair(&row?, registry))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Imported piece of {} keypairs from CSV", keypairs.len());
        Piece::new(keypairs, None)
    }

    // ========================================================================
    // TEXT
    // ========================================================================

    /// Human-readable text export
    pub fn to_txt(&self, options: ExportOptions) -> String {
        let state = if self.is_split() {
            "split"
        } else if self.is_encrypted() == Some(true) {
            "encrypted"
        } else {
            "unencrypted"
        };

        let blocks: Vec<String> = self
            .keypairs
            .iter()
            .enumerate()
            .map(|(i, keypair)| {
                let plugin = keypair.plugin();
                let mut lines = vec![format!("===== #{} {} =====", i + 1, plugin.name())];
                if options.include_public {
                    if let Some(address) = keypair.address() {
                        lines.push(format!("Public Address:\n{}", address));
                    }
                }
                if options.include_private {
                    lines.push(format!(
                        "{} ({}):\n{}",
                        plugin.private_label(),
                        state,
                        keypair.private_wif()
                    ));
                }
                lines.join("\n")
            })
            .collect();
        blocks.join("\n\n").trim().to_string()
    }
}

// ============================================================================
// CSV HELPERS
// ============================================================================

const COL_TICKER: &str = "TICKER";
const COL_ADDRESS: &str = "PUBLIC_ADDRESS";
const COL_WIF: &str = "PRIVATE_WIF";
const COL_HEX: &str = "PRIVATE_HEX";
const COL_ENCRYPTION: &str = "ENCRYPTION";
const COL_MIN_SHARES: &str = "MIN_SHARES";
const COL_SHARE_NUM: &str = "SHARE_NUM";

const NULL: &str = "null";

/// Column positions found in a CSV header
struct CsvColumns {
    width: usize,
    ticker: usize,
    address: Option<usize>,
    wif: Option<usize>,
    hex: Option<usize>,
    encryption: Option<usize>,
    min_shares: Option<usize>,
    share_num: Option<usize>,
}

impl CsvColumns {
    fn from_header(header: &[String]) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let columns = Self {
            width: header.len(),
            ticker: find(COL_TICKER)
                .ok_or_else(|| Error::InvalidPiece("CSV has no TICKER column".into()))?,
            address: find(COL_ADDRESS),
            wif: find(COL_WIF),
            hex: find(COL_HEX),
            encryption: find(COL_ENCRYPTION),
            min_shares: find(COL_MIN_SHARES),
            share_num: find(COL_SHARE_NUM),
        };
        if columns.wif.is_none() && columns.hex.is_none() {
            return Err(Error::InvalidPiece("CSV has no private key column".into()));
        }
        Ok(columns)
    }

    fn keypair(&self, row: &[String], registry: &PluginRegistry) -> Result<Keypair> {
        if row.len() != self.width {
            return Err(Error::InvalidPiece(format!(
                "CSV row has {} fields, header has {}",
                row.len(),
                self.width
            )));
        }
        let cell = |index: Option<usize>| index.and_then(|i| value(&row[i]));

        let ticker = value(&row[self.ticker])
            .ok_or_else(|| Error::InvalidPiece("CSV row has no ticker".into()))?;
        let key = cell(self.wif)
            .or_else(|| cell(self.hex))
            .ok_or_else(|| Error::InvalidPiece(format!("{} row has no private key", ticker)))?;
        // A present column with an empty cell means the key is a share
        let encryption = match self.encryption {
            Some(i) => Some(match value(&row[i]) {
                Some(name) => Some(name.parse::<EncryptionScheme>()?),
                None => None,
            }),
            None => None,
        };
        let share_num = cell(self.share_num).map(parse_number).transpose()?;

        let keypair = import_keypair(registry, ticker, key, cell(self.address), encryption, share_num)?;

        if let Some(min_shares) = cell(self.min_shares).map(parse_number).transpose()? {
            if keypair.min_shares() != Some(min_shares) {
                return Err(Error::DecodeError(format!(
                    "{} key does not match its declared share threshold",
                    ticker
                )));
            }
        }
        Ok(keypair)
    }
}

/// Cell contents, or `None` for the empty and `null` sentinels
fn value(cell: &str) -> Option<&str> {
    let cell = cell.trim();
    if cell.is_empty() || cell == NULL {
        None
    } else {
        Some(cell)
    }
}

fn parse_number(cell: &str) -> Result<u8> {
    cell.parse()
        .map_err(|_| Error::InvalidPiece(format!("not a share number: {}", cell)))
}

/// Quote a field when it holds a separator or quote
fn csv_field(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line, honoring double-quoted fields
fn parse_csv_line(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    if quoted {
        return Err(Error::InvalidPiece("unterminated quote in CSV".into()));
    }
    fields.push(field);
    Ok(fields)
}

// ============================================================================
// TESTS
// ============================================================================
