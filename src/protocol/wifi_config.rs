//! WiFi-config (cmd 0x40) payload parser.
//!
//! The payload starts immediately after the frame header:
//!
//! ```text
//! [ntp:4 BE][ssid_len:1][ssid][bssid_len:1][bssid][pwd_len:1][pwd] ...
//! ```
//!
//! Two layouts follow the password field and are told apart by content,
//! not by the header version:
//!
//! - **Legacy**: `[uid_len:1][uid]`
//! - **Extended**: the password field itself ends with
//!   `0x00 0x1B domain 0x1B h m [0x1B] tz_code`, and any bytes after the
//!   password field are "append bytes": `0x1B uid` when a UID is bound.
//!
//! A locale field or append-bytes UID longer than its limit is dropped with a
//! warning; the credentials are still returned.

use super::ProtocolError;
use std::fmt;
use zeroize::Zeroizing;

/// Maximum SSID length in bytes.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum BSSID length in bytes.
pub const MAX_BSSID_LEN: usize = 6;

/// Maximum password field length in bytes (including any append string).
pub const MAX_PASSWORD_FIELD_LEN: usize = 64;

/// Maximum UID length in bytes.
pub const MAX_UID_LEN: usize = 32;

/// Maximum domain code length.
pub const MAX_DOMAIN_LEN: usize = 3;

/// Maximum timezone code length.
pub const MAX_TIMEZONE_CODE_LEN: usize = 7;

/// Separator used inside the extended layout.
const ESC: u8 = 0x1B;

/// Locale metadata smuggled inside the password field by newer peers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LocaleInfo {
    /// Cloud domain code ("0", "1", ...).
    pub domain: String,
    /// Timezone hour character (0-9, A-F, a-o).
    pub timezone_hour: char,
    /// Timezone minute-precision character (0-3).
    pub timezone_minute: char,
    /// Timezone code, e.g. "GMT+5".
    pub timezone_code: String,
}

/// Which historical payload layout a message used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLayout {
    /// Trailing length-prefixed UID field.
    Legacy,
    /// Locale metadata embedded in the password field.
    Extended(LocaleInfo),
}

/// A fully parsed WiFi-config command.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiConfigRecord {
    /// Timestamp carried through from the peer.
    pub ntp: u32,
    /// Network name.
    pub ssid: String,
    /// Raw BSSID bytes (0-6), empty when the peer did not pin an AP.
    pub bssid: Vec<u8>,
    /// Network password with any embedded append string removed.
    pub password: Zeroizing<String>,
    /// User identifier to bind the device to, if any.
    pub uid: Option<String>,
    /// Layout the payload was sent in.
    pub layout: PayloadLayout,
}

impl fmt::Debug for WifiConfigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiConfigRecord")
            .field("ntp", &self.ntp)
            .field("ssid", &self.ssid)
            .field("bssid", &self.bssid)
            .field("password", &format_args!("<{} bytes>", self.password.len()))
            .field("uid", &self.uid)
            .field("layout", &self.layout)
            .finish()
    }
}

impl WifiConfigRecord {
    /// Locale metadata, present only for the extended layout.
    pub fn locale(&self) -> Option<&LocaleInfo> {
        match &self.layout {
            PayloadLayout::Legacy => None,
            PayloadLayout::Extended(locale) => Some(locale),
        }
    }
}

/// Cursor over a payload buffer.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn read_u32_be(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self
            .data
            .get(self.offset..self.offset + 4)?
            .try_into()
            .ok()?;
        self.offset += 4;
        Some(u32::from_be_bytes(bytes))
    }

    /// Read a `[len:1][bytes]` field of at most `max` bytes.
    fn read_field(&mut self, field: &'static str, max: usize) -> Result<&'a [u8], ProtocolError> {
        let len = *self
            .data
            .get(self.offset)
            .ok_or(ProtocolError::TruncatedField { field })? as usize;
        let start = self.offset + 1;
        if len > max || start + len > self.data.len() {
            return Err(ProtocolError::TruncatedField { field });
        }
        self.offset = start + len;
        Ok(&self.data[start..start + len])
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }
}

/// Parse a WiFi-config payload (bytes after the frame header).
///
/// Either returns a fully populated record or an error; nothing is
/// partially filled in.
pub fn parse_wifi_config(payload: &[u8]) -> Result<WifiConfigRecord, ProtocolError> {
    let mut reader = Reader::new(payload);

    let ntp = reader
        .read_u32_be()
        .ok_or_else(|| ProtocolError::MalformedPayload("missing NTP timestamp".into()))?;
    let ssid = utf8("ssid", reader.read_field("ssid", MAX_SSID_LEN)?)?;
    let bssid = reader.read_field("bssid", MAX_BSSID_LEN)?.to_vec();
    let password_field = reader.read_field("password", MAX_PASSWORD_FIELD_LEN)?;

    let record = match find_append_marker(password_field) {
        None => {
            let password = Zeroizing::new(utf8("password", password_field)?);
            let uid = utf8("uid", reader.read_field("uid", MAX_UID_LEN)?)?;
            WifiConfigRecord {
                ntp,
                ssid,
                bssid,
                password,
                uid: (!uid.is_empty()).then_some(uid),
                layout: PayloadLayout::Legacy,
            }
        }
        Some(index) => {
            let password = Zeroizing::new(utf8("password", &password_field[..index])?);
            let locale = parse_append_string(&password_field[index + 2..])?;
            let uid = parse_append_bytes(reader.rest())?;
            WifiConfigRecord {
                ntp,
                ssid,
                bssid,
                password,
                uid,
                layout: PayloadLayout::Extended(locale),
            }
        }
    };

    log::debug!(
        "Parsed WiFi config: ssid={:?} bssid_len={} password_len={} uid={:?} extended={}",
        record.ssid,
        record.bssid.len(),
        record.password.len(),
        record.uid,
        record.locale().is_some()
    );
    Ok(record)
}

/// Index of the first `0x00 0x1B` pair inside the password field.
fn find_append_marker(password: &[u8]) -> Option<usize> {
    password.windows(2).position(|pair| pair == [0x00, ESC])
}

/// Parse `domain 0x1B h m [0x1B] tz_code`.
fn parse_append_string(bytes: &[u8]) -> Result<LocaleInfo, ProtocolError> {
    let domain_end = bytes
        .iter()
        .position(|&b| b == ESC)
        .ok_or_else(|| ProtocolError::MalformedPayload("unterminated domain".into()))?;
    let domain = fit_optional("domain", &bytes[..domain_end], MAX_DOMAIN_LEN);

    let rest = &bytes[domain_end + 1..];
    let [hour, minute, tail @ ..] = rest else {
        return Err(ProtocolError::MalformedPayload(
            "missing timezone characters".into(),
        ));
    };
    let code = match tail {
        [ESC, code @ ..] => code,
        code => code,
    };
    let code = fit_optional("timezone code", code, MAX_TIMEZONE_CODE_LEN);

    Ok(LocaleInfo {
        domain: utf8("domain", domain)?,
        timezone_hour: ascii_char("timezone hour", *hour)?,
        timezone_minute: ascii_char("timezone minute", *minute)?,
        timezone_code: utf8("timezone code", code)?,
    })
}

/// Parse the bytes trailing the password field in the extended layout.
fn parse_append_bytes(bytes: &[u8]) -> Result<Option<String>, ProtocolError> {
    match bytes {
        [ESC, uid @ ..] if !uid.is_empty() => {
            let uid = fit_optional("uid", uid, MAX_UID_LEN);
            (!uid.is_empty()).then(|| utf8("uid", uid)).transpose()
        }
        [] | [ESC] => Ok(None),
        [first, ..] => {
            log::debug!(
                "Ignoring {} append bytes without UID marker (first byte 0x{:02X})",
                bytes.len(),
                first
            );
            Ok(None)
        }
    }
}

/// Optional fields that do not fit are dropped; the credentials still apply.
fn fit_optional<'a>(field: &str, bytes: &'a [u8], max: usize) -> &'a [u8] {
    if bytes.len() > max {
        log::warn!(
            "Ignoring {}: {} bytes exceeds {} byte limit",
            field,
            bytes.len(),
            max
        );
        return &[];
    }
    bytes
}

fn utf8(field: &str, bytes: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::MalformedPayload(format!("{} is not valid UTF-8", field)))
}

fn ascii_char(field: &str, byte: u8) -> Result<char, ProtocolError> {
    if byte.is_ascii_graphic() {
        Ok(byte as char)
    } else {
        Err(ProtocolError::MalformedPayload(format!(
            "{} is not a printable character: 0x{:02X}",
            field, byte
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a payload with length-prefixed fields.
    pub(crate) fn build_payload(ntp: u32, fields: &[&[u8]], trailer: &[u8]) -> Vec<u8> {
        let mut payload = ntp.to_be_bytes().to_vec();
        for field in fields {
            payload.push(field.len() as u8);
            payload.extend_from_slice(field);
        }
        payload.extend_from_slice(trailer);
        payload
    }

    fn extended_password(password: &str, domain: &str, h: u8, m: u8, code: &str) -> Vec<u8> {
        let mut field = password.as_bytes().to_vec();
        field.extend_from_slice(&[0x00, ESC]);
        field.extend_from_slice(domain.as_bytes());
        field.push(ESC);
        field.push(h);
        field.push(m);
        field.push(ESC);
        field.extend_from_slice(code.as_bytes());
        field
    }

    // ==================== Legacy Layout Tests ====================

    #[test]
    fn test_legacy_parse() {
        let payload = build_payload(1, &[b"Home", b"", b"secret123", b"user42"], &[]);
        let record = parse_wifi_config(&payload).unwrap();

        assert_eq!(record.ntp, 1);
        assert_eq!(record.ssid, "Home");
        assert!(record.bssid.is_empty());
        assert_eq!(record.password.as_str(), "secret123");
        assert_eq!(record.uid.as_deref(), Some("user42"));
        assert_eq!(record.layout, PayloadLayout::Legacy);
    }

    #[test]
    fn test_legacy_empty_uid() {
        let payload = build_payload(7, &[b"Home", b"", b"secret123", b""], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.uid, None);
    }

    #[test]
    fn test_legacy_missing_uid_field() {
        let payload = build_payload(7, &[b"Home", b"", b"secret123"], &[]);
        assert_eq!(
            parse_wifi_config(&payload),
            Err(ProtocolError::TruncatedField { field: "uid" })
        );
    }

    #[test]
    fn test_legacy_with_bssid() {
        let bssid = [0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03];
        let payload = build_payload(0x01020304, &[b"Office", &bssid, b"pw", b"u"], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.ntp, 0x01020304);
        assert_eq!(record.bssid, bssid.to_vec());
        assert_eq!(record.password.as_str(), "pw");
    }

    #[test]
    fn test_single_byte_password_is_legacy() {
        let payload = build_payload(0, &[b"Net", b"", &[0x00], b"uid"], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.layout, PayloadLayout::Legacy);
        assert_eq!(record.uid.as_deref(), Some("uid"));
    }

    // ==================== Extended Layout Tests ====================

    #[test]
    fn test_extended_parse() {
        let password = extended_password("secret123", "0", b'5', b'E', "GMT+5");
        let mut trailer = vec![ESC];
        trailer.extend_from_slice(b"user99");
        let payload = build_payload(1, &[b"Home", b"", &password], &trailer);

        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.password.as_str(), "secret123");
        assert_eq!(record.uid.as_deref(), Some("user99"));
        let locale = record.locale().unwrap();
        assert_eq!(locale.domain, "0");
        assert_eq!(locale.timezone_hour, '5');
        assert_eq!(locale.timezone_minute, 'E');
        assert_eq!(locale.timezone_code, "GMT+5");
    }

    #[test]
    fn test_extended_without_uid() {
        let password = extended_password("pw", "12", b'8', b'0', "CST");
        let payload = build_payload(1, &[b"Home", b"", &password], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.uid, None);
        assert_eq!(record.locale().unwrap().domain, "12");
    }

    #[test]
    fn test_extended_append_bytes_without_marker() {
        let password = extended_password("pw", "1", b'8', b'0', "CST");
        let payload = build_payload(1, &[b"Home", b"", &password], b"junk");
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.uid, None);
    }

    #[test]
    fn test_extended_optional_separator_before_code() {
        let mut password = b"pw\x00\x1b1\x1b80".to_vec();
        password.extend_from_slice(b"UTC");
        let payload = build_payload(1, &[b"Home", b"", &password], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.locale().unwrap().timezone_code, "UTC");
    }

    #[test]
    fn test_extended_empty_password() {
        let password = extended_password("", "0", b'0', b'0', "");
        let payload = build_payload(1, &[b"Open", b"", &password], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert!(record.password.is_empty());
        assert_eq!(record.locale().unwrap().timezone_code, "");
    }

    #[test]
    fn test_extended_missing_timezone() {
        let password = b"pw\x00\x1b0\x1b5".to_vec();
        let payload = build_payload(1, &[b"Home", b"", &password], &[]);
        assert!(matches!(
            parse_wifi_config(&payload),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_extended_unterminated_domain() {
        let password = b"pw\x00\x1b0".to_vec();
        let payload = build_payload(1, &[b"Home", b"", &password], &[]);
        assert!(matches!(
            parse_wifi_config(&payload),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_extended_uid_too_long_is_dropped() {
        let password = extended_password("pw", "0", b'5', b'E', "GMT");
        let mut trailer = vec![ESC];
        trailer.extend_from_slice(&[b'u'; 33]);
        let payload = build_payload(1, &[b"Home", b"", &password], &trailer);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.ssid, "Home");
        assert_eq!(record.password.as_str(), "pw");
        assert_eq!(record.uid, None);
        assert_eq!(record.locale().unwrap().timezone_code, "GMT");
    }

    #[test]
    fn test_extended_domain_too_long_is_dropped() {
        let password = extended_password("pw", "1234", b'5', b'E', "GMT+5");
        let payload = build_payload(1, &[b"Home", b"", &password], b"\x1buser1");
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.password.as_str(), "pw");
        assert_eq!(record.uid.as_deref(), Some("user1"));
        let locale = record.locale().unwrap();
        assert_eq!(locale.domain, "");
        assert_eq!(locale.timezone_hour, '5');
        assert_eq!(locale.timezone_code, "GMT+5");
    }

    #[test]
    fn test_extended_timezone_code_too_long_is_dropped() {
        let password = extended_password("pw", "0", b'5', b'E', "GMT+05:30");
        let payload = build_payload(1, &[b"Home", b"", &password], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        assert_eq!(record.password.as_str(), "pw");
        let locale = record.locale().unwrap();
        assert_eq!(locale.domain, "0");
        assert_eq!(locale.timezone_code, "");
    }

    // ==================== Bounds Tests ====================

    #[test]
    fn test_missing_ntp() {
        assert!(matches!(
            parse_wifi_config(&[0, 0, 1]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_ssid_length_exceeds_payload() {
        let mut payload = 0u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[10, b'a', b'b']);
        assert_eq!(
            parse_wifi_config(&payload),
            Err(ProtocolError::TruncatedField { field: "ssid" })
        );
    }

    #[test]
    fn test_ssid_length_exceeds_max() {
        let ssid = [b'a'; 33];
        let payload = build_payload(0, &[&ssid, b"", b"pw", b""], &[]);
        assert_eq!(
            parse_wifi_config(&payload),
            Err(ProtocolError::TruncatedField { field: "ssid" })
        );
    }

    #[test]
    fn test_bssid_length_exceeds_max() {
        let payload = build_payload(0, &[b"Net", &[0u8; 7], b"pw", b""], &[]);
        assert_eq!(
            parse_wifi_config(&payload),
            Err(ProtocolError::TruncatedField { field: "bssid" })
        );
    }

    #[test]
    fn test_password_field_max() {
        let password = [b'p'; 64];
        let payload = build_payload(0, &[b"Net", b"", &password, b""], &[]);
        assert_eq!(parse_wifi_config(&payload).unwrap().password.len(), 64);

        let password = [b'p'; 65];
        let payload = build_payload(0, &[b"Net", b"", &password, b""], &[]);
        assert_eq!(
            parse_wifi_config(&payload),
            Err(ProtocolError::TruncatedField { field: "password" })
        );
    }

    #[test]
    fn test_invalid_utf8_ssid() {
        let payload = build_payload(0, &[&[0xFF, 0xFE], b"", b"pw", b""], &[]);
        assert!(matches!(
            parse_wifi_config(&payload),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let payload = build_payload(1, &[b"Home", b"", b"secret123", b"user42"], &[]);
        let record = parse_wifi_config(&payload).unwrap();
        let debug = format!("{:?}", record);
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("<9 bytes>"));
    }
}
