//! Room identity: the human-shareable code and everything derived from it.
//!
//! A room code looks like `abc-def#1234`. The letters before `#` (the
//! connect segment) name the sender's endpoint; the PIN after `#` (the key
//! segment) becomes the single-byte obfuscation key. Both peers derive the
//! same values independently from the same text; nothing is negotiated.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use rand::Rng;

use crate::constants::{MISSING_PIN_SOURCE, ROOM_NAMESPACE};

/// Characters used when generating codes (no `0/o`, `1/l/i`).
pub const CODE_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

/// Query parameter that carries a room code in a share link.
pub const SHARE_LINK_PARAM: &str = "room";

/// Unreserved URL characters stay literal; everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

const GROUP_LEN: usize = 3;
const PIN_MIN: u16 = 1000;
const PIN_MAX: u16 = 9999;

/// Errors produced while reading a room code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    #[error("invalid room code {0:?}: expected xxx-xxx#nnnn")]
    InvalidFormat(String),

    #[error("share link has no `{SHARE_LINK_PARAM}` parameter")]
    MissingLinkParam,
}

/// A validated room code (`xxx-yyy#pppp`), normalized to lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode {
    /// Connect segment including the dash, e.g. `abc-def`.
    connect: String,
    pin: u16,
}

impl RoomCode {
    /// Generates a fresh code from the thread-local RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generates a fresh code from the given RNG.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut pick = || CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char;
        let first: String = (0..GROUP_LEN).map(|_| pick()).collect();
        let second: String = (0..GROUP_LEN).map(|_| pick()).collect();
        let pin = rng.gen_range(PIN_MIN..=PIN_MAX);
        Self {
            connect: format!("{first}-{second}"),
            pin,
        }
    }

    /// Parses `^[a-z0-9]{3}-[a-z0-9]{3}#[0-9]{4}$`, case-insensitively.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let normalized = input.trim().to_ascii_lowercase();
        let invalid = || RoomCodeError::InvalidFormat(input.to_string());

        let (connect, pin) = normalized.split_once('#').ok_or_else(invalid)?;
        let (first, second) = connect.split_once('-').ok_or_else(invalid)?;

        let group_ok = |g: &str| {
            g.len() == GROUP_LEN && g.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        };
        if !group_ok(first) || !group_ok(second) {
            return Err(invalid());
        }
        if pin.len() != 4 || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let pin: u16 = pin.parse().map_err(|_| invalid())?;

        Ok(Self {
            connect: connect.to_string(),
            pin,
        })
    }

    /// Accepts either a bare code or a share link carrying one.
    pub fn from_input(input: &str) -> Result<Self, RoomCodeError> {
        let trimmed = input.trim();
        if trimmed.contains('?') {
            Self::from_share_link(trimmed)
        } else {
            Self::parse(trimmed)
        }
    }

    /// Extracts the code from the `room` query parameter of a link.
    pub fn from_share_link(link: &str) -> Result<Self, RoomCodeError> {
        let query = link
            .split_once('?')
            .map(|(_, q)| q)
            .ok_or(RoomCodeError::MissingLinkParam)?;
        let value = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == SHARE_LINK_PARAM)
            .map(|(_, v)| v)
            .ok_or(RoomCodeError::MissingLinkParam)?;
        let decoded = percent_decode_str(value).decode_utf8_lossy();
        Self::parse(&decoded)
    }

    /// Builds a link that carries this code as a query parameter.
    pub fn share_link(&self, base: &str) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        let code = self.to_string();
        format!(
            "{base}{sep}{SHARE_LINK_PARAM}={}",
            utf8_percent_encode(&code, QUERY_VALUE)
        )
    }

    /// Connect segment including the dash.
    pub fn connect_segment(&self) -> &str {
        &self.connect
    }

    pub fn pin(&self) -> u16 {
        self.pin
    }

    /// Network identity the sender listens on.
    pub fn connect_id(&self) -> String {
        derive_connect_id(&self.to_string())
    }

    /// Single-byte obfuscation key.
    pub fn key(&self) -> u8 {
        derive_key(&self.to_string())
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:04}", self.connect, self.pin)
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Derives the network identity for a room code.
///
/// Drops the PIN and the separator, lower-cases, keeps only ASCII
/// alphanumerics, and prefixes [`ROOM_NAMESPACE`]. Pure.
pub fn derive_connect_id(code: &str) -> String {
    let connect = code.split_once('#').map_or(code, |(c, _)| c);
    let cleaned: String = connect
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{ROOM_NAMESPACE}{cleaned}")
}

/// Derives the obfuscation key for a room code.
///
/// Reads the leading decimal digits after `#`. A missing `#` or a PIN
/// that does not start with a digit falls back to [`MISSING_PIN_SOURCE`],
/// which reduces to key 0. Pure.
pub fn derive_key(code: &str) -> u8 {
    let source = code
        .split_once('#')
        .and_then(|(_, pin)| leading_digits_mod_256(pin.trim_start()))
        .unwrap_or(MISSING_PIN_SOURCE % 256);
    (source % 256) as u8
}

/// Value of the leading digit run reduced modulo 256, or `None` if the
/// text does not start with a digit.
fn leading_digits_mod_256(text: &str) -> Option<u32> {
    let mut seen = false;
    let mut acc: u32 = 0;
    for b in text.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        seen = true;
        acc = (acc * 10 + u32::from(b - b'0')) % 256;
    }
    seen.then_some(acc)
}
