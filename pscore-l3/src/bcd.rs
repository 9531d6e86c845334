//! Telephony BCD digit strings (TS 24.008 10.5.1.4, 10.5.4.7).
//!
//! Digits are packed two per octet, low nibble first. An odd digit count
//! is completed with the `0xF` filler in the high nibble of the last
//! octet. Nibbles 0xA to 0xE carry the extended characters `*#abc`.

use thiserror::Error;

const ALPHABET: &[u8; 15] = b"0123456789*#abc";
const FILLER: u8 = 0x0F;

/// BCD conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcdError {
    /// Character outside the BCD alphabet
    #[error("Invalid BCD character {0:?}")]
    InvalidDigit(char),

    /// Filler nibble before the end of the string
    #[error("Filler nibble at digit position {0}")]
    MisplacedFiller(usize),
}

fn nibble(c: char) -> Result<u8, BcdError> {
    ALPHABET
        .iter()
        .position(|&a| char::from(a) == c.to_ascii_lowercase())
        .map(|p| p as u8)
        .ok_or(BcdError::InvalidDigit(c))
}

/// Packs a digit string into BCD octets.
///
/// # Example
/// ```
/// use pscore_l3::bcd::encode_bcd;
///
/// assert_eq!(encode_bcd("12345").unwrap(), vec![0x21, 0x43, 0xF5]);
/// ```
pub fn encode_bcd(digits: &str) -> Result<Vec<u8>, BcdError> {
    let nibbles = digits.chars().map(nibble).collect::<Result<Vec<_>, _>>()?;
    Ok(nibbles
        .chunks(2)
        .map(|pair| {
            let high = pair.get(1).copied().unwrap_or(FILLER);
            (high << 4) | pair[0]
        })
        .collect())
}

/// Unpacks BCD octets into a digit string.
///
/// The filler is accepted only as the final nibble (or as both nibbles of
/// the final octet).
pub fn decode_bcd(data: &[u8]) -> Result<String, BcdError> {
    let mut out = String::with_capacity(data.len() * 2);
    let last = data.len().saturating_sub(1);
    for (i, &octet) in data.iter().enumerate() {
        for (half, value) in [(0, octet & 0x0F), (1, octet >> 4)] {
            if value == FILLER {
                let rest_is_filler = half == 1 || octet >> 4 == FILLER;
                if i == last && rest_is_filler {
                    return Ok(out);
                }
                return Err(BcdError::MisplacedFiller(2 * i + half));
            }
            out.push(char::from(ALPHABET[value as usize]));
        }
    }
    Ok(out)
}
