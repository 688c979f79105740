//! Webhook signature verification.
//!
//! Smartpay signs webhook deliveries with HMAC-SHA256 over
//! `"{timestamp}.{raw body}"`. The HMAC key is the signing secret decoded
//! from base62 (`A-Za-z0-9`, big-endian positional value).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Value of a base62 symbol: `A-Z` -> 0..=25, `a-z` -> 26..=51, `0-9` -> 52..=61.
fn symbol_value(symbol: u8) -> Option<u32> {
    match symbol {
        b'A'..=b'Z' => Some(u32::from(symbol - b'A')),
        b'a'..=b'z' => Some(u32::from(symbol - b'a') + 26),
        b'0'..=b'9' => Some(u32::from(symbol - b'0') + 52),
        _ => None,
    }
}

/// Decodes a base62 string into the big-endian bytes of its positional value.
/// Returns `None` for an empty input or any symbol outside the alphabet.
pub fn base62_decode(input: &str) -> Option<Vec<u8>> {
    if input.is_empty() {
        return None;
    }

    let mut out: Vec<u8> = vec![0];
    for &symbol in input.as_bytes() {
        let mut carry = symbol_value(symbol)?;
        for byte in out.iter_mut().rev() {
            let acc = u32::from(*byte) * 62 + carry;
            *byte = (acc & 0xff) as u8;
            carry = acc >> 8;
        }
        while carry > 0 {
            out.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    Some(out)
}

/// Verifies a webhook signature against the raw request body.
///
/// The comparison is constant-time; header presence and subscription-id
/// checks happen in the caller before any signature work.
pub fn verify(secret: &str, signature: &str, timestamp: &str, raw_body: &[u8]) -> bool {
    let Some(key) = base62_decode(secret) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(&key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
