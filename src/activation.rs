//! Subscription activation codes.
//!
//! A code is `"{months}-{HASH}"` where `HASH` is six uppercase hex digits of a
//! 32-bit rolling hash over `device_id ++ months ++ SECRET`. The secret ships
//! with every client, so anyone who reads it can mint codes; the scheme only
//! keeps honest users honest. Changing `SECRET` or the hash invalidates every
//! code already handed out.

use chrono::{DateTime, Months, Utc};
use rand::Rng;

const SECRET: &str = "STREAMGENIUS_SECRET";
const HASH_LEN: usize = 6;
const DEVICE_ID_LEN: usize = 8;
const DEVICE_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Durations offered by the admin code generator
pub const PLAN_MONTHS: [u32; 3] = [1, 6, 12];

/// Result of checking a code against a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub months: Option<u32>,
}

impl Validation {
    fn invalid() -> Self {
        Self {
            valid: false,
            months: None,
        }
    }
}

/// Polynomial rolling hash (`h = h * 31 + unit`) over UTF-16 code units,
/// wrapping in a signed 32-bit accumulator.
pub fn rolling_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

fn short_hash(input: &str) -> String {
    // widen before abs so i32::MIN maps to 80000000 instead of overflowing
    let magnitude = (rolling_hash(input) as i64).unsigned_abs();
    let hex = format!("{:x}", magnitude);
    hex.chars().take(HASH_LEN).collect::<String>().to_uppercase()
}

fn code_hash(device_id: &str, months: u32) -> String {
    short_hash(&format!("{}{}{}", device_id, months, SECRET))
}

/// Issue a code unlocking `months` of subscription on `device_id`.
/// Returns `None` for zero months, which `validate` would never accept.
pub fn generate(device_id: &str, months: u32) -> Option<String> {
    if months == 0 {
        return None;
    }
    Some(format!("{}-{}", months, code_hash(device_id.trim(), months)))
}

/// Check a user-entered code against this device.
/// Surrounding whitespace is ignored; the hash must match exactly, uppercase.
/// Malformed input is reported as invalid, never as an error.
pub fn validate(code: &str, device_id: &str) -> Validation {
    let Some((months_part, hash_part)) = code.trim().split_once('-') else {
        return Validation::invalid();
    };
    let months_part = months_part.trim();
    if months_part.is_empty() || !months_part.bytes().all(|b| b.is_ascii_digit()) {
        return Validation::invalid();
    }
    let months: u32 = match months_part.parse() {
        Ok(m) if m > 0 => m,
        _ => return Validation::invalid(),
    };
    let expected = code_hash(device_id.trim(), months);
    if hash_part.trim() == expected {
        Validation {
            valid: true,
            months: Some(months),
        }
    } else {
        Validation::invalid()
    }
}

/// Fresh random device identifier (8 uppercase base-36 characters)
pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    (0..DEVICE_ID_LEN)
        .map(|_| DEVICE_ID_ALPHABET[rng.gen_range(0..DEVICE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Subscription state derived from the stored expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub active: bool,
    pub expiry: Option<DateTime<Utc>>,
}

impl SubscriptionStatus {
    pub fn at(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            active: expiry.map(|e| now <= e).unwrap_or(false),
            expiry,
        }
    }
}

/// Expiry of a subscription of `months` calendar months starting at `now`
pub fn expiry_after(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
