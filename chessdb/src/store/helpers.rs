//! Shared encode/decode helpers for SQLite ↔ domain type conversions.

use std::time::{SystemTime, UNIX_EPOCH};

use chess::PieceColor;

/// SQLite integers are signed; fingerprints are stored bit-for-bit.
pub fn encode_fingerprint(fingerprint: u64) -> i64 {
    fingerprint as i64
}

pub fn decode_fingerprint(value: i64) -> u64 {
    value as u64
}

/// Encode a side to move as its FEN letter, matching the schema CHECK.
pub fn encode_side(side: PieceColor) -> &'static str {
    match side {
        PieceColor::White => "w",
        PieceColor::Black => "b",
    }
}

/// Seconds since the Unix epoch.
pub fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_keeps_high_bit() {
        for value in [0u64, 1, u64::MAX, 1 << 63, 0xdead_beef_cafe_f00d] {
            assert_eq!(decode_fingerprint(encode_fingerprint(value)), value);
        }
        assert!(encode_fingerprint(u64::MAX) < 0);
    }

    #[test]
    fn side_letters() {
        assert_eq!(encode_side(PieceColor::Black), "b");
        assert_eq!(encode_side(PieceColor::White), "w");
    }
}
