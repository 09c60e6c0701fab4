//! CRC-16 checksum used in the frame trailer.
//!
//! Polynomial 0x1021, initial value 0xFFFF, MSB-first, no reflection,
//! no final XOR (the CCITT-FALSE parameter set).

/// Generator polynomial.
pub const CRC16_POLY: u16 = 0x1021;

/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Compute the CRC-16 of `data`.
///
/// # Example
///
/// ```
/// use framelink::protocol::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0x29B1);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(CRC16_INIT, data)
}

/// Continue a CRC computation over another chunk.
///
/// `crc16_update(crc16(a), b) == crc16(a ‖ b)`, which lets the encoder
/// checksum the header and payload without concatenating them.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(crc16(&[]), CRC16_INIT);
    }

    #[test]
    fn test_update_matches_one_shot() {
        let data = b"version+length+payload";
        let (a, b) = data.split_at(7);
        assert_eq!(crc16_update(crc16(a), b), crc16(data));
    }

    #[test]
    fn test_single_bit_flip_changes_crc() {
        // version | length | payload, as the frame encoder checksums it
        let mut data = vec![0x01, 0x00, 0x05];
        data.extend_from_slice(b"hello");
        let original = crc16(&data);

        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(
                    crc16(&flipped),
                    original,
                    "flip of byte {} bit {} went undetected",
                    byte,
                    bit
                );
            }
        }
    }
}
