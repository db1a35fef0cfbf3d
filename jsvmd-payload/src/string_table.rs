//! Decoder for the obfuscator's auxiliary string table.
//!
//! Wire layout: repeating `{length: u32 LE, code_units: length x u16 LE}`
//! records, each code unit XOR-masked with 0x0080. Decoding stops at end of
//! stream, or early when a length would overrun the buffer.

use byteorder::{ByteOrder, LittleEndian};

pub fn decode(data: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut pos = 0usize;

    while pos + 4 <= data.len() {
        let len = LittleEndian::read_u32(&data[pos..]) as usize;
        pos += 4;

        let Some(byte_len) = len.checked_mul(2) else {
            break;
        };
        if pos + byte_len > data.len() {
            break;
        }

        let mut units = Vec::with_capacity(len);
        for i in 0..len {
            let unit = LittleEndian::read_u16(&data[pos + i * 2..]);
            units.push(unit ^ 0x0080);
        }
        pos += byte_len;

        strings.push(String::from_utf16_lossy(&units));
    }

    strings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(strings: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for s in strings {
            let units: Vec<u16> = s.encode_utf16().collect();
            let mut buf = [0u8; 4];
            LittleEndian::write_u32(&mut buf, units.len() as u32);
            out.extend_from_slice(&buf);
            for unit in units {
                let mut b = [0u8; 2];
                LittleEndian::write_u16(&mut b, unit ^ 0x0080);
                out.extend_from_slice(&b);
            }
        }
        out
    }

    #[test]
    fn decode_is_inverse_of_trivial_encoder() {
        let table = ["hello", "", "console", "\u{4e16}\u{754c}"];
        let encoded = encode(&table);
        let decoded = decode(&encoded);
        assert_eq!(decoded, table);
    }

    #[test]
    fn overrun_length_stops_gracefully() {
        let mut encoded = encode(&["ok"]);
        // A record claiming far more units than remain.
        encoded.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0x00]);
        encoded.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(decode(&encoded), vec!["ok"]);
    }

    #[test]
    fn trailing_partial_length_ignored() {
        let mut encoded = encode(&["x"]);
        encoded.extend_from_slice(&[0x02, 0x00]); // half a length field
        assert_eq!(decode(&encoded), vec!["x"]);
    }

    #[test]
    fn empty_input_yields_empty_table() {
        assert!(decode(&[]).is_empty());
    }
}
