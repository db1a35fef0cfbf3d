//! Bytecode transport decoding: base64, XOR 0x80, version sensing, and
//! version-appropriate decompression.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use jsvmd_isa::{OpcodeMap, Version};

use crate::lz77;
use crate::{Error, Result};

/// Decode a base64 bytecode payload down to the raw instruction stream.
pub fn decode(bytecode_b64: &str, map: &OpcodeMap) -> Result<(Vec<u8>, Version)> {
    let raw = STANDARD.decode(bytecode_b64.trim())?;
    decode_bytes(&raw, map)
}

/// Decode an already base64-decoded payload: XOR 0x80 each byte, sense the
/// wire-format family, and decompress as the family dictates.
///
/// V2 carries its compression flag in the *last* byte (0 = raw, 1 = LZ77);
/// V1 in the *first* (0 = raw, 1 = zlib). When both layouts look plausible
/// the decoder falls back to V1 and records a diagnostic.
pub fn decode_bytes(raw: &[u8], map: &OpcodeMap) -> Result<(Vec<u8>, Version)> {
    if raw.is_empty() {
        return Err(Error::Empty);
    }

    let unmasked: Vec<u8> = raw.iter().map(|b| b ^ 0x80).collect();

    let last = *unmasked.last().expect("non-empty");
    let first = unmasked[0];

    let v2_plausible = (last == 0 || last == 1)
        && plausible_opcode_start(&unmasked[..unmasked.len() - 1], map, last == 1);
    let v1_plausible = first == 0 || first == 1;

    if v2_plausible && v1_plausible {
        log::warn!("payload matches both V1 and V2 layouts; assuming V1");
    }

    if v2_plausible && !v1_plausible {
        let body = &unmasked[..unmasked.len() - 1];
        let bytes = if last == 1 {
            lz77::decompress(body)
        } else {
            body.to_vec()
        };
        return Ok((bytes, Version::V2Current));
    }

    if v1_plausible {
        let body = &unmasked[1..];
        let bytes = if first == 1 {
            let mut decoder = ZlibDecoder::new(body);
            let mut inflated = Vec::new();
            decoder.read_to_end(&mut inflated).map_err(Error::Zlib)?;
            inflated
        } else {
            body.to_vec()
        };
        return Ok((bytes, Version::V1Legacy));
    }

    // Neither flag layout matched; treat the whole blob as a raw V1 stream.
    log::warn!("no compression flag recognized; treating payload as raw V1");
    Ok((unmasked, Version::V1Legacy))
}

/// Heuristic used only to pick a version: the first byte must be a known
/// opcode, and at least 30% of the first twenty bytes must fall in the
/// legal opcode range. The disassembler is the authority once a version is
/// chosen.
fn plausible_opcode_start(body: &[u8], map: &OpcodeMap, compressed: bool) -> bool {
    if body.is_empty() {
        return false;
    }
    // A compressed body starts with an LZ77 flag byte, not an opcode; accept
    // on the flag position alone.
    if compressed {
        return true;
    }
    if !map.contains(body[0]) {
        return false;
    }
    let Some(max_raw) = map.max_raw() else {
        return false;
    };
    let window = &body[..body.len().min(20)];
    let hits = window.iter().filter(|b| **b <= max_raw).count();
    hits * 10 >= window.len() * 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use jsvmd_isa::Op;
    use std::io::Write;

    fn small_map() -> OpcodeMap {
        let mut map = OpcodeMap::new();
        map.insert(0x10, Op::PushInt);
        map.insert(0x11, Op::Add);
        map.set_return_opcode(0x12);
        map
    }

    fn mask(bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|b| b ^ 0x80).collect()
    }

    #[test]
    fn v1_raw_payload() {
        let stream = [0x10, 1, 0, 0, 0, 0x12, 1];
        let mut wire = vec![0x00];
        wire.extend_from_slice(&stream);
        let (bytes, version) = decode_bytes(&mask(&wire), &small_map()).unwrap();
        assert_eq!(version, Version::V1Legacy);
        assert_eq!(bytes, stream);
    }

    #[test]
    fn v1_zlib_payload() {
        let stream = [0x10, 2, 0, 0, 0, 0x12, 1];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&stream).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut wire = vec![0x01];
        wire.extend_from_slice(&compressed);
        let (bytes, version) = decode_bytes(&mask(&wire), &small_map()).unwrap();
        assert_eq!(version, Version::V1Legacy);
        assert_eq!(bytes, stream);
    }

    #[test]
    fn v2_raw_payload() {
        let stream = [0x10, 3, 0, 0, 0, 0x12, 1];
        let mut wire = stream.to_vec();
        wire.push(0x00);
        let (bytes, version) = decode_bytes(&mask(&wire), &small_map()).unwrap();
        assert_eq!(version, Version::V2Current);
        assert_eq!(bytes, stream);
    }

    #[test]
    fn v2_lz77_payload() {
        let stream = [0x10, 4, 0, 0, 0, 0x12, 1];
        // Hand-assembled LZ77: one full literal group, then the tail.
        let mut body = vec![0xFF];
        body.extend_from_slice(&stream[..7]);
        let mut wire = body;
        wire.push(0x01);
        let (bytes, version) = decode_bytes(&mask(&wire), &small_map()).unwrap();
        assert_eq!(version, Version::V2Current);
        assert_eq!(bytes, stream);
    }

    #[test]
    fn ambiguous_payload_falls_back_to_v1() {
        // First byte 0x00 reads as a V1 raw flag; last byte 0x01 reads as a
        // V2 LZ77 flag (accepted on flag position alone). V1 wins.
        let wire = [0x00, 0x10, 0x11, 0x01];
        let (bytes, version) = decode_bytes(&mask(&wire), &small_map()).unwrap();
        assert_eq!(version, Version::V1Legacy);
        assert_eq!(bytes, [0x10, 0x11, 0x01]);
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(matches!(decode_bytes(&[], &small_map()), Err(Error::Empty)));
    }

    #[test]
    fn base64_entry_point() {
        let stream = [0x10, 5, 0, 0, 0, 0x12, 1];
        let mut wire = vec![0x00];
        wire.extend_from_slice(&stream);
        let b64 = STANDARD.encode(mask(&wire));
        let (bytes, version) = decode(&b64, &small_map()).unwrap();
        assert_eq!(version, Version::V1Legacy);
        assert_eq!(bytes, stream);
    }

    #[test]
    fn bad_base64_propagates() {
        assert!(matches!(
            decode("!!not-base64!!", &small_map()),
            Err(Error::Base64(_))
        ));
    }
}
