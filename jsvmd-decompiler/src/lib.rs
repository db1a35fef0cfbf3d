//! Decompiler core: disassembly, region-driven symbolic lifting, and
//! source emission.
//!
//! The crate consumes what the payload extraction boundary hands over (the
//! transported bytecode, the string-table bytes, and a fingerprinted
//! [`OpcodeMap`]) and produces reconstructed source text. Failures stay
//! local wherever possible: unknown opcodes and per-instruction lifter
//! errors become inline comments, and only transport-level problems
//! propagate as errors.

pub mod disasm;
pub mod emit;
pub mod lift;
pub mod listing;

pub use disasm::disassemble;

use jsvmd_isa::{OpcodeMap, SwappedOpcodes, Version};

/// Decompile a transported payload: base64 bytecode text plus the raw
/// string-table bytes.
pub fn decompile(
    bytecode_b64: &str,
    string_table: &[u8],
    map: &OpcodeMap,
    swapped: &SwappedOpcodes,
) -> Result<String, jsvmd_payload::Error> {
    let strings = jsvmd_payload::string_table::decode(string_table);
    let (bytes, version) = jsvmd_payload::transport::decode(bytecode_b64, map)?;
    Ok(decompile_bytes(&bytes, version, &strings, map, swapped))
}

/// Decompile an already-decoded instruction stream.
pub fn decompile_bytes(
    bytes: &[u8],
    version: Version,
    strings: &[String],
    map: &OpcodeMap,
    swapped: &SwappedOpcodes,
) -> String {
    let instructions = disasm::disassemble(bytes, map, strings, version);
    lift::lift_program(&instructions, strings, map, swapped, version)
}

/// Disassembly listing for an already-decoded instruction stream.
pub fn disassemble_listing(
    bytes: &[u8],
    version: Version,
    strings: &[String],
    map: &OpcodeMap,
) -> String {
    let instructions = disasm::disassemble(bytes, map, strings, version);
    listing::render(&instructions)
}
