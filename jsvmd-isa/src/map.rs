use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::Op;

/// Raw opcode numbers whose binary handlers evaluate their operands in
/// reversed pop order. Detected per payload by the fingerprinter.
pub type SwappedOpcodes = HashSet<u8>;

/// Per-payload bijection between shuffled opcode numbers and canonical
/// operations. May be partial; unresolved numbers disassemble as
/// `UNKNOWN_<n>`.
#[derive(Debug, Clone, Default)]
pub struct OpcodeMap {
    entries: HashMap<u8, Op>,
    return_opcode: Option<u8>,
}

impl OpcodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: u8, op: Op) {
        self.entries.insert(raw, op);
    }

    /// Nominate the RETURN opcode detected from the dispatcher's
    /// terminating comparison.
    pub fn set_return_opcode(&mut self, raw: u8) {
        self.return_opcode = Some(raw);
        self.entries.insert(raw, Op::Return);
    }

    pub fn return_opcode(&self) -> Option<u8> {
        self.return_opcode
    }

    pub fn get(&self, raw: u8) -> Option<Op> {
        if self.return_opcode == Some(raw) {
            return Some(Op::Return);
        }
        self.entries.get(&raw).copied()
    }

    pub fn contains(&self, raw: u8) -> bool {
        self.get(raw).is_some()
    }

    /// Largest mapped raw number; the upper bound of the legal opcode range.
    pub fn max_raw(&self) -> Option<u8> {
        let mut max = self.entries.keys().copied().max();
        if let Some(ret) = self.return_opcode {
            max = Some(max.map_or(ret, |m| m.max(ret)));
        }
        max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Symbolic name for a raw number: the canonical mnemonic, or
    /// `UNKNOWN_<n>` when the map has no entry.
    pub fn name_of(&self, raw: u8) -> String {
        match self.get(raw) {
            Some(op) => op.mnemonic().to_string(),
            None => format!("UNKNOWN_{raw}"),
        }
    }

    /// Reverse lookup, first match wins. Intended for tests and tooling.
    pub fn raw_for(&self, op: Op) -> Option<u8> {
        if op == Op::Return {
            if let Some(r) = self.return_opcode {
                return Some(r);
            }
        }
        let mut hits: Vec<u8> = self
            .entries
            .iter()
            .filter(|(_, v)| **v == op)
            .map(|(k, _)| *k)
            .collect();
        hits.sort_unstable();
        hits.first().copied()
    }
}

/// On-disk exchange format for a fingerprinted payload: the opcode map,
/// the return opcode, and the swapped-operand set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapFile {
    pub opcodes: BTreeMap<u8, String>,
    #[serde(default)]
    pub return_opcode: Option<u8>,
    #[serde(default)]
    pub swapped: Vec<u8>,
}

impl MapFile {
    pub fn from_parts(map: &OpcodeMap, swapped: &SwappedOpcodes) -> Self {
        let mut opcodes = BTreeMap::new();
        for raw in 0..=u8::MAX {
            if let Some(op) = map.get(raw) {
                opcodes.insert(raw, op.mnemonic().to_string());
            }
        }
        let mut swapped: Vec<u8> = swapped.iter().copied().collect();
        swapped.sort_unstable();
        MapFile {
            opcodes,
            return_opcode: map.return_opcode(),
            swapped,
        }
    }

    /// Rebuild the in-memory map. Unknown mnemonics are skipped so a file
    /// written by a newer tool still loads.
    pub fn into_parts(self) -> (OpcodeMap, SwappedOpcodes) {
        let mut map = OpcodeMap::new();
        for (raw, name) in &self.opcodes {
            if let Some(op) = Op::from_mnemonic(name) {
                map.insert(*raw, op);
            }
        }
        if let Some(ret) = self.return_opcode {
            map.set_return_opcode(ret);
        }
        (map, self.swapped.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_numbers_get_placeholder_names() {
        let mut map = OpcodeMap::new();
        map.insert(7, Op::Add);
        assert_eq!(map.name_of(7), "ADD");
        assert_eq!(map.name_of(8), "UNKNOWN_8");
    }

    #[test]
    fn return_opcode_overrides_lookup() {
        let mut map = OpcodeMap::new();
        map.insert(3, Op::Add);
        map.set_return_opcode(9);
        assert_eq!(map.get(9), Some(Op::Return));
        assert_eq!(map.raw_for(Op::Return), Some(9));
    }

    #[test]
    fn map_file_roundtrip() {
        let mut map = OpcodeMap::new();
        map.insert(0x11, Op::PushInt);
        map.insert(0x22, Op::Sub);
        map.set_return_opcode(0x33);
        let swapped: SwappedOpcodes = [0x22].into_iter().collect();

        let file = MapFile::from_parts(&map, &swapped);
        let json = serde_json::to_string(&file).unwrap();
        let parsed: MapFile = serde_json::from_str(&json).unwrap();
        let (map2, swapped2) = parsed.into_parts();

        assert_eq!(map2.get(0x11), Some(Op::PushInt));
        assert_eq!(map2.get(0x22), Some(Op::Sub));
        assert_eq!(map2.return_opcode(), Some(0x33));
        assert!(swapped2.contains(&0x22));
    }
}
