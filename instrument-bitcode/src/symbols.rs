//! Value symbol table (§4.2, "Supplemented from `original_source`"):
//! attaches human-readable names to a subset of result ids, purely for
//! diagnostics. Grounded in `DXILPhysicalBlockFunction.cpp`'s handling
//! of the `ValueSymbolTable` block; dropped silently if the block is
//! absent from the module, never required for correctness.

use fxhash::FxHashMap;

use crate::codes::ValueSymtabCode;
use crate::reader::BlockHeader;

#[derive(Debug, Default, Clone)]
pub struct ValueSymbolTable {
    names: FxHashMap<u32, String>,
}

impl ValueSymbolTable {
    pub fn parse(block: &BlockHeader) -> Self {
        let mut names = FxHashMap::default();
        for rec in &block.records {
            let is_entry = rec.code == ValueSymtabCode::Entry as u64;
            let is_bb_entry = rec.code == ValueSymtabCode::BbEntry as u64;
            if !is_entry && !is_bb_entry {
                continue;
            }
            let Some((&id, chars)) = rec.operands.split_first() else { continue };
            let name: String = chars.iter().filter_map(|&c| char::from_u32(c as u32)).collect();
            names.insert(id as u32, name);
        }
        ValueSymbolTable { names }
    }

    pub fn name_of(&self, value_index: u32) -> Option<&str> {
        self.names.get(&value_index).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Record;

    #[test]
    fn parses_entry_records_into_names() {
        let block = BlockHeader {
            id: 0,
            abbrev_width: 4,
            records: vec![Record { code: ValueSymtabCode::Entry as u64, operands: vec![3, 'v' as u64, 'a' as u64, 'l' as u64] }],
            sub_blocks: vec![],
        };
        let table = ValueSymbolTable::parse(&block);
        assert_eq!(table.name_of(3), Some("val"));
        assert_eq!(table.name_of(4), None);
    }

    #[test]
    fn missing_table_is_simply_absent() {
        let table: Option<ValueSymbolTable> = None;
        assert!(table.is_none());
    }
}
