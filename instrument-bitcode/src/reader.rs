//! Variable-width bit/word cursor (§4.2 "Parse") and the block scanner
//! built on top of it. Mirrors `spirv::decode` in spirit
//! (a cursor type plus a function that walks it into a structured
//! tree) but reads bits rather than whole words, since bitcode records
//! are VBR-compressed rather than fixed-width.
//!
//! `DEFINE_ABBREV`-declared custom abbreviations are not supported: this
//! backend only reads/writes `UNABBREV_RECORD`s. Real LLVM bitcode uses
//! custom abbreviations as a size optimization; a shader bitcode emitted
//! by this pipeline's own compile step never needs them, and treating an
//! encountered one as an unsupported-opcode error is consistent with
//! §4.2's "unsupported opcode ... propagate failure" error condition.

use crate::codes::abbrev_id;
use crate::{BitcodeError, Result};

pub struct BitReader<'a> {
    words: &'a [u32],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        BitReader { words, bit_pos: 0 }
    }

    pub fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    pub fn at_end(&self) -> bool {
        self.bit_pos >= self.words.len() * 32
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        debug_assert!(n <= 64);
        let mut result: u64 = 0;
        let mut got: u32 = 0;
        while got < n {
            let word_idx = self.bit_pos / 32;
            let word = *self.words.get(word_idx).ok_or(BitcodeError::Truncated)? as u64;
            let bit_in_word = (self.bit_pos % 32) as u32;
            let avail = 32 - bit_in_word;
            let take = avail.min(n - got);
            let mask = if take == 64 { u64::MAX } else { (1u64 << take) - 1 };
            let chunk = (word >> bit_in_word) & mask;
            result |= chunk << got;
            got += take;
            self.bit_pos += take as usize;
        }
        Ok(result)
    }

    /// LLVM's VBR: `width`-bit groups, low-to-high; the top bit of each
    /// group signals "more groups follow", the remaining `width - 1`
    /// bits carry payload.
    pub fn read_vbr(&mut self, width: u32) -> Result<u64> {
        let hi_mask = 1u64 << (width - 1);
        let payload_mask = hi_mask - 1;
        let mut piece = self.read_bits(width)?;
        if piece & hi_mask == 0 {
            return Ok(piece);
        }
        let mut result = piece & payload_mask;
        let mut shift = width - 1;
        loop {
            piece = self.read_bits(width)?;
            result |= (piece & payload_mask) << shift;
            if piece & hi_mask == 0 {
                break;
            }
            shift += width - 1;
        }
        Ok(result)
    }

    /// Signed VBR: the low bit of the decoded magnitude is the sign.
    pub fn read_vbr_signed(&mut self, width: u32) -> Result<i64> {
        let raw = self.read_vbr(width)?;
        Ok(decode_signed(raw))
    }

    pub fn align32(&mut self) {
        self.bit_pos = (self.bit_pos + 31) & !31;
    }
}

pub fn decode_signed(raw: u64) -> i64 {
    let magnitude = (raw >> 1) as i64;
    if raw & 1 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

pub fn encode_signed(value: i64) -> u64 {
    let sign = if value < 0 { 1u64 } else { 0 };
    ((value.unsigned_abs()) << 1) | sign
}

#[derive(Debug, Clone)]
pub struct Record {
    pub code: u64,
    pub operands: Vec<u64>,
}

impl Record {
    pub fn op(&self, idx: usize) -> Result<u64> {
        self.operands.get(idx).copied().ok_or(BitcodeError::TooFewOperands(self.code, idx as u32))
    }
}

/// A declaration-order tree of blocks (§4.2 "Parse"): every block carries
/// its own records and nested sub-blocks, each already fully scanned.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub id: u32,
    pub abbrev_width: u32,
    pub records: Vec<Record>,
    pub sub_blocks: Vec<BlockHeader>,
}

/// Scan the entire module as the implicit top-level block (abbrev width
/// 2, the bitstream-format constant) and return its declaration-order
/// children.
pub fn scan_module(words: &[u32]) -> Result<BlockHeader> {
    let mut r = BitReader::new(words);
    let (records, sub_blocks) = scan_block_body(&mut r, 2)?;
    Ok(BlockHeader { id: u32::MAX, abbrev_width: 2, records, sub_blocks })
}

fn scan_block_body(r: &mut BitReader, abbrev_width: u32) -> Result<(Vec<Record>, Vec<BlockHeader>)> {
    let mut records = Vec::new();
    let mut sub_blocks = Vec::new();

    while !r.at_end() {
        let abbrev = r.read_bits(abbrev_width)?;
        match abbrev {
            a if a == abbrev_id::END_BLOCK => {
                r.align32();
                break;
            }
            a if a == abbrev_id::ENTER_SUBBLOCK => {
                let block_id = r.read_vbr(8)? as u32;
                let new_width = r.read_vbr(4)? as u32;
                r.align32();
                let _len_words = r.read_bits(32)?;
                let (sub_records, sub_sub_blocks) = scan_block_body(r, new_width)?;
                sub_blocks.push(BlockHeader {
                    id: block_id,
                    abbrev_width: new_width,
                    records: sub_records,
                    sub_blocks: sub_sub_blocks,
                });
            }
            a if a == abbrev_id::DEFINE_ABBREV => {
                return Err(BitcodeError::UnsupportedAbbrev(a));
            }
            a if a == abbrev_id::UNABBREV_RECORD => {
                let code = r.read_vbr(6)?;
                let num_ops = r.read_vbr(6)?;
                let mut operands = Vec::with_capacity(num_ops as usize);
                for _ in 0..num_ops {
                    operands.push(r.read_vbr(6)?);
                }
                records.push(Record { code, operands });
            }
            other => return Err(BitcodeError::UnsupportedAbbrev(other)),
        }
    }

    Ok((records, sub_blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BitWriter;

    #[test]
    fn round_trips_a_single_unabbreviated_record() {
        let mut w = BitWriter::new();
        w.write_bits(abbrev_id::UNABBREV_RECORD, 2);
        w.write_vbr(42, 6); // code
        w.write_vbr(2, 6); // operand count
        w.write_vbr(7, 6);
        w.write_vbr(9, 6);
        let words = w.into_words();

        let scanned = scan_module(&words).unwrap();
        assert_eq!(scanned.records.len(), 1);
        assert_eq!(scanned.records[0].code, 42);
        assert_eq!(scanned.records[0].operands, vec![7, 9]);
    }

    #[test]
    fn round_trips_a_nested_sub_block() {
        let mut w = BitWriter::new();
        w.enter_subblock(crate::codes::BlockId::Constants as u32, 4);
        w.write_bits(abbrev_id::UNABBREV_RECORD, 4);
        w.write_vbr(1, 6);
        w.write_vbr(0, 6);
        w.end_block();
        let words = w.into_words();

        let scanned = scan_module(&words).unwrap();
        assert_eq!(scanned.sub_blocks.len(), 1);
        assert_eq!(scanned.sub_blocks[0].records.len(), 1);
        assert_eq!(scanned.sub_blocks[0].records[0].code, 1);
    }

    #[test]
    fn signed_vbr_round_trips_negative_values() {
        assert_eq!(decode_signed(encode_signed(-17)), -17);
        assert_eq!(decode_signed(encode_signed(17)), 17);
        assert_eq!(decode_signed(encode_signed(0)), 0);
    }
}
