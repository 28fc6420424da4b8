//! Raw instruction decode: the `(wordCount<<16)|opcode` header word
//! shared by every section. Lifted out of `decode_raw_instruction` in the
//! teacher's `spirv::decode` so `sections::SectionMap`, `parse`, and
//! `compile` all walk the stream the same way.

use crate::SpirError;

pub struct RawInstruction<'a> {
    pub opcode: u16,
    pub word_count: u16,
    pub operands: &'a [u32],
}

pub fn decode_raw(words: &[u32], at: usize) -> crate::Result<RawInstruction<'_>> {
    let i = &words[at..];
    if i.is_empty() {
        return Err(SpirError::IncompleteInstruction(at));
    }
    let word_count = (i[0] >> 16) as usize;
    let opcode = (i[0] & 0xffff) as u16;
    if word_count == 0 || i.len() < word_count {
        return Err(SpirError::IncompleteInstruction(at));
    }
    Ok(RawInstruction { opcode, word_count: word_count as u16, operands: &i[1..word_count] })
}

/// Iterate `(word_offset, RawInstruction)` pairs starting at `start`.
pub fn iter_raw(words: &[u32], start: usize) -> impl Iterator<Item = crate::Result<(usize, RawInstruction<'_>)>> {
    let mut at = start;
    std::iter::from_fn(move || {
        if at >= words.len() {
            return None;
        }
        let here = at;
        Some(match decode_raw(words, at) {
            Ok(inst) => {
                at += inst.word_count as usize;
                Ok((here, inst))
            }
            Err(e) => {
                at = words.len();
                Err(e)
            }
        })
    })
}

pub fn encode(out: &mut Vec<u32>, opcode: u16, operands: impl IntoIterator<Item = u32>) {
    let start = out.len();
    out.push(0);
    out.extend(operands);
    let word_count = (out.len() - start) as u32;
    out[start] = (word_count << 16) | opcode as u32;
}
