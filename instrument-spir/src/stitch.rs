//! Stitch (§4.3 "Stitch"): concatenate relocation blocks per section in
//! the fixed section order, prepending the module header.

use crate::header::ModuleHeader;
use crate::relocation::RelocationStream;

/// `bound` should be the `next_numeric_id` counter left over after
/// recompiling every function and reserving the export globals, so the
/// stitched module's header declares an id bound that actually covers
/// every id used in the body.
pub fn stitch_module(mut header: ModuleHeader, bound: u32, relocations: RelocationStream) -> Vec<u32> {
    header.bound = bound;
    let mut out = Vec::new();
    header.write(&mut out);
    out.extend(relocations.into_words());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SECTION_ORDER;

    #[test]
    fn stitch_concatenates_sections_in_fixed_order_with_updated_bound() {
        let header = ModuleHeader { version: 0x10000, generator: 0, bound: 1, schema: 0 };
        let mut relocations = RelocationStream::new();
        for (i, &id) in SECTION_ORDER.iter().enumerate() {
            relocations.append(id, [i as u32]);
        }

        let words = stitch_module(header, 99, relocations);

        assert_eq!(words[0], crate::header::MAGIC);
        assert_eq!(words[3], 99, "bound word must reflect the updated id bound");
        let body = &words[ModuleHeader::WORD_COUNT..];
        let expected: Vec<u32> = (0..SECTION_ORDER.len() as u32).collect();
        assert_eq!(body, expected.as_slice());
    }
}
