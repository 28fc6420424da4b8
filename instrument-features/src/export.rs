//! Shader-export message schemas (§6 "Shader-export message layout
//! (wire format)"): a fixed-layout, bit-packed 32-bit key per `Export`
//! instruction. `ExportSchemaSink` collects the schemas a commit's
//! enabled features need, which `instrument-streamer` consumes to size
//! per-feature streams.

use smallvec::SmallVec;

/// One field of a schema's bit-packed key, in declaration order
/// (least-significant bits first, after any leading SGUID).
#[derive(Copy, Clone, Debug)]
pub struct ExportField {
    pub name: &'static str,
    pub bits: u32,
}

/// A fixed-layout message type a feature's `Export` instructions encode
/// into. `has_sguid` reserves the leading 16 bits for the shader GUID
/// that produced the message (§6: "leading 16 bits are an optional
/// Shader-SGUID, if the schema opts in").
#[derive(Clone, Debug)]
pub struct ExportSchema {
    pub schema_id: u32,
    pub name: &'static str,
    pub has_sguid: bool,
    pub fields: SmallVec<[ExportField; 4]>,
}

impl ExportSchema {
    /// Total bit width of one packed key: the optional 16-bit SGUID plus
    /// every field's `bits`. The reference only implements the 32-bit
    /// single-word message path (§6: "a structured (> 32-bit) message
    /// path exists by contract ... but is unimplemented in the reference
    /// and out of scope here"); `ExportSchemaSink::publish` checks this
    /// against that 32-bit ceiling before accepting a schema.
    pub fn total_bits(&self) -> u32 {
        let sguid_bits = if self.has_sguid { 16 } else { 0 };
        sguid_bits + self.fields.iter().map(|f| f.bits).sum::<u32>()
    }
}

/// Collects the schemas a batch of enabled features publish. One sink
/// per scheduler commit; `FeatureRegistry::collect_exports` fills it by
/// walking registered features in registration order.
#[derive(Default)]
pub struct ExportSchemaSink {
    schemas: Vec<ExportSchema>,
}

impl ExportSchemaSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a schema that packs wider than the single 32-bit export key
    /// the wire format supports (§6).
    pub fn publish(&mut self, schema: ExportSchema) {
        let bits = schema.total_bits();
        if bits > 32 {
            log::warn!("export schema \"{}\" (id {}) packs to {bits} bits, over the 32-bit export key; dropping it", schema.name, schema.schema_id);
            return;
        }
        self.schemas.push(schema);
    }

    pub fn schemas(&self) -> &[ExportSchema] {
        &self.schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_bits_includes_the_sguid_only_when_the_schema_opts_in() {
        let with_sguid = ExportSchema {
            schema_id: 0,
            name: "a",
            has_sguid: true,
            fields: SmallVec::from_slice(&[ExportField { name: "value", bits: 32 }]),
        };
        let without = ExportSchema { has_sguid: false, ..with_sguid.clone() };
        assert_eq!(with_sguid.total_bits(), 48);
        assert_eq!(without.total_bits(), 32);
    }

    #[test]
    fn sink_preserves_publish_order() {
        let mut sink = ExportSchemaSink::new();
        sink.publish(ExportSchema { schema_id: 1, name: "first", has_sguid: false, fields: SmallVec::new() });
        sink.publish(ExportSchema { schema_id: 2, name: "second", has_sguid: false, fields: SmallVec::new() });
        let names: Vec<_> = sink.schemas().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
