//! `InstrumentationKey` (§3 "InstrumentationKey"): identity of one
//! instrumented variant of a shader.

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct InstrumentationKey {
    pub feature_bit_set: u64,
    pub pipeline_layout_user_slots: u32,
}

impl InstrumentationKey {
    /// The key `compile_shaders` computes: the user-slot count is a
    /// property of a specific pipeline's root layout, not of a shader in
    /// isolation, so a shader-granularity compile always keys under 0.
    /// `compile_pipelines` looks a variant up under its own, possibly
    /// nonzero, slot count; a mismatch is a legitimate "missing variant"
    /// that gets logged and skipped rather than silently widened (§7
    /// "Missing variant at link time").
    pub fn for_shader_compile(feature_bit_set: u64) -> Self {
        InstrumentationKey { feature_bit_set, pipeline_layout_user_slots: 0 }
    }
}
