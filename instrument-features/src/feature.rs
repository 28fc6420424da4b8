//! `Feature`: the instrumentation feature interface (§4.4, §6), grounded
//! on `IShaderFeature`'s default "no collection"/"no injection" virtual
//! methods — most features only override the hooks they actually need.

use crate::export::ExportSchemaSink;
use crate::message::MessageSink;
use crate::registry::FeatureRegistry;

/// `Send + Sync` so a `FeatureRegistry` can be shared (read-only) across
/// the worker pool's compile-job threads (§5 "Parallel worker threads
/// drive compile jobs").
pub trait Feature: Send + Sync {
    /// Run once at registration, after a bit has been reserved for this
    /// feature but before it is retained. Returning `false` aborts the
    /// registration and the bit is not consumed (§4.4).
    fn install(&mut self, registry: &FeatureRegistry) -> bool {
        let _ = registry;
        true
    }

    /// Publish the shader-export schemas this feature needs a stream
    /// for (§4.4 "A feature may also publish a shader export schema").
    fn collect_exports(&self, sink: &mut ExportSchemaSink) {
        let _ = sink;
    }

    /// Rewrite `program`'s IL. Pure: reads and mutates only the `Program`
    /// passed in, never touches external state (§4.4 "Injection is
    /// pure").
    fn inject(&self, program: &mut instrument_il::Program) {
        let _ = program;
    }

    /// Decode any per-frame messages this feature's schema produced
    /// (§6 `collectMessages`). Decoding the raw export keys the streamer
    /// drains is an external-bridge concern (§1 "IPC/bridge transport");
    /// features that don't need host-side decoding leave this as a no-op.
    fn collect_messages(&self, sink: &mut dyn MessageSink) {
        let _ = sink;
    }
}
