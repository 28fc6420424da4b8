//! `MessageSink`: the per-frame decoded-message boundary a feature's
//! `collect_messages` hands off to (§6 `collectMessages`). Decoding a
//! schema's raw bit-packed key into host-readable fields and carrying it
//! out of process is the IPC/bridge transport §1 places out of scope;
//! this trait is the seam a real bridge implementation plugs into.

use crate::export::ExportSchema;

pub trait MessageSink {
    /// One decoded message: `schema` identifies which feature produced
    /// it, `key` is the raw bit-packed 32-bit value an `Export`
    /// instruction wrote.
    fn accept(&mut self, schema: &ExportSchema, key: u32);
}
