//! The one fallible path at this abstraction level (§7 "GPU resource
//! exhaustion (descriptor heap full, allocator failure) — fail the bind;
//! the host continues uninstrumented for that command list"), grounded
//! on `ShaderExportDescriptorAllocator::Allocate`'s null-return-on-full
//! handling. Every other operation here is either infallible or, per §7
//! "Fence wait underflow / re-entrance ... is a programmer bug", a panic.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("descriptor heap exhausted")]
    DescriptorHeapExhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
