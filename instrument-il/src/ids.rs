//! Dense, monotonic identifiers addressing elements of a `Program`.
//!
//! Everything is an arena-handle index rather than a pointer (see
//! DESIGN.md / Design Note 1): `TypeId`/`ConstId` index into the owning
//! `Program`'s interning tables, `ValueId` indexes the identifier map,
//! `BlockId` indexes a `Function`'s block list. None of these are valid
//! outside the `Program` that produced them.

use std::fmt;

macro_rules! dense_id {
    ($name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }
    };
}

dense_id!(ValueId);
dense_id!(BlockId);
dense_id!(FuncId);
dense_id!(TypeId);
dense_id!(ConstId);
dense_id!(GlobalId);

/// What a `ValueId` resolves to. The `IdentifierMap` is the sole owner of
/// this mapping; a `ValueId` maps to exactly one of these for its lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueDef {
    /// Defined by an instruction at `(block, index-in-block)`.
    Instruction(BlockId, usize),
    /// A function parameter, by ordinal.
    Parameter(u32),
    /// A module-level global variable.
    Global(GlobalId),
    /// An interned constant.
    Constant(ConstId),
    /// Allocated but not yet defined (used transiently while lowering
    /// forward references, e.g. bitcode forward phis).
    Unresolved,
}
