//! Feature registration and bit assignment (§4.4 "Contract", §6
//! `registerFeature`). A `FeatureRegistry` owns the ordered list of
//! registered features and the 64-bit counter handing out `FeatureId`s;
//! registration order is retained as injection order (§4.4
//! "Composition").

use smallvec::SmallVec;

use crate::export::ExportSchemaSink;
use crate::feature::Feature;
use crate::{Error, Result};

/// A feature's assigned bit (0..64) in a `FeatureSet`. Assigned once at
/// `FeatureRegistry::register` and never reused or reassigned — "feature
/// bit assignment is fixed at registration; features added after
/// registration never get a bit" (§5 "Ordering guarantees").
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FeatureId(pub(crate) u8);

impl FeatureId {
    pub fn index(self) -> u8 {
        self.0
    }

    fn mask(self) -> u64 {
        1u64 << self.0
    }
}

bitflags::bitflags! {
    /// A 64-bit mask of enabled features (§3 "Feature set"). Unlike a
    /// compile-time `bitflags!` set, bit *meaning* is assigned at runtime
    /// by `FeatureRegistry::register`, so this carries no named
    /// constants beyond `NONE`/`ALL` — `FeatureSet::with` and
    /// `FeatureSet::contains_feature` are the only way callers should
    /// set or query an individual bit.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct FeatureSet: u64 {
        const NONE = 0;
        const ALL = u64::MAX;
    }
}

impl FeatureSet {
    pub fn with(id: FeatureId) -> FeatureSet {
        FeatureSet::from_bits_retain(id.mask())
    }

    pub fn contains_feature(self, id: FeatureId) -> bool {
        self.bits() & id.mask() != 0
    }

    pub fn insert_feature(&mut self, id: FeatureId) {
        *self = FeatureSet::from_bits_retain(self.bits() | id.mask());
    }
}

/// Owns the ordered list of registered features plus the next-free-bit
/// counter. One registry per host process; shared (read-only, via
/// `Feature::install`'s `&FeatureRegistry`) with every feature as it
/// registers.
#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<Box<dyn Feature>>,
    next_bit: u8,
    /// The bit being assigned to the feature currently inside
    /// `register`'s call to `install`, so `install` can learn its own id
    /// without `register` having to thread it through the trait's fixed
    /// `install(&mut self, registry: &FeatureRegistry) -> bool` shape
    /// (§6).
    pending: Option<FeatureId>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id mid-assignment to the feature whose `install` is currently
    /// running. `None` outside of a `register` call.
    pub fn pending_id(&self) -> Option<FeatureId> {
        self.pending
    }

    /// Assign the next free bit, run the feature's own setup, and retain
    /// it in registration order. Rejects a 65th feature with
    /// `Error::FeatureSetExhausted` (§4.4: "a bit is never reused and
    /// features registered after the 64th are rejected").
    pub fn register(&mut self, mut feature: Box<dyn Feature>) -> Result<FeatureId> {
        if self.next_bit >= 64 {
            return Err(Error::FeatureSetExhausted);
        }
        let id = FeatureId(self.next_bit);
        self.pending = Some(id);
        let installed = feature.install(self);
        self.pending = None;
        if !installed {
            return Err(Error::FeatureInstallFailed);
        }
        self.next_bit += 1;
        self.features.push(feature);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Ids and features in registration order, the order `inject_all`
    /// and `collect_exports` both walk.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &dyn Feature)> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, f)| (FeatureId(i as u8), f.as_ref()))
    }

    pub fn collect_exports(&self, sink: &mut ExportSchemaSink) {
        for (_, feature) in self.iter() {
            feature.collect_exports(sink);
        }
    }

    /// Run every enabled feature's `inject` sequentially, in registration
    /// order (§4.4 "Composition": injection is sequential, not
    /// parallel, and confluent — the first mutation wins visibility of
    /// the original).
    pub fn inject_all(&self, program: &mut instrument_il::Program, enabled: FeatureSet) {
        for (id, feature) in self.iter() {
            if enabled.contains_feature(id) {
                feature.inject(program);
            }
        }
    }

    /// Every enabled feature's bit, in registration order — used by
    /// callers building up an `InstrumentationKey`'s `feature_bit_set`
    /// from a scope union without re-deriving `FeatureId`s by hand.
    pub fn enabled_ids(&self, enabled: FeatureSet) -> SmallVec<[FeatureId; 8]> {
        self.iter()
            .filter(|(id, _)| enabled.contains_feature(*id))
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Feature for Noop {}

    struct RefusesToInstall;
    impl Feature for RefusesToInstall {
        fn install(&mut self, _registry: &FeatureRegistry) -> bool {
            false
        }
    }

    #[test]
    fn registration_order_assigns_increasing_bits() {
        let mut reg = FeatureRegistry::new();
        let a = reg.register(Box::new(Noop)).unwrap();
        let b = reg.register(Box::new(Noop)).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn a_feature_that_refuses_to_install_does_not_consume_its_bit() {
        let mut reg = FeatureRegistry::new();
        assert!(reg.register(Box::new(RefusesToInstall)).is_err());
        assert_eq!(reg.len(), 0);
        let a = reg.register(Box::new(Noop)).unwrap();
        assert_eq!(a.index(), 0, "the refused feature's bit must not have been burned");
    }

    #[test]
    fn the_65th_feature_is_rejected() {
        let mut reg = FeatureRegistry::new();
        for _ in 0..64 {
            reg.register(Box::new(Noop)).unwrap();
        }
        assert!(matches!(reg.register(Box::new(Noop)), Err(Error::FeatureSetExhausted)));
    }

    #[test]
    fn feature_set_tracks_individual_bits_independently() {
        let mut reg = FeatureRegistry::new();
        let a = reg.register(Box::new(Noop)).unwrap();
        let b = reg.register(Box::new(Noop)).unwrap();
        let mut set = FeatureSet::NONE;
        set.insert_feature(a);
        assert!(set.contains_feature(a));
        assert!(!set.contains_feature(b));
    }
}
