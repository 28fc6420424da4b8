//! The scheduler itself (§4.5): dirty tracking via `on_message`, and the
//! three-stage `commit()` chain (`compile_shaders -> compile_pipelines ->
//! commit_table`), grounded on `InstrumentationController::{OnMessage,
//! Commit, CommitShaders, CommitPipelines, CommitTable}`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use instrument_features::{FeatureRegistry, FeatureSet};
use parking_lot::{Mutex, RwLock};

use crate::event::CompilationEvent;
use crate::key::InstrumentationKey;
use crate::message::ControlMessage;
use crate::pool::WorkerPool;
use crate::state::{self, PipelineEntry, PipelineUid, ShaderEntry, ShaderUid};

#[derive(Default)]
struct Dirty {
    shaders: FxHashSet<ShaderUid>,
    pipelines: FxHashSet<PipelineUid>,
}

struct Batch {
    shaders: Vec<ShaderUid>,
    pipelines: Vec<PipelineUid>,
}

pub struct Scheduler {
    registry: Arc<FeatureRegistry>,
    pool: WorkerPool,
    event: CompilationEvent,
    shaders: RwLock<FxHashMap<ShaderUid, ShaderEntry>>,
    pipelines: RwLock<FxHashMap<PipelineUid, PipelineEntry>>,
    shader_pipelines: RwLock<FxHashMap<ShaderUid, FxHashSet<PipelineUid>>>,
    pipeline_variants: RwLock<FxHashMap<PipelineUid, Vec<InstrumentationKey>>>,
    dirty: Mutex<Dirty>,
    global_bits: AtomicU64,
    synchronous_recording: AtomicBool,
    export_set: u32,
    export_schema_count: u32,
}

impl Scheduler {
    pub fn new(registry: Arc<FeatureRegistry>) -> Arc<Self> {
        Self::with_pool(registry, WorkerPool::with_default_threads())
    }

    pub fn with_pool(registry: Arc<FeatureRegistry>, pool: WorkerPool) -> Arc<Self> {
        let mut sink = instrument_features::ExportSchemaSink::new();
        registry.collect_exports(&mut sink);
        let export_schema_count = sink.schemas().len() as u32;

        Arc::new(Scheduler {
            registry,
            pool,
            event: CompilationEvent::new(),
            shaders: RwLock::new(FxHashMap::default()),
            pipelines: RwLock::new(FxHashMap::default()),
            shader_pipelines: RwLock::new(FxHashMap::default()),
            pipeline_variants: RwLock::new(FxHashMap::default()),
            dirty: Mutex::new(Dirty::default()),
            global_bits: AtomicU64::new(0),
            synchronous_recording: AtomicBool::new(false),
            export_set: 0,
            export_schema_count,
        })
    }

    pub fn register_shader(&self, uid: ShaderUid, bytecode: Vec<u32>) {
        self.shaders.write().insert(uid, ShaderEntry::new(bytecode));
    }

    pub fn register_pipeline(&self, uid: PipelineUid, shaders: Vec<ShaderUid>) {
        {
            let mut shader_pipelines = self.shader_pipelines.write();
            for &shader_uid in &shaders {
                shader_pipelines.entry(shader_uid).or_default().insert(uid);
            }
        }
        self.pipelines.write().insert(uid, PipelineEntry::new(shaders));
    }

    pub fn synchronous_recording(&self) -> bool {
        self.synchronous_recording.load(Ordering::Acquire)
    }

    pub fn variant(&self, shader_uid: ShaderUid, key: InstrumentationKey) -> Option<Vec<u32>> {
        self.shaders.read().get(&shader_uid)?.variants.get(&key).cloned()
    }

    pub fn pipeline_variant_keys(&self, pipeline_uid: PipelineUid) -> Option<Vec<InstrumentationKey>> {
        self.pipeline_variants.read().get(&pipeline_uid).cloned()
    }

    pub fn wait(&self, commit_id: u64) {
        self.event.wait(commit_id);
    }

    /// Apply one control message (§6 "Instrumentation control messages"),
    /// marking dependents dirty exactly as `OnMessage` does: a global
    /// change dirties every known shader and pipeline; a shader change
    /// dirties that shader plus its dependent pipelines; a pipeline
    /// change dirties that pipeline plus its own shaders.
    pub fn on_message(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::SetInstrumentationConfig { synchronous_recording } => {
                self.synchronous_recording.store(synchronous_recording, Ordering::Release);
            }

            ControlMessage::SetGlobalInstrumentation { feature_bits, spec: _ } => {
                self.global_bits.store(feature_bits, Ordering::Release);
                let shader_uids: Vec<ShaderUid> = self.shaders.read().keys().copied().collect();
                let pipeline_uids: Vec<PipelineUid> = self.pipelines.read().keys().copied().collect();
                let mut dirty = self.dirty.lock();
                dirty.shaders.extend(shader_uids);
                dirty.pipelines.extend(pipeline_uids);
            }

            ControlMessage::SetShaderInstrumentation { shader_uid, feature_bits, spec: _ } => {
                let found = {
                    let mut shaders = self.shaders.write();
                    match shaders.get_mut(&shader_uid) {
                        Some(entry) => {
                            entry.local_bits = feature_bits;
                            true
                        }
                        None => false,
                    }
                };
                if !found {
                    log::warn!("SetShaderInstrumentation for unknown shader {shader_uid}");
                    return;
                }

                let dependents: Vec<PipelineUid> =
                    self.shader_pipelines.read().get(&shader_uid).map(|s| s.iter().copied().collect()).unwrap_or_default();

                let mut dirty = self.dirty.lock();
                dirty.shaders.insert(shader_uid);
                dirty.pipelines.extend(dependents);
            }

            ControlMessage::SetPipelineInstrumentation { pipeline_uid, feature_bits, spec: _ } => {
                let shaders_of_pipeline = {
                    let mut pipelines = self.pipelines.write();
                    pipelines.get_mut(&pipeline_uid).map(|entry| {
                        entry.local_bits = feature_bits;
                        entry.shaders.clone()
                    })
                };
                let Some(shaders_of_pipeline) = shaders_of_pipeline else {
                    log::warn!("SetPipelineInstrumentation for unknown pipeline {pipeline_uid}");
                    return;
                };

                let mut dirty = self.dirty.lock();
                dirty.pipelines.insert(pipeline_uid);
                dirty.shaders.extend(shaders_of_pipeline);
            }
        }
    }

    /// Effective feature bit set for `shader_uid` (§4.5 "compute the
    /// *effective* feature bit set = global | shader | OR(dependent
    /// pipelines')"). Shared by `compile_shaders` (to decide which
    /// variant to build) and `compile_pipelines` (to decide which
    /// variant to look up), so a pipeline's link-time lookup always
    /// targets exactly the key its shaders were compiled under.
    fn effective_shader_bits(&self, shader_uid: ShaderUid) -> Option<u64> {
        let local_bits = self.shaders.read().get(&shader_uid)?.local_bits;
        let mut bits = self.global_bits.load(Ordering::Acquire) | local_bits;

        if let Some(dependents) = self.shader_pipelines.read().get(&shader_uid).cloned() {
            let pipelines = self.pipelines.read();
            for pipeline_uid in dependents {
                if let Some(pipeline) = pipelines.get(&pipeline_uid) {
                    bits |= pipeline.local_bits;
                }
            }
        }
        Some(bits)
    }

    /// Snapshot the dirty set into a `Batch`, then schedule the
    /// `compile_shaders -> compile_pipelines -> commit_table` chain on
    /// the worker pool (§4.5 "Commit pipeline"). Returns the commit id to
    /// `wait` on.
    pub fn commit(self: &Arc<Self>) -> u64 {
        let id = self.event.begin_commit();

        let batch = {
            let mut dirty = self.dirty.lock();
            Batch { shaders: dirty.shaders.drain().collect(), pipelines: dirty.pipelines.drain().collect() }
        };

        if batch.shaders.is_empty() && batch.pipelines.is_empty() {
            self.event.complete_commit(id);
            return id;
        }

        log::info!("committing {} shaders and {} pipelines for instrumentation", batch.shaders.len(), batch.pipelines.len());

        let batch = Arc::new(batch);
        let shader_jobs = self.build_shader_jobs(&batch);

        let stage2 = Arc::clone(self);
        let stage2_batch = Arc::clone(&batch);
        self.pool.run_bucket(shader_jobs, move || {
            let pipeline_jobs = stage2.build_pipeline_jobs(&stage2_batch);

            let stage3 = Arc::clone(&stage2);
            let stage3_batch = Arc::clone(&stage2_batch);
            stage2.pool.run_bucket(pipeline_jobs, move || {
                stage3.commit_table(&stage3_batch, id);
            });
        });

        id
    }

    fn build_shader_jobs(self: &Arc<Self>, batch: &Arc<Batch>) -> Vec<Box<dyn FnOnce() + Send>> {
        let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();

        for &shader_uid in &batch.shaders {
            let Some(effective_bits) = self.effective_shader_bits(shader_uid) else {
                log::warn!("dirty shader {shader_uid} is no longer registered, skipping");
                continue;
            };
            let key = InstrumentationKey::for_shader_compile(effective_bits);

            let already_present = self.shaders.read().get(&shader_uid).map(|e| e.has_variant(&key)).unwrap_or(false);
            if already_present {
                continue;
            }

            let this = Arc::clone(self);
            jobs.push(Box::new(move || this.compile_one_shader(shader_uid, key)));
        }

        jobs
    }

    /// A single `CompileShaders` job (§4.5): parse the shader's bytecode
    /// the first time it's needed, fork the parsed program, run every
    /// enabled feature's `inject`, recompile, and store the result keyed
    /// by `key`. Failures are logged and leave the variant absent (§4.5/
    /// §7 "Failure semantics").
    fn compile_one_shader(&self, shader_uid: ShaderUid, key: InstrumentationKey) {
        {
            let mut shaders = self.shaders.write();
            if let Some(entry) = shaders.get_mut(&shader_uid) {
                if entry.parsed.is_none() && !entry.parse_failed {
                    match state::parse_shader(&entry.bytecode) {
                        Ok(parsed) => entry.parsed = Some(parsed),
                        Err(err) => {
                            log::warn!("shader {shader_uid} failed to parse: {err}");
                            entry.parse_failed = true;
                        }
                    }
                }
            }
        }

        let forked = {
            let shaders = self.shaders.read();
            match shaders.get(&shader_uid) {
                Some(entry) if !entry.parse_failed => entry.parsed.as_ref().map(|p| p.fork()),
                _ => None,
            }
        };
        let Some(mut forked) = forked else {
            return;
        };

        forked.inject(&self.registry, FeatureSet::from_bits_retain(key.feature_bit_set));

        match forked.compile(self.export_set, self.export_schema_count) {
            Ok(bytes) => {
                let mut shaders = self.shaders.write();
                if let Some(entry) = shaders.get_mut(&shader_uid) {
                    entry.variants.insert(key, bytes);
                }
            }
            Err(err) => {
                log::warn!("shader {shader_uid} failed to compile for key {key:?}: {err}");
            }
        }
    }

    fn build_pipeline_jobs(self: &Arc<Self>, batch: &Arc<Batch>) -> Vec<Box<dyn FnOnce() + Send>> {
        let mut jobs: Vec<Box<dyn FnOnce() + Send>> = Vec::new();

        for &pipeline_uid in &batch.pipelines {
            let this = Arc::clone(self);
            jobs.push(Box::new(move || this.link_one_pipeline(pipeline_uid)));
        }

        jobs
    }

    /// A single `CompilePipelines` job (§4.5): build each referenced
    /// shader's key the same way `compile_shaders` did, and only link if
    /// every one of them already has that variant; otherwise log and
    /// skip this pipeline while the batch's siblings proceed (§7 "Missing
    /// variant at link time").
    fn link_one_pipeline(&self, pipeline_uid: PipelineUid) {
        let shaders_of_pipeline = match self.pipelines.read().get(&pipeline_uid) {
            Some(entry) => entry.shaders.clone(),
            None => {
                log::warn!("dirty pipeline {pipeline_uid} is no longer registered, skipping");
                return;
            }
        };

        let mut keys = Vec::with_capacity(shaders_of_pipeline.len());
        for shader_uid in &shaders_of_pipeline {
            let Some(effective_bits) = self.effective_shader_bits(*shader_uid) else {
                log::warn!("pipeline {pipeline_uid} references unknown shader {shader_uid}, rejecting link");
                return;
            };
            let key = InstrumentationKey::for_shader_compile(effective_bits);

            let has_variant = self.shaders.read().get(shader_uid).map(|e| e.has_variant(&key)).unwrap_or(false);
            if !has_variant {
                log::warn!("pipeline {pipeline_uid} missing variant [{:?}] for shader {shader_uid}, rejecting link", key);
                return;
            }
            keys.push(key);
        }

        self.pipeline_variants.write().insert(pipeline_uid, keys);
    }

    /// `CommitTable` (§4.5): in this in-memory model the variant table
    /// *is* each shader's `variants` map, already published by
    /// `compile_one_shader`/`link_one_pipeline` as they completed, so
    /// there is nothing left to swap in here beyond bumping the
    /// completion counter that wakes `wait` (§5 "Ordering guarantees":
    /// the head counter alone, with no separate "latest wins" flag, is
    /// enough to make a later commit's publish visible without a stale
    /// earlier one overwriting it, since each commit only ever inserts
    /// entries keyed by its own batch's instrumentation keys).
    fn commit_table(&self, batch: &Batch, commit_id: u64) {
        log::info!(
            "instrumented {} shaders and {} pipelines for commit {}",
            batch.shaders.len(),
            batch.pipelines.len(),
            commit_id
        );
        self.event.complete_commit(commit_id);
    }
}
