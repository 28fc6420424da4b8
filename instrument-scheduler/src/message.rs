//! `ControlMessage` (§6 "Instrumentation control messages"), grounded on
//! `InstrumentationController::OnMessage`'s four message kinds.

use crate::state::{PipelineUid, ShaderUid};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specialization(pub Vec<u8>);

#[derive(Debug, Clone)]
pub enum ControlMessage {
    SetInstrumentationConfig { synchronous_recording: bool },
    SetGlobalInstrumentation { feature_bits: u64, spec: Specialization },
    SetShaderInstrumentation { shader_uid: ShaderUid, feature_bits: u64, spec: Specialization },
    SetPipelineInstrumentation { pipeline_uid: PipelineUid, feature_bits: u64, spec: Specialization },
}
