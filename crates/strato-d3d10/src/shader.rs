use std::sync::Arc;

use strato_gpu::GpuShader;
use strato_gpu::state::ShaderStage;
use thiserror::Error;

/// Error produced by a [`ShaderCompiler`].
#[derive(Debug, Error)]
#[error("shader compilation failed: {0}")]
pub struct CompileError(pub String);

/// Translates application shader bytecode into code the backend device
/// accepts. The translation itself lives outside this crate; the layer
/// only routes modules to pipeline stages.
pub trait ShaderCompiler: Send + Sync {
    fn compile(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<Vec<u8>, CompileError>;
}

/// Hands the bytecode to the device unchanged, for backends that
/// consume the application's format directly.
#[derive(Default)]
pub struct PassthroughCompiler;

impl ShaderCompiler for PassthroughCompiler {
    fn compile(&self, _stage: ShaderStage, bytecode: &[u8]) -> Result<Vec<u8>, CompileError> {
        Ok(bytecode.to_vec())
    }
}

/// One element of a vertex shader's input signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureEntry {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub register: u32,
    /// System-value inputs are generated by the pipeline and never
    /// matched against input layout elements.
    pub system_value: bool,
}

/// Vertex input signature, matched against input layout elements by
/// semantic. Semantic names compare case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct InputSignature {
    pub entries: Vec<SignatureEntry>,
}

impl InputSignature {
    pub fn find(&self, semantic_name: &str, semantic_index: u32) -> Option<&SignatureEntry> {
        self.entries.iter().find(|e| {
            e.semantic_index == semantic_index
                && e.semantic_name.eq_ignore_ascii_case(semantic_name)
        })
    }
}

/// Stream output declaration for geometry shaders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoDeclarationEntry {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub start_component: u8,
    pub component_count: u8,
    pub output_slot: u8,
}

macro_rules! shader_object {
    ($name:ident) => {
        pub struct $name {
            shader: Arc<dyn GpuShader>,
        }

        impl $name {
            pub(crate) fn new(shader: Arc<dyn GpuShader>) -> Self {
                Self { shader }
            }

            pub(crate) fn gpu_shader(&self) -> &Arc<dyn GpuShader> {
                &self.shader
            }
        }
    };
}

shader_object!(VertexShader);
shader_object!(GeometryShader);
shader_object!(PixelShader);

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> InputSignature {
        InputSignature {
            entries: vec![
                SignatureEntry {
                    semantic_name: "POSITION".into(),
                    semantic_index: 0,
                    register: 0,
                    system_value: false,
                },
                SignatureEntry {
                    semantic_name: "TEXCOORD".into(),
                    semantic_index: 1,
                    register: 2,
                    system_value: false,
                },
            ],
        }
    }

    #[test]
    fn semantic_lookup_ignores_case() {
        let sig = signature();
        assert_eq!(sig.find("position", 0).map(|e| e.register), Some(0));
        assert_eq!(sig.find("TexCoord", 1).map(|e| e.register), Some(2));
        assert!(sig.find("TEXCOORD", 0).is_none());
    }

    #[test]
    fn passthrough_compiler_returns_input() {
        let code = [1u8, 2, 3, 4];
        let out = PassthroughCompiler
            .compile(ShaderStage::Vertex, &code)
            .unwrap();
        assert_eq!(out, code);
    }
}
