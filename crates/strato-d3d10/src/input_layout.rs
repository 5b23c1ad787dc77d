use strato_gpu::format::format_info;
use strato_gpu::state::{InputAttribute, InputBinding, InputRate};
use tracing::{debug, error, warn};

use crate::error::{ApiError, ApiResult};
use crate::format::{lookup_format, FormatMode};
use crate::shader::InputSignature;

/// Raw input classification codes as they appear in descriptors.
pub mod d3d10 {
    pub const INPUT_PER_VERTEX_DATA: u32 = 0;
    pub const INPUT_PER_INSTANCE_DATA: u32 = 1;

    /// Sentinel offset that packs an element directly behind the
    /// previous element of the same slot, aligned to four bytes.
    pub const APPEND_ALIGNED_ELEMENT: u32 = 0xFFFF_FFFF;
}

/// One vertex input element, matched against the shader's input
/// signature by semantic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputElementDesc {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: u32,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_slot_class: u32,
    pub instance_data_step_rate: u32,
}

/// Immutable vertex layout object. Strides are not part of the layout,
/// they are supplied with the vertex buffers at bind time.
pub struct InputLayout {
    attributes: Vec<InputAttribute>,
    bindings: Vec<InputBinding>,
}

impl InputLayout {
    pub(crate) fn new(
        signature: &InputSignature,
        elements: &[InputElementDesc],
    ) -> ApiResult<Self> {
        let mut attributes: Vec<InputAttribute> = Vec::new();
        let mut bindings: Vec<InputBinding> = Vec::new();

        for element in elements {
            // Elements the shader does not consume are dropped rather
            // than rejected.
            let entry = match signature.find(&element.semantic_name, element.semantic_index) {
                Some(entry) => entry,
                None => {
                    debug!(
                        semantic = %element.semantic_name,
                        index = element.semantic_index,
                        "input element not consumed by shader",
                    );
                    continue;
                }
            };

            let format = lookup_format(element.format, FormatMode::Any).ok_or_else(|| {
                error!(format = element.format, "unsupported input element format");
                ApiError::invalid_arg(format!(
                    "unsupported input element format {}",
                    element.format
                ))
            })?;

            let offset = if element.aligned_byte_offset == d3d10::APPEND_ALIGNED_ELEMENT {
                append_offset(&attributes, element.input_slot)
            } else {
                element.aligned_byte_offset
            };

            attributes.push(InputAttribute {
                location: entry.register,
                binding: element.input_slot,
                format,
                offset,
            });

            let input_rate = if element.input_slot_class == d3d10::INPUT_PER_INSTANCE_DATA {
                InputRate::PerInstance
            } else {
                InputRate::PerVertex
            };

            let binding = InputBinding {
                binding: element.input_slot,
                input_rate,
                step_rate: if input_rate == InputRate::PerInstance {
                    element.instance_data_step_rate
                } else {
                    0
                },
            };

            // A slot may be referenced by multiple elements, but they
            // must agree on the input rate.
            match bindings.iter().find(|b| b.binding == binding.binding) {
                Some(existing) if existing.input_rate != binding.input_rate => {
                    error!(slot = binding.binding, "conflicting input rates for slot");
                    return Err(ApiError::invalid_arg(format!(
                        "conflicting input rates for slot {}",
                        binding.binding
                    )));
                }
                Some(_) => {}
                None => bindings.push(binding),
            }
        }

        for entry in &signature.entries {
            let consumed = elements
                .iter()
                .any(|e| signature.find(&e.semantic_name, e.semantic_index) == Some(entry));
            if !entry.system_value && !consumed {
                warn!(
                    semantic = %entry.semantic_name,
                    index = entry.semantic_index,
                    "shader input has no matching layout element",
                );
            }
        }

        bindings.sort_by_key(|b| b.binding);

        Ok(Self {
            attributes,
            bindings,
        })
    }

    pub(crate) fn attributes(&self) -> &[InputAttribute] {
        &self.attributes
    }

    pub(crate) fn bindings(&self) -> &[InputBinding] {
        &self.bindings
    }
}

/// Packs behind the most recently added attribute of the same slot.
fn append_offset(attributes: &[InputAttribute], slot: u32) -> u32 {
    for prev in attributes.iter().rev() {
        if prev.binding == slot {
            let size = format_info(prev.format).element_size;
            return (prev.offset + size + 3) & !3;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::dxgi;
    use crate::shader::SignatureEntry;

    fn signature(entries: &[(&str, u32, u32)]) -> InputSignature {
        InputSignature {
            entries: entries
                .iter()
                .map(|&(name, index, register)| SignatureEntry {
                    semantic_name: name.into(),
                    semantic_index: index,
                    register,
                    system_value: false,
                })
                .collect(),
        }
    }

    fn element(name: &str, format: u32, slot: u32, offset: u32) -> InputElementDesc {
        InputElementDesc {
            semantic_name: name.into(),
            semantic_index: 0,
            format,
            input_slot: slot,
            aligned_byte_offset: offset,
            input_slot_class: d3d10::INPUT_PER_VERTEX_DATA,
            instance_data_step_rate: 0,
        }
    }

    #[test]
    fn append_packs_elements_per_slot() {
        let sig = signature(&[("POSITION", 0, 0), ("NORMAL", 0, 1), ("TEXCOORD", 0, 2)]);
        let layout = InputLayout::new(
            &sig,
            &[
                element(
                    "POSITION",
                    dxgi::FORMAT_R32G32B32_FLOAT,
                    0,
                    d3d10::APPEND_ALIGNED_ELEMENT,
                ),
                element(
                    "NORMAL",
                    dxgi::FORMAT_R32G32B32_FLOAT,
                    0,
                    d3d10::APPEND_ALIGNED_ELEMENT,
                ),
                element(
                    "TEXCOORD",
                    dxgi::FORMAT_R16G16_FLOAT,
                    1,
                    d3d10::APPEND_ALIGNED_ELEMENT,
                ),
            ],
        )
        .unwrap();

        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 0]);
    }

    #[test]
    fn unconsumed_elements_are_skipped() {
        let sig = signature(&[("POSITION", 0, 0)]);
        let layout = InputLayout::new(
            &sig,
            &[
                element("POSITION", dxgi::FORMAT_R32G32B32A32_FLOAT, 0, 0),
                element("COLOR", dxgi::FORMAT_R8G8B8A8_UNORM, 0, 16),
            ],
        )
        .unwrap();
        assert_eq!(layout.attributes().len(), 1);
        assert_eq!(layout.attributes()[0].location, 0);
    }

    #[test]
    fn semantic_match_is_case_insensitive() {
        let sig = signature(&[("TEXCOORD", 0, 3)]);
        let layout = InputLayout::new(
            &sig,
            &[element("TexCoord", dxgi::FORMAT_R32G32_FLOAT, 0, 0)],
        )
        .unwrap();
        assert_eq!(layout.attributes()[0].location, 3);
    }

    #[test]
    fn conflicting_input_rates_are_rejected() {
        let sig = signature(&[("POSITION", 0, 0), ("COLOR", 0, 1)]);
        let mut instanced = element("COLOR", dxgi::FORMAT_R8G8B8A8_UNORM, 0, 16);
        instanced.input_slot_class = d3d10::INPUT_PER_INSTANCE_DATA;
        instanced.instance_data_step_rate = 1;

        let result = InputLayout::new(
            &sig,
            &[
                element("POSITION", dxgi::FORMAT_R32G32B32A32_FLOAT, 0, 0),
                instanced,
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn bindings_are_sorted_by_slot() {
        let sig = signature(&[("A", 0, 0), ("B", 0, 1)]);
        let layout = InputLayout::new(
            &sig,
            &[
                element("B", dxgi::FORMAT_R32_FLOAT, 5, 0),
                element("A", dxgi::FORMAT_R32_FLOAT, 2, 0),
            ],
        )
        .unwrap();
        let slots: Vec<u32> = layout.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(slots, vec![2, 5]);
    }
}
