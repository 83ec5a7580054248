use crate::asset::Handle;
use crate::error::{RenderError, Result};
use crate::gpu::ProgramId;
use crate::renderer::uniforms::PARAMETER_SLOTS;

/// Largest stencil value a program can be stamped with.
pub const MAX_STENCIL_VALUE: u32 = 255;

/// Compiled program plus the names of the uniforms it reads from the
/// per-draw parameter block, one `vec4` slot each in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    name: String,
    id: ProgramId,
    uniforms: Vec<String>,
}

impl ShaderProgram {
    pub fn new(name: impl Into<String>, id: ProgramId, uniforms: Vec<String>) -> Result<Self> {
        if uniforms.len() > PARAMETER_SLOTS {
            return Err(RenderError::HandleOutOfBounds {
                kind: "uniform slot",
                index: uniforms.len() - 1,
                capacity: PARAMETER_SLOTS,
            });
        }
        Ok(Self {
            name: name.into(),
            id,
            uniforms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn uniforms(&self) -> &[String] {
        &self.uniforms
    }

    pub fn uniform_slot(&self, uniform: &str) -> Result<usize> {
        self.uniforms
            .iter()
            .position(|u| u == uniform)
            .ok_or_else(|| RenderError::MissingUniform {
                program: self.name.clone(),
                uniform: uniform.to_string(),
            })
    }

    /// Packs named values into the parameter block. Every name must be a
    /// declared uniform.
    pub fn pack<'a>(
        &self,
        values: impl IntoIterator<Item = (&'a str, &'a [f32])>,
    ) -> Result<[[f32; 4]; PARAMETER_SLOTS]> {
        let mut block = [[0.0; 4]; PARAMETER_SLOTS];
        for (uniform, components) in values {
            let slot = self.uniform_slot(uniform)?;
            if components.len() > 4 {
                return Err(RenderError::UniformTooLarge {
                    uniform: uniform.to_string(),
                    len: components.len(),
                });
            }
            block[slot][..components.len()].copy_from_slice(components);
        }
        Ok(block)
    }
}

/// Stencil value a deferred geometry stage writes for drawables lit by
/// `program`. Zero stays reserved for the cleared background.
pub fn stencil_value(program: Handle<ShaderProgram>) -> Result<u32> {
    let value = program.index() as u32 + 1;
    if value > MAX_STENCIL_VALUE {
        return Err(RenderError::HandleOutOfBounds {
            kind: "stencil value",
            index: value as usize,
            capacity: MAX_STENCIL_VALUE as usize,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> ShaderProgram {
        ShaderProgram::new(
            "post_gamma",
            ProgramId(7),
            vec!["gamma".into(), "tint".into()],
        )
        .expect("program")
    }

    #[test]
    fn unknown_uniform_is_an_error() {
        let err = program().uniform_slot("exposure").unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingUniform {
                program: "post_gamma".into(),
                uniform: "exposure".into()
            }
        );
    }

    #[test]
    fn pack_places_values_by_slot() {
        let block = program()
            .pack([("tint", &[0.5f32, 0.25][..]), ("gamma", &[2.2f32][..])])
            .expect("pack");
        assert_eq!(block[0], [2.2, 0.0, 0.0, 0.0]);
        assert_eq!(block[1], [0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn stencil_values_start_at_one() {
        assert_eq!(stencil_value(Handle::new(0)), Ok(1));
        assert!(stencil_value(Handle::new(255)).is_err());
    }
}
