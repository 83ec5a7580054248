//! Error types shared by the pipeline, the stages and the graphics backends.
//!
//! Every failure belongs to one of three classes (see [`ErrorClass`]). None of
//! them is recoverable for the frame that hit it: the renderer logs the error
//! with the site that reported it and hands it back to the caller, abandoning
//! the whole frame rather than skipping the offending stage.

use thiserror::Error;

use crate::renderer::link::PipelineLink;

/// Broad category of a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The pipeline or a resource request was described incorrectly.
    Configuration,
    /// A GPU resource or a named resource could not be found or created.
    Resource,
    /// The renderer was driven in a way its invariants forbid.
    Invariant,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// A framebuffer asked for both a depth array and a depth/stencil surface.
    #[error("framebuffer cannot have both a depth array ({layers} layers) and a depth/stencil surface")]
    ConflictingDepthAttachments { layers: u32 },

    /// A framebuffer with a zero dimension was requested.
    #[error("framebuffer dimensions must be non-zero (got {width}x{height})")]
    ZeroSizedFramebuffer { width: u32, height: u32 },

    /// A link token points outside the pipeline from the current position.
    #[error("pipeline index out of bounds: link {link:?} at stage index {current} (pipeline length {len})")]
    LinkOutOfBounds {
        link: PipelineLink,
        current: usize,
        len: usize,
    },

    /// Following the draw-output links of framebuffer-less stages looped.
    #[error("pipeline links of stage '{stage}' form a cycle")]
    LinkCycle { stage: String },

    /// The last stage of the pipeline does not draw to the screen.
    #[error("final stage '{stage}' must draw to the screen")]
    FinalStageNotOnScreen { stage: String },

    /// A stage kind that draws with its own program has none.
    #[error("stage '{stage}' has no shader program")]
    MissingShaderProgram { stage: String },

    /// A parent assignment would make an object its own ancestor.
    #[error("invalid scene hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Deferred mode requires geometry-class stages to form the pipeline prefix.
    #[error("geometry stage '{stage}' at index {index} is not part of the pipeline prefix")]
    GeometryPrefixBroken { stage: String, index: usize },

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// A program was asked for a uniform it does not declare.
    #[error("shader program '{program}' has no uniform '{uniform}'")]
    MissingUniform { program: String, uniform: String },

    /// A uniform was given more components than a slot holds.
    #[error("uniform '{uniform}' holds at most 4 components (got {len})")]
    UniformTooLarge { uniform: String, len: usize },

    /// The backend rejected a framebuffer as incomplete.
    #[error("framebuffer incomplete: {reason}")]
    IncompleteFramebuffer { reason: String },

    /// An index exceeded the declared capacity of a table.
    #[error("{kind} index {index} is out of bounds (capacity {capacity})")]
    HandleOutOfBounds {
        kind: &'static str,
        index: usize,
        capacity: usize,
    },

    /// A handle that was never issued (or was removed) was used.
    #[error("unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: usize },

    /// Named lookup found nothing.
    #[error("no {kind} named '{name}'")]
    NameNotFound { kind: &'static str, name: String },

    /// Texture pixel data does not match its declared shape.
    #[error("invalid texture data: {0}")]
    InvalidTexture(String),

    /// The graphics API reported a failure.
    #[error("graphics backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Invariant violations
    // ========================================================================
    /// A frame was started with no stages in the pipeline.
    #[error("cannot render a frame with an empty pipeline")]
    EmptyPipeline,

    /// Backend calls arrived outside of the frame / stage protocol.
    #[error("backend protocol violation: {0}")]
    Protocol(&'static str),
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RenderError::ConflictingDepthAttachments { .. }
            | RenderError::ZeroSizedFramebuffer { .. }
            | RenderError::LinkOutOfBounds { .. }
            | RenderError::LinkCycle { .. }
            | RenderError::FinalStageNotOnScreen { .. }
            | RenderError::MissingShaderProgram { .. }
            | RenderError::InvalidHierarchy(_)
            | RenderError::GeometryPrefixBroken { .. } => ErrorClass::Configuration,
            RenderError::MissingUniform { .. }
            | RenderError::UniformTooLarge { .. }
            | RenderError::IncompleteFramebuffer { .. }
            | RenderError::HandleOutOfBounds { .. }
            | RenderError::UnknownHandle { .. }
            | RenderError::NameNotFound { .. }
            | RenderError::InvalidTexture(_)
            | RenderError::Backend(_) => ErrorClass::Resource,
            RenderError::EmptyPipeline | RenderError::Protocol(_) => ErrorClass::Invariant,
        }
    }
}

/// Logs `err` with the site that reported it. Used with `map_err` at the
/// renderer boundary.
pub(crate) fn report(site: &'static str) -> impl FnOnce(RenderError) -> RenderError {
    move |err| {
        log::error!("{site}: {err} ({:?} error)", err.class());
        err
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            RenderError::ConflictingDepthAttachments { layers: 2 }.class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            RenderError::IncompleteFramebuffer {
                reason: "no attachments".into()
            }
            .class(),
            ErrorClass::Resource
        );
        assert_eq!(RenderError::EmptyPipeline.class(), ErrorClass::Invariant);
    }

    #[test]
    fn out_of_bounds_message_names_the_link() {
        let err = RenderError::LinkOutOfBounds {
            link: PipelineLink::Previous,
            current: 0,
            len: 3,
        };
        let text = err.to_string();
        assert!(text.contains("pipeline index out of bounds"));
        assert!(text.contains("Previous"));
    }
}
