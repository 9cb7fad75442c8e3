//! Error types for the graphics crate.

use crate::backend::ObjectKind;
use crate::graph::{DescriptorHandle, PipelineHandle, ResourceHandle, StageHandle};

/// Errors reported by a GPU backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// Failed to initialize the backend.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// The GPU API rejected an object creation request.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// The requested feature is not supported.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// A descriptor or argument is invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Out of GPU or host memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Internal backend error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A declared graph is structurally invalid.
///
/// Detected before any GPU object is created, so a failed validation never
/// leaves partially built physical state behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A handle does not belong to this graph.
    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceHandle),
    /// A stage handle does not belong to this graph.
    #[error("unknown stage {0:?}")]
    UnknownStage(StageHandle),
    /// A descriptor handle does not belong to this graph.
    #[error("unknown resource descriptor {0:?}")]
    UnknownDescriptor(DescriptorHandle),
    /// A pipeline declaration refers to a stage that does not exist.
    #[error("pipeline {pipeline:?} refers to unknown stage {stage:?}")]
    UnknownPipelineStage {
        pipeline: PipelineHandle,
        stage: StageHandle,
    },
    /// No stage writes the compilation target.
    #[error("target '{resource}' is not written by any stage")]
    TargetHasNoWriter { resource: String },
    /// A stage reads a resource nothing produces.
    #[error("stage '{stage}' reads '{resource}', which has no writer and no external supply")]
    UnwrittenRead { stage: String, resource: String },
    /// A vertex buffer is read without a binding index.
    #[error("stage '{stage}' reads vertex buffer '{resource}' without a vertex binding")]
    MissingVertexBinding { stage: String, resource: String },
    /// A stage never registered a record callback.
    #[error("stage '{stage}' has no record callback")]
    MissingRecordCallback { stage: String },
    /// A stage declares no shaders, so no pipeline can be built for it.
    #[error("stage '{stage}' declares no shaders")]
    MissingShaders { stage: String },
    /// More than one depth/stencil texture written by one stage.
    #[error("stage '{stage}' writes more than one depth/stencil texture")]
    MultipleDepthAttachments { stage: String },
    /// Declared blend attachments do not match the color attachments.
    #[error("stage '{stage}' declares {declared} blend attachments for {expected} color attachments")]
    BlendAttachmentMismatch {
        stage: String,
        declared: usize,
        expected: usize,
    },
    /// Written textures disagree on their extent.
    #[error("stage '{stage}' writes attachments of different extents")]
    AttachmentExtentMismatch { stage: String },
    /// A descriptor binds a resource of the wrong kind.
    #[error("descriptor '{descriptor}' cannot bind '{resource}'")]
    DescriptorKindMismatch {
        descriptor: String,
        resource: String,
    },
    /// The stage dependencies form a cycle.
    #[error("cyclic dependency between stages: {}", stages.join(" -> "))]
    Cycle { stages: Vec<String> },
    /// The presentation surface has no images to render into.
    #[error("presentation surface exposes no images")]
    NoSurfaceImages,
}

/// Errors produced while compiling or executing a render graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The declared graph is invalid.
    #[error("invalid render graph: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The GPU API rejected an object the graph needed.
    #[error("failed to create {object} for '{owner}': {source}")]
    BackendCreation {
        object: ObjectKind,
        owner: String,
        #[source]
        source: GraphicsError,
    },
    /// Uploading staging data into an existing object failed.
    #[error("failed to upload data for '{resource}': {source}")]
    Upload {
        resource: String,
        #[source]
        source: GraphicsError,
    },
    /// Waiting for the device to go idle failed.
    #[error("device idle wait failed: {0}")]
    DeviceWait(#[source] GraphicsError),
    /// The compiled graph was produced from a different render graph.
    #[error("compiled graph does not belong to this render graph")]
    ForeignGraph,
    /// Declarations changed after the graph was compiled.
    #[error("compiled graph is stale: declarations changed since compilation")]
    StaleCompilation,
    /// The image index does not name a presentation-surface image.
    #[error("image index {index} out of range for {count} surface images")]
    InvalidImageIndex { index: u32, count: usize },
}

impl GraphError {
    pub(crate) fn creation(
        object: ObjectKind,
        owner: impl Into<String>,
    ) -> impl FnOnce(GraphicsError) -> Self {
        let owner = owner.into();
        move |source| Self::BackendCreation {
            object,
            owner,
            source,
        }
    }

    /// Returns `true` if the error reports an invalid declaration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphics_error_display() {
        let err = GraphicsError::ResourceCreationFailed("out of handles".into());
        assert_eq!(err.to_string(), "resource creation failed: out of handles");
        assert_eq!(GraphicsError::DeviceLost.to_string(), "GPU device lost");
    }

    #[test]
    fn test_backend_creation_names_owner_and_object() {
        let err = GraphError::creation(ObjectKind::Pipeline, "octree")(
            GraphicsError::InvalidParameter("no shaders".into()),
        );
        assert_eq!(
            err.to_string(),
            "failed to create pipeline for 'octree': invalid parameter: no shaders"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_cycle_lists_stages() {
        let err: GraphError = ConfigurationError::Cycle {
            stages: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "invalid render graph: cyclic dependency between stages: a -> b -> a"
        );
    }
}
