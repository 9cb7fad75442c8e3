//! Buffer types and descriptors.

use super::Format;

/// How a buffer resource is consumed by the stages that read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Per-vertex input data.
    Vertex,
    /// Index data for indexed draws.
    Index,
    /// Uniform data bound through a descriptor set.
    Uniform,
}

impl std::fmt::Display for BufferUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Index => "index",
            Self::Uniform => "uniform",
        };
        f.write_str(name)
    }
}

/// Width of the elements stored in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// A vertex attribute declared on a vertex buffer resource.
///
/// The shader location is implied by declaration order; the binding index is
/// assigned by the stage that reads the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute format.
    pub format: Format,
    /// Byte offset of the attribute inside one element.
    pub offset: u32,
}

impl VertexAttribute {
    pub fn new(format: Format, offset: u32) -> Self {
        Self { format, offset }
    }
}

/// Descriptor for creating a GPU buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Usage kind.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_descriptor() {
        let desc = BufferDescriptor::new(1024, BufferUsage::Vertex).with_label("octree vertices");
        assert_eq!(desc.size, 1024);
        assert_eq!(desc.usage, BufferUsage::Vertex);
        assert_eq!(desc.label.as_deref(), Some("octree vertices"));
    }

    #[test]
    fn test_index_format_size() {
        assert_eq!(IndexFormat::default(), IndexFormat::Uint32);
        assert_eq!(IndexFormat::Uint16.size(), 2);
    }
}
