//! Pixel and vertex attribute formats.

/// Data format of a texel or a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Format {
    // 8-bit per channel
    R8Unorm,
    Rg8Unorm,
    #[default]
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,

    // 16-bit per channel
    R16Float,
    Rg16Float,
    Rgba16Float,

    // 32-bit per channel
    R32Uint,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,

    // Depth/stencil
    Depth16Unorm,
    Depth32Float,
    Depth24UnormStencil8,
    Depth32FloatStencil8,
}

impl Format {
    /// Returns true if this is a depth or depth/stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth32Float
                | Self::Depth24UnormStencil8
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if the format carries a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24UnormStencil8 | Self::Depth32FloatStencil8)
    }

    /// Size of one texel or attribute in bytes.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float | Self::Depth16Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::Bgra8Srgb
            | Self::Rg16Float
            | Self::R32Uint
            | Self::R32Float
            | Self::Depth32Float
            | Self::Depth24UnormStencil8 => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(Format::Depth32FloatStencil8.is_depth_stencil());
        assert!(Format::Depth32FloatStencil8.has_stencil());
        assert!(Format::Depth32Float.is_depth_stencil());
        assert!(!Format::Depth32Float.has_stencil());
        assert!(!Format::Bgra8Srgb.is_depth_stencil());
    }

    #[test]
    fn test_block_size() {
        assert_eq!(Format::Rgb32Float.block_size(), 12);
        assert_eq!(Format::Rgba8Unorm.block_size(), 4);
        assert_eq!(Format::R8Unorm.block_size(), 1);
    }
}
