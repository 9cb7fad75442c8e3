//! Logical resources and the registry that owns them.

use bytemuck::Pod;
use slotmap::{SlotMap, new_key_type};

use crate::types::{BufferUsage, Extent2d, Format, IndexFormat, TextureUsage, VertexAttribute};

new_key_type! {
    /// Handle to a buffer resource in a [`ResourceRegistry`].
    pub struct BufferHandle;
    /// Handle to a texture resource in a [`ResourceRegistry`].
    pub struct TextureHandle;
}

/// Handle to either kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

impl From<BufferHandle> for ResourceHandle {
    fn from(handle: BufferHandle) -> Self {
        Self::Buffer(handle)
    }
}

impl From<TextureHandle> for ResourceHandle {
    fn from(handle: TextureHandle) -> Self {
        Self::Texture(handle)
    }
}

/// Per-frame callback of a buffer resource.
pub type BufferUpdateFn = Box<dyn FnMut(&mut BufferResource)>;

/// Per-frame callback of a texture resource.
pub type TextureUpdateFn = Box<dyn FnMut(&mut TextureResource)>;

/// A logical buffer and its CPU-side staging data.
pub struct BufferResource {
    name: String,
    usage: BufferUsage,
    element_size: u32,
    attributes: Vec<VertexAttribute>,
    index_format: IndexFormat,
    data: Vec<u8>,
    dirty: bool,
    external: bool,
    /// Bumped whenever the vertex layout changes.
    layout_revision: u64,
    update: Option<BufferUpdateFn>,
}

impl BufferResource {
    pub(crate) fn new(name: String, usage: BufferUsage, update: Option<BufferUpdateFn>) -> Self {
        Self {
            name,
            usage,
            element_size: 0,
            attributes: Vec::new(),
            index_format: IndexFormat::default(),
            data: Vec::new(),
            dirty: false,
            external: false,
            layout_revision: 0,
            update,
        }
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Size of one element in bytes, used as the vertex stride.
    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Vertex attributes. The shader location of an attribute is its index.
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    /// Current staging data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the staging data changed since the physical buffer was built.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Append a vertex attribute at the next shader location.
    pub fn add_vertex_attribute(&mut self, format: Format, offset: u32) -> &mut Self {
        self.attributes.push(VertexAttribute::new(format, offset));
        self.layout_changed();
        self
    }

    pub fn set_element_size(&mut self, size: u32) -> &mut Self {
        if self.element_size != size {
            self.element_size = size;
            self.layout_changed();
        }
        self
    }

    pub fn set_index_format(&mut self, format: IndexFormat) -> &mut Self {
        self.index_format = format;
        self
    }

    /// Declare that the buffer is supplied from outside the graph, so stages
    /// may read it without a writer.
    pub fn mark_external(&mut self) -> &mut Self {
        self.external = true;
        self
    }

    /// Replace the staging data and mark the buffer dirty.
    ///
    /// The element size defaults to the size of `T` if it was never set.
    pub fn request_update<T: Pod>(&mut self, data: &[T]) {
        if self.element_size == 0 {
            self.set_element_size(std::mem::size_of::<T>() as u32);
        }
        self.request_update_bytes(bytemuck::cast_slice(data));
    }

    /// Replace the staging data with raw bytes and mark the buffer dirty.
    pub fn request_update_bytes(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.dirty = true;
    }

    /// Number of whole elements in the staging data.
    pub fn element_count(&self) -> u32 {
        match self.element_size {
            0 => 0,
            size => (self.data.len() / size as usize) as u32,
        }
    }

    pub(crate) fn has_external_supply(&self) -> bool {
        self.external || self.update.is_some() || !self.data.is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Only vertex buffers feed pipeline vertex input.
    fn layout_changed(&mut self) {
        if self.usage == BufferUsage::Vertex {
            self.layout_revision += 1;
        }
    }

    pub(crate) fn layout_revision(&self) -> u64 {
        self.layout_revision
    }

    pub(crate) fn run_update(&mut self) {
        if let Some(mut update) = self.update.take() {
            update(self);
            self.update = Some(update);
        }
    }
}

impl std::fmt::Debug for BufferResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferResource")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("element_size", &self.element_size)
            .field("attributes", &self.attributes)
            .field("bytes", &self.data.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// A logical texture and its CPU-side staging data.
pub struct TextureResource {
    name: String,
    usage: TextureUsage,
    format: Format,
    extent: Option<Extent2d>,
    data: Vec<u8>,
    dirty: bool,
    external: bool,
    update: Option<TextureUpdateFn>,
}

impl TextureResource {
    pub(crate) fn new(
        name: String,
        usage: TextureUsage,
        format: Format,
        extent: Option<Extent2d>,
        update: Option<TextureUpdateFn>,
    ) -> Self {
        Self {
            name,
            usage,
            format,
            extent,
            data: Vec::new(),
            dirty: false,
            external: false,
            update,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Explicit extent, if the texture does not follow the surface extent.
    pub fn extent(&self) -> Option<Extent2d> {
        self.extent
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn mark_external(&mut self) -> &mut Self {
        self.external = true;
        self
    }

    /// Replace the texel data and mark the texture dirty.
    ///
    /// Data must be tightly packed and cover the whole texture.
    pub fn request_update<T: Pod>(&mut self, data: &[T]) {
        self.data.clear();
        self.data.extend_from_slice(bytemuck::cast_slice(data));
        self.dirty = true;
    }

    pub(crate) fn has_external_supply(&self) -> bool {
        self.external || self.update.is_some() || !self.data.is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn run_update(&mut self) {
        if let Some(mut update) = self.update.take() {
            update(self);
            self.update = Some(update);
        }
    }
}

impl std::fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureResource")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Owner of all logical resources of a graph.
///
/// Stage update callbacks receive the registry mutably so they can request
/// resource updates; declaring new resources goes through the graph.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    buffers: SlotMap<BufferHandle, BufferResource>,
    textures: SlotMap<TextureHandle, TextureResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_buffer(&mut self, buffer: BufferResource) -> BufferHandle {
        self.buffers.insert(buffer)
    }

    pub(crate) fn insert_texture(&mut self, texture: TextureResource) -> TextureHandle {
        self.textures.insert(texture)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferResource> {
        self.buffers.get(handle)
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut BufferResource> {
        self.buffers.get_mut(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.textures.get(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut TextureResource> {
        self.textures.get_mut(handle)
    }

    /// All buffers in declaration order.
    pub fn buffers(&self) -> impl Iterator<Item = (BufferHandle, &BufferResource)> {
        self.buffers.iter()
    }

    /// All textures in declaration order.
    pub fn textures(&self) -> impl Iterator<Item = (TextureHandle, &TextureResource)> {
        self.textures.iter()
    }

    pub(crate) fn buffers_mut(
        &mut self,
    ) -> impl Iterator<Item = (BufferHandle, &mut BufferResource)> {
        self.buffers.iter_mut()
    }

    pub(crate) fn textures_mut(
        &mut self,
    ) -> impl Iterator<Item = (TextureHandle, &mut TextureResource)> {
        self.textures.iter_mut()
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        match handle {
            ResourceHandle::Buffer(handle) => self.buffers.contains_key(handle),
            ResourceHandle::Texture(handle) => self.textures.contains_key(handle),
        }
    }

    /// Debug name of a resource, if it exists.
    pub fn name(&self, handle: ResourceHandle) -> Option<&str> {
        match handle {
            ResourceHandle::Buffer(handle) => self.buffer(handle).map(BufferResource::name),
            ResourceHandle::Texture(handle) => self.texture(handle).map(TextureResource::name),
        }
    }

    /// Name for diagnostics, falling back to the handle for unknown resources.
    pub(crate) fn describe(&self, handle: ResourceHandle) -> String {
        self.name(handle)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{handle:?}"))
    }

    pub(crate) fn has_external_supply(&self, handle: ResourceHandle) -> bool {
        match handle {
            ResourceHandle::Buffer(handle) => self
                .buffer(handle)
                .is_some_and(BufferResource::has_external_supply),
            ResourceHandle::Texture(handle) => self
                .texture(handle)
                .is_some_and(TextureResource::has_external_supply),
        }
    }

    /// Sum of the vertex-layout revisions of every buffer.
    pub(crate) fn layout_revision(&self) -> u64 {
        self.buffers
            .values()
            .map(BufferResource::layout_revision)
            .sum()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}
