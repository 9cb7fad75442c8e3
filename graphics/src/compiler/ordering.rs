//! Dependency resolution and stage ordering.

use std::collections::HashMap;

use slotmap::SecondaryMap;

use crate::error::ConfigurationError;
use crate::graph::{RenderGraph, ResourceHandle, Stage, StageHandle, StageRegistry};

/// Stages writing each resource, in declaration order.
pub(crate) type WriterIndex = HashMap<ResourceHandle, Vec<StageHandle>>;

pub(crate) fn writer_index(stages: &StageRegistry) -> WriterIndex {
    let mut writers = WriterIndex::new();
    for (handle, stage) in stages.iter() {
        for &resource in stage.writes() {
            writers.entry(resource).or_default().push(handle);
        }
    }
    writers
}

/// Everything a stage consumes: its declared reads followed by the resources
/// of the descriptors it uses.
pub(crate) fn stage_inputs(graph: &RenderGraph, stage: &Stage) -> Vec<ResourceHandle> {
    let mut inputs = stage.reads().to_vec();
    let descriptor_resources = stage
        .descriptors()
        .iter()
        .filter_map(|&handle| graph.descriptor(handle))
        .flat_map(|descriptor| descriptor.resources());
    for resource in descriptor_resources {
        if !inputs.contains(&resource) {
            inputs.push(resource);
        }
    }
    inputs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first post-order traversal over "reads from a writer" edges.
struct Traversal<'a> {
    graph: &'a RenderGraph,
    writers: &'a WriterIndex,
    detect_cycles: bool,
    marks: SecondaryMap<StageHandle, Mark>,
    path: Vec<StageHandle>,
    order: Vec<StageHandle>,
}

impl Traversal<'_> {
    fn visit(&mut self, handle: StageHandle) -> Result<(), ConfigurationError> {
        match self.marks.get(handle) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) if self.detect_cycles => return Err(self.cycle(handle)),
            Some(Mark::Visiting) => return Ok(()),
            None => {}
        }

        let graph = self.graph;
        let writers = self.writers;
        let Some(stage) = graph.stages().get(handle) else {
            return Ok(());
        };

        self.marks.insert(handle, Mark::Visiting);
        self.path.push(handle);
        for input in stage_inputs(graph, stage) {
            let producers = writers.get(&input).map(Vec::as_slice).unwrap_or_default();
            for &writer in producers {
                // Read-modify-write of the same resource is not a dependency.
                if writer != handle {
                    self.visit(writer)?;
                }
            }
        }
        self.path.pop();
        self.marks.insert(handle, Mark::Done);
        self.order.push(handle);
        Ok(())
    }

    fn cycle(&self, closing: StageHandle) -> ConfigurationError {
        let start = self
            .path
            .iter()
            .position(|&handle| handle == closing)
            .unwrap_or(0);
        let stages = self.path[start..]
            .iter()
            .chain(std::iter::once(&closing))
            .map(|&handle| self.graph.stages().describe(handle))
            .collect();
        ConfigurationError::Cycle { stages }
    }
}

/// Order the stages contributing to `target`.
///
/// Every writer of a resource precedes every stage reading it, each stage
/// appears once, and stages that cannot reach `target` are left out.
pub(crate) fn order_stages(
    graph: &RenderGraph,
    writers: &WriterIndex,
    target: ResourceHandle,
    detect_cycles: bool,
) -> Result<Vec<StageHandle>, ConfigurationError> {
    let mut traversal = Traversal {
        graph,
        writers,
        detect_cycles,
        marks: SecondaryMap::new(),
        path: Vec::new(),
        order: Vec::new(),
    };
    for &writer in writers.get(&target).map(Vec::as_slice).unwrap_or_default() {
        traversal.visit(writer)?;
    }
    Ok(traversal.order)
}
