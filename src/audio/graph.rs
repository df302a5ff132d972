//! Audio graph provider contracts
//!
//! The OS audio graph and loopback capture device are external collaborators;
//! these traits are the narrow surface the capture engine needs from them.

use super::types::AudioFrame;
use crate::error::Result;

/// Identifier of a node inside one graph instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Structured status reported when graph or node creation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCreationStatus {
    DeviceNotAvailable,
    FormatNotSupported,
    AccessDenied,
    UnknownFailure,
}

/// Graph format settings requested at creation
#[derive(Debug, Clone, Copy)]
pub struct GraphSettings {
    pub sample_rate: u32,
    pub channels: u32,
}

/// Generator installed on a frame-input node.
///
/// Invoked from the graph's quantum callback thread with the number of
/// samples required this quantum; returning `None` emits nothing (silence by
/// omission). Dropping the node drops the generator — unsubscription is part
/// of the node's scoped release.
pub type QuantumGenerator = Box<dyn FnMut(usize) -> Option<AudioFrame> + Send>;

/// Trait for audio graph implementations
#[async_trait::async_trait]
pub trait AudioGraph: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u32;

    /// Create the device-input (microphone) node
    async fn add_device_input(&mut self) -> std::result::Result<NodeId, NodeCreationStatus>;

    /// Create a frame-input node driven by the given quantum generator
    fn add_frame_input(
        &mut self,
        generator: QuantumGenerator,
    ) -> std::result::Result<NodeId, NodeCreationStatus>;

    /// Create the frame-output tap
    fn add_frame_output(&mut self) -> std::result::Result<NodeId, NodeCreationStatus>;

    /// Create a sub-mix node
    fn add_submix(&mut self) -> std::result::Result<NodeId, NodeCreationStatus>;

    /// Connect a node's output into another node
    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()>;

    /// Set a node's outgoing gain
    fn set_gain(&mut self, node: NodeId, gain: f64) -> Result<()>;

    /// Read a node's outgoing gain, if the node exists
    fn gain(&self, node: NodeId) -> Option<f64>;

    /// Start the graph transport
    fn start(&mut self) -> Result<()>;

    /// Stop the graph transport
    fn stop(&mut self) -> Result<()>;

    /// Pull the most recent frame from a frame-output tap
    fn read_output(&mut self, node: NodeId) -> Option<AudioFrame>;

    /// Release a node and everything registered on it
    fn release_node(&mut self, node: NodeId);
}

/// Trait for audio graph providers
#[async_trait::async_trait]
pub trait AudioGraphProvider: Send + Sync {
    async fn create_graph(
        &self,
        settings: GraphSettings,
    ) -> std::result::Result<Box<dyn AudioGraph>, NodeCreationStatus>;
}

/// Callback receiving raw captured loopback bytes on the driver thread
pub type LoopbackDataFn = Box<dyn FnMut(&[u8]) + Send>;

/// Trait for system loopback capture devices
pub trait LoopbackCapture: Send {
    /// Begin capture, delivering raw bytes to `on_data`
    fn start(&mut self, on_data: LoopbackDataFn) -> Result<()>;

    /// Stop capture and release the device
    fn stop(&mut self) -> Result<()>;
}
