//! The input process model.
//!
//! This is the contract a BPMN parser fulfills: a flat, already-resolved view
//! of the diagram. Node and flow references are plain ids; the converter
//! never follows object pointers and never mutates this model.

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Point};

/// A parsed BPMN document: one or more processes plus the message flows
/// connecting them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessModel {
    pub processes: Vec<Process>,
    /// Inter-process flows. Only `FlowKind::Message` entries are honored.
    pub message_flows: Vec<Flow>,
}

/// A single process (pool) with its flow nodes and sequence/association
/// flows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Process {
    pub id: String,
    pub name: String,
    pub nodes: Vec<Node>,
    pub flows: Vec<Flow>,
}

impl Process {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A flow node or artifact inside a process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub bounds: Bounds,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: &str, name: &str, kind: NodeKind) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            bounds: Bounds::default(),
            kind,
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Nodes that map one-to-one onto a single transition (before any task
    /// expansion): tasks and non-boundary events.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::StartEvent
                | NodeKind::EndEvent
                | NodeKind::Task(_)
                | NodeKind::IntermediateThrowEvent
                | NodeKind::IntermediateCatchEvent
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    StartEvent,
    EndEvent,
    Task(TaskKind),
    Gateway(GatewayKind),
    IntermediateThrowEvent,
    IntermediateCatchEvent,
    /// Attached to the border of the activity named by `attached_to`. Only
    /// interrupting events take part in conversion.
    BoundaryEvent {
        attached_to: String,
        interrupting: bool,
    },
    /// Data objects, annotations and the like. Elided before conversion.
    Artifact,
}

/// The activity flavor. All flavors convert identically; the distinction is
/// preserved for callers that render or post-process the input model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Abstract,
    User,
    Service,
    Send,
    Receive,
    Script,
    Manual,
    BusinessRule,
    SubProcess,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayKind {
    Exclusive,
    Parallel,
    Inclusive,
    EventBased,
    Complex,
}

/// A directed edge of the diagram.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub source: String,
    pub target: String,
    pub kind: FlowKind,
    /// Rendered routing of the edge, in diagram order. Interior waypoints
    /// are copied onto the resulting arcs as rendering hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<Point>,
}

impl Flow {
    pub fn new(id: &str, source: &str, target: &str, kind: FlowKind) -> Self {
        Self {
            id: id.to_owned(),
            name: String::new(),
            source: source.to_owned(),
            target: target.to_owned(),
            kind,
            waypoints: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<Point>) -> Self {
        self.waypoints = waypoints;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    Sequence,
    Message,
    Association,
}
