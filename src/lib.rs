//! Translate BPMN process diagrams into Petri nets.
//!
//! The input is a parsed process model ([`bpmn::ProcessModel`]): processes,
//! their nodes (tasks, events, gateways) and flows, plus inter-process
//! message flows. The output is a [`petri::PetriNet`]: a bipartite graph of
//! places and transitions with an initial marking, ready for token-game
//! simulation or export.
//!
//! ```
//! use bpmn2petri::bpmn::{Flow, FlowKind, Node, NodeKind, Process, ProcessModel, TaskKind};
//! use bpmn2petri::convert;
//!
//! let model = ProcessModel {
//!     processes: vec![Process {
//!         id: "p1".into(),
//!         name: "Order".into(),
//!         nodes: vec![
//!             Node::new("start", "Received", NodeKind::StartEvent),
//!             Node::new("check", "Check stock", NodeKind::Task(TaskKind::Abstract)),
//!             Node::new("end", "Done", NodeKind::EndEvent),
//!         ],
//!         flows: vec![
//!             Flow::new("f1", "start", "check", FlowKind::Sequence),
//!             Flow::new("f2", "check", "end", FlowKind::Sequence),
//!         ],
//!     }],
//!     message_flows: vec![],
//! };
//!
//! let net = convert(&model).unwrap();
//! assert!(net.get_node("check").is_some());
//! ```

pub mod bpmn;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod petri;

pub use convert::{convert, convert_with, ConvertOptions, XorStyle};
pub use error::{ConvertError, ModelError};
pub use petri::PetriNet;
