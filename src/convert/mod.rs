//! The conversion pipeline.
//!
//! Conversion is a fixed sequence of passes over the input model. Per
//! process: artifacts are elided, tasks and events become transitions
//! (expanding into start/end halves where needed), interrupting boundary
//! events are wired against their host's execution place, gateways are
//! decomposed, and the remaining sequence flows become arcs with bipartite
//! midpoints. Globally: message flows and deferred links are resolved,
//! collapsed XOR transitions are exploded into per-branch conflicts,
//! scheduled removals run, start/end places are added and unified, and the
//! initial marking is assigned. Resolution runs before explosion so a
//! deferred link can never dangle on a divided gateway, and so the division
//! sees every arc the gateway will carry.
//!
//! The input model is never mutated. Where the conversion redirects a flow
//! to a synthetic node (task end halves, boundary out-places) it records the
//! redirect in a routing table consulted by every later pass.

mod gateway;

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::bpmn::{Flow, FlowKind, Node, NodeKind, Process, ProcessModel};
use crate::error::{ConvertError, ModelError};
use crate::geometry::Point;
use crate::petri::{ArcId, NodeRef, PetriNet, PlaceId, TransitionId, TransitionKind};

/// How exclusive gateways materialize in the net.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XorStyle {
    /// A pure split or join becomes a single XOR-tagged transition; the
    /// explosion pass later divides it into one conflicting transition per
    /// branch.
    #[default]
    Collapsed,
    /// A pure split or join becomes a choice place with a Choosing
    /// transition and Chosen place per branch.
    Expanded,
}

/// Knobs for a conversion run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvertOptions {
    /// Expand every task into start/end halves around an execution place,
    /// not just tasks carrying interrupting boundary events.
    pub timed_tasks: bool,
    pub xor: XorStyle,
}

/// Convert a process model with default options.
pub fn convert(model: &ProcessModel) -> Result<PetriNet, ConvertError> {
    convert_with(model, ConvertOptions::default())
}

/// Convert a process model.
pub fn convert_with(
    model: &ProcessModel,
    options: ConvertOptions,
) -> Result<PetriNet, ConvertError> {
    Converter::new(model, options).run()
}

/// An arc recorded during gateway decomposition whose far endpoint did not
/// exist in the net yet. Resolved after all nodes are in place.
#[derive(Debug)]
enum DeferredLink {
    /// Chosen place of an expanded split → a node converted later.
    SplitOut {
        from: PlaceId,
        target: String,
        process: String,
    },
    /// A node converted later → Choosing place of an expanded join.
    JoinIn {
        source: String,
        place: PlaceId,
        process: String,
    },
    /// A node converted later → the join side of a mixed gateway.
    MixedJoinIn {
        source: String,
        target: NodeRef,
        process: String,
    },
    /// The split side of a mixed gateway → a node converted later.
    MixedSplitOut {
        from: NodeRef,
        target: String,
        process: String,
    },
}

#[derive(Debug, Default)]
struct Removals {
    arcs: Vec<ArcId>,
    transitions: Vec<TransitionId>,
}

/// Name and position of a resolved flow endpoint, whether it came from the
/// input model or from a synthetic net node.
pub(crate) struct Endpoint {
    pub id: String,
    pub name: String,
    pub at: Point,
}

pub(crate) struct Converter<'a> {
    model: &'a ProcessModel,
    options: ConvertOptions,
    net: PetriNet,
    deferred: Vec<DeferredLink>,
    removals: Removals,
    /// Host task id → the place holding a token while the task executes.
    execution_places: HashMap<String, PlaceId>,
    /// Flow id → the net node the flow now originates from.
    reroutes: HashMap<String, String>,
    /// Flows already wired by a gateway rule; skipped by flow conversion.
    consumed: HashSet<String>,
}

impl<'a> Converter<'a> {
    fn new(model: &'a ProcessModel, options: ConvertOptions) -> Self {
        Self {
            model,
            options,
            net: PetriNet::new(),
            deferred: Vec::new(),
            removals: Removals::default(),
            execution_places: HashMap::new(),
            reroutes: HashMap::new(),
            consumed: HashSet::new(),
        }
    }

    fn run(mut self) -> Result<PetriNet, ConvertError> {
        let model = self.model;

        for process in &model.processes {
            debug!(process = %process.id, "converting process");
            let flows = self.elide_artifacts(process);

            // 1. tasks and events
            for node in &process.nodes {
                if node.is_atomic() {
                    self.convert_atomic(node, process, &flows);
                }
            }

            // 2. interrupting boundary events
            for node in &process.nodes {
                if let NodeKind::BoundaryEvent {
                    attached_to,
                    interrupting: true,
                } = &node.kind
                {
                    self.wire_boundary_interrupt(node, attached_to, process, &flows);
                }
            }

            // 3. gateways
            for node in &process.nodes {
                if let NodeKind::Gateway(kind) = &node.kind {
                    self.convert_gateway(node, *kind, process, &flows)?;
                }
            }

            // 4. remaining sequence flows
            for flow in &flows {
                if flow.kind != FlowKind::Sequence || self.consumed.contains(&flow.id) {
                    continue;
                }
                self.convert_flow(flow, Some(&process.id))
                    .map_err(|source| ConvertError::Flow {
                        process: process.id.clone(),
                        flow: flow.id.clone(),
                        source,
                    })?;
            }
        }

        // 5. message flows
        for flow in &model.message_flows {
            if flow.kind != FlowKind::Message {
                continue;
            }
            self.convert_flow(flow, None)
                .map_err(|source| ConvertError::MessageFlow {
                    flow: flow.id.clone(),
                    source,
                })?;
        }

        // 6. deferred gateway links, while every collapsed gateway
        // transition still exists and before explosion snapshots arities
        self.resolve_deferred();

        // 7. divide collapsed XOR transitions into per-branch conflicts
        self.explode_xor();

        // 8. scheduled removals, arcs before transitions
        let removals = std::mem::take(&mut self.removals);
        for arc in &removals.arcs {
            self.net.remove_arc(arc);
        }
        for transition in &removals.transitions {
            self.net.remove_transition(transition);
        }

        // 9. per-process start/end places, then global unification
        self.add_start_end();
        self.unify_start_end();

        // 10. marking
        self.net.assign_initial_marking();

        Ok(self.net)
    }

    // ─── artifacts ───

    /// Working copy of a process's flows with artifacts routed around:
    /// for every artifact, each (incoming association, outgoing association)
    /// pair with live endpoints becomes a synthetic sequence flow, and the
    /// associations themselves are dropped.
    fn elide_artifacts(&self, process: &Process) -> Vec<Flow> {
        let mut synthesized: Vec<Flow> = Vec::new();
        let mut dropped: HashSet<String> = HashSet::new();

        for node in &process.nodes {
            if !matches!(node.kind, NodeKind::Artifact) {
                continue;
            }
            let incoming: Vec<&Flow> = process
                .flows
                .iter()
                .filter(|f| f.kind == FlowKind::Association && f.target == node.id)
                .collect();
            let outgoing: Vec<&Flow> = process
                .flows
                .iter()
                .filter(|f| f.kind == FlowKind::Association && f.source == node.id)
                .collect();
            for inf in &incoming {
                for outf in &outgoing {
                    if process.node(&inf.source).is_none() || process.node(&outf.target).is_none()
                    {
                        continue;
                    }
                    let mut waypoints = inf.waypoints.clone();
                    waypoints.extend_from_slice(&outf.waypoints);
                    synthesized.push(
                        Flow::new(
                            &format!("{}_to_{}", inf.source, outf.target),
                            &inf.source,
                            &outf.target,
                            FlowKind::Sequence,
                        )
                        .with_waypoints(waypoints),
                    );
                    dropped.insert(inf.id.clone());
                    dropped.insert(outf.id.clone());
                }
            }
        }

        let mut flows: Vec<Flow> = process
            .flows
            .iter()
            .filter(|f| !dropped.contains(&f.id))
            .cloned()
            .collect();
        flows.extend(synthesized);
        flows
    }

    // ─── tasks and events ───

    fn convert_atomic(&mut self, node: &Node, process: &Process, flows: &[Flow]) {
        let at = node.bounds.center();
        let pid = Some(process.id.as_str());
        let has_boundary = self.has_interrupting_boundary(node, process);
        let expand =
            matches!(node.kind, NodeKind::Task(_)) && (self.options.timed_tasks || has_boundary);

        // the start half keeps the task id, so inbound flows need no reroute
        let name = if expand {
            format!("{}_start", node.name)
        } else {
            node.name.clone()
        };
        let transition = self
            .net
            .add_transition(&node.id, &name, at, TransitionKind::Plain, pid);

        if expand {
            self.expand_task(node, &transition, process, flows, has_boundary);
            return;
        }

        match node.kind {
            // message-triggered starts wait for the message rather than the
            // initial token
            NodeKind::StartEvent => {
                if !self.has_incoming_message_flow(&node.id) {
                    self.net.register_start_transition(&transition, &process.id);
                }
            }
            NodeKind::EndEvent => {
                if !self.has_outgoing_message_flow(&node.id) {
                    self.net.register_end_transition(&transition, &process.id);
                }
            }
            _ => {}
        }
    }

    /// Split a task into begin/end transitions around an execution place,
    /// and re-point its outgoing flows at the end half.
    fn expand_task(
        &mut self,
        node: &Node,
        start: &TransitionId,
        process: &Process,
        flows: &[Flow],
        has_boundary: bool,
    ) {
        let outgoing: Vec<&Flow> = flows
            .iter()
            .filter(|f| f.kind == FlowKind::Sequence && f.source == node.id)
            .collect();
        if outgoing.is_empty() && !has_boundary {
            return;
        }

        let at = node.bounds.center();
        let pid = Some(process.id.as_str());

        // aim the end half at the first routed successor, falling back to a
        // spot just past the task shape
        let onward = outgoing
            .iter()
            .find(|f| f.waypoints.len() > 1)
            .and_then(|f| f.waypoints.get(1).copied())
            .unwrap_or_else(|| {
                Point::new(
                    node.bounds.x + node.bounds.width + 50.0,
                    node.bounds.y + node.bounds.height / 2.0,
                )
            });
        let end_at = at.midpoint(onward);

        let end_id = format!("{}_end", node.id);
        let end = self.net.add_transition(
            &end_id,
            &format!("{}_end", node.name),
            end_at,
            TransitionKind::Plain,
            pid,
        );
        let link = self.net.add_place(
            &format!("{}_link", node.id),
            &format!("{}_link", node.name),
            at.midpoint(end_at),
            pid,
        );
        self.net.link_tp(start, &link, pid);
        self.net.link_pt(&link, &end, pid);

        for flow in &outgoing {
            self.reroutes.insert(flow.id.clone(), end_id.clone());
        }
        let model = self.model;
        for flow in &model.message_flows {
            if flow.kind == FlowKind::Message && flow.source == node.id {
                self.reroutes.insert(flow.id.clone(), end_id.clone());
            }
        }
        if has_boundary {
            self.execution_places.insert(node.id.clone(), link);
        }
    }

    fn has_interrupting_boundary(&self, node: &Node, process: &Process) -> bool {
        process.nodes.iter().any(|n| {
            matches!(&n.kind, NodeKind::BoundaryEvent { attached_to, interrupting: true }
                if *attached_to == node.id)
        })
    }

    fn has_incoming_message_flow(&self, id: &str) -> bool {
        self.model
            .message_flows
            .iter()
            .any(|f| f.kind == FlowKind::Message && f.target == id)
    }

    fn has_outgoing_message_flow(&self, id: &str) -> bool {
        self.model
            .message_flows
            .iter()
            .any(|f| f.kind == FlowKind::Message && f.source == id)
    }

    // ─── boundary events ───

    /// An interrupting boundary event races against the host task's end
    /// transition for the token on the execution place.
    fn wire_boundary_interrupt(
        &mut self,
        event: &Node,
        attached_to: &str,
        process: &Process,
        flows: &[Flow],
    ) {
        let Some(exec) = self.execution_places.get(attached_to).cloned() else {
            warn!(
                task = attached_to,
                event = %event.id,
                "no execution place for host task, skipping boundary event"
            );
            return;
        };

        let at = event.bounds.center();
        let pid = Some(process.id.as_str());
        let name = if event.name.is_empty() {
            "interrupt"
        } else {
            event.name.as_str()
        };
        let interrupt = self.net.add_transition(
            &format!("{}_int", event.id),
            name,
            at,
            TransitionKind::Plain,
            pid,
        );
        self.net.link_pt(&exec, &interrupt, pid);

        let outgoing: Vec<&Flow> = flows
            .iter()
            .filter(|f| f.kind == FlowKind::Sequence && f.source == event.id)
            .collect();
        let below = Point::new(at.x, at.y + 50.0);
        if outgoing.is_empty() {
            // nowhere to go: the interrupt still needs to consume the token
            let sink = self
                .net
                .add_place(&format!("{}_sink", event.id), "", below, pid);
            self.net.link_tp(&interrupt, &sink, pid);
        } else {
            let out_id = format!("{}_out", event.id);
            let out = self.net.add_place(&out_id, "", below, pid);
            self.net.link_tp(&interrupt, &out, pid);
            for flow in &outgoing {
                self.reroutes.insert(flow.id.clone(), out_id.clone());
            }
        }
    }

    // ─── flows ───

    /// Where a flow originates from in the net, honoring reroutes.
    fn flow_source_id<'f>(&'f self, flow: &'f Flow) -> &'f str {
        self.reroutes
            .get(&flow.id)
            .map(String::as_str)
            .unwrap_or(&flow.source)
    }

    /// Resolve a flow's source to an id/name/position triple. Prefers the
    /// input model; falls back to the net for synthetic reroute targets.
    pub(crate) fn source_endpoint(&self, flow: &Flow, process: &Process) -> Option<Endpoint> {
        let id = self.flow_source_id(flow);
        if let Some(node) = process.node(id) {
            return Some(Endpoint {
                id: node.id.clone(),
                name: node.name.clone(),
                at: node.bounds.center(),
            });
        }
        let node = self.net.get_node(id)?;
        let (name, at) = match &node {
            NodeRef::Place(p) => {
                let p = self.net.place(p)?;
                (p.name.clone(), p.at)
            }
            NodeRef::Transition(t) => {
                let t = self.net.transition(t)?;
                (t.name.clone(), t.at)
            }
        };
        Some(Endpoint {
            id: id.to_owned(),
            name,
            at,
        })
    }

    /// Turn one flow into arcs. Same-kind endpoints get a midpoint node of
    /// the opposite kind; interior diagram waypoints are copied onto the
    /// final arc as rendering hints.
    fn convert_flow(&mut self, flow: &Flow, process: Option<&str>) -> Result<(), ModelError> {
        let source = match self.reroutes.get(&flow.id) {
            // a reroute always names a node this converter created itself
            Some(id) => Some(
                self.net
                    .get_node(id)
                    .ok_or_else(|| ModelError::MissingNode(id.clone()))?,
            ),
            None => self.net.get_node(&flow.source),
        };
        let target = self.net.get_node(&flow.target);
        let (Some(source), Some(target)) = (source, target) else {
            warn!(
                flow = %flow.id,
                from = %flow.source,
                to = %flow.target,
                "skipping flow with unresolved endpoint"
            );
            return Ok(());
        };

        let mid = if flow.waypoints.len() > 2 {
            flow.waypoints[1]
        } else {
            self.net
                .position(&source)
                .midpoint(self.net.position(&target))
        };

        match (&source, &target) {
            (NodeRef::Transition(s), NodeRef::Transition(t)) => {
                // "step done, next step enabled"
                let place = self.net.add_place(&flow.id, &flow.name, mid, process);
                self.net.link_tp(s, &place, process);
                let arc = self.net.link_pt(&place, t, process);
                self.copy_hint_waypoints(&arc, flow, 2);
            }
            (NodeRef::Place(s), NodeRef::Place(t)) => {
                let transition = self.net.add_transition(
                    &flow.id,
                    &flow.name,
                    mid,
                    TransitionKind::Plain,
                    process,
                );
                self.net.link_pt(s, &transition, process);
                let arc = self.net.link_tp(&transition, t, process);
                self.copy_hint_waypoints(&arc, flow, 2);
            }
            (NodeRef::Place(s), NodeRef::Transition(t)) => {
                let arc = self.net.link_pt(s, t, process);
                self.copy_hint_waypoints(&arc, flow, 1);
            }
            (NodeRef::Transition(s), NodeRef::Place(t)) => {
                let arc = self.net.link_tp(s, t, process);
                self.copy_hint_waypoints(&arc, flow, 1);
            }
        }
        Ok(())
    }

    /// Copy the flow's interior waypoints (skipping the first `skip` and the
    /// last) onto an arc.
    fn copy_hint_waypoints(&mut self, arc: &ArcId, flow: &Flow, skip: usize) {
        if flow.waypoints.len() <= 2 {
            return;
        }
        let take = flow.waypoints.len().saturating_sub(skip + 1);
        if let Some(arc) = self.net.arc_mut(arc) {
            arc.waypoints
                .extend(flow.waypoints.iter().skip(skip).take(take).copied());
        }
    }

    // ─── generic wiring ───

    /// Wire `source` → `target`, interposing a node of the opposite kind at
    /// the geometric midpoint when the endpoints are the same kind.
    pub(crate) fn connect(
        &mut self,
        source: NodeRef,
        target: NodeRef,
        midpoint_id: &str,
        process: Option<&str>,
    ) {
        match (source, target) {
            (NodeRef::Place(p), NodeRef::Transition(t)) => {
                self.net.link_pt(&p, &t, process);
            }
            (NodeRef::Transition(t), NodeRef::Place(p)) => {
                self.net.link_tp(&t, &p, process);
            }
            (NodeRef::Place(a), NodeRef::Place(b)) => {
                let mid = self
                    .net
                    .position(&NodeRef::Place(a.clone()))
                    .midpoint(self.net.position(&NodeRef::Place(b.clone())));
                let t =
                    self.net
                        .add_transition(midpoint_id, "", mid, TransitionKind::Plain, process);
                self.net.link_pt(&a, &t, process);
                self.net.link_tp(&t, &b, process);
            }
            (NodeRef::Transition(a), NodeRef::Transition(b)) => {
                let mid = self
                    .net
                    .position(&NodeRef::Transition(a.clone()))
                    .midpoint(self.net.position(&NodeRef::Transition(b.clone())));
                let p = self.net.add_place(midpoint_id, "", mid, process);
                self.net.link_tp(&a, &p, process);
                self.net.link_pt(&p, &b, process);
            }
        }
    }

    // ─── deferred links ───

    fn resolve_deferred(&mut self) {
        let links = std::mem::take(&mut self.deferred);
        for link in links {
            match link {
                DeferredLink::SplitOut {
                    from,
                    target,
                    process,
                } => {
                    let Some(target) = self.net.get_node(&target) else {
                        warn!(node = %target, "deferred split link target not found, dropping");
                        continue;
                    };
                    let mid = format!("{}_to_{}", from, target.id());
                    self.connect(NodeRef::Place(from), target, &mid, Some(&process));
                }
                DeferredLink::JoinIn {
                    source,
                    place,
                    process,
                } => {
                    let Some(source) = self.net.get_node(&source) else {
                        warn!(node = %source, "deferred join link source not found, dropping");
                        continue;
                    };
                    let mid = format!("{}_to_{}", source.id(), place);
                    self.connect(source, NodeRef::Place(place), &mid, Some(&process));
                }
                DeferredLink::MixedJoinIn {
                    source,
                    target,
                    process,
                } => {
                    let Some(source) = self.net.get_node(&source) else {
                        warn!(node = %source, "deferred mixed join source not found, dropping");
                        continue;
                    };
                    let mid = format!("{}_to_mixed_{}", source.id(), target.id());
                    self.connect(source, target, &mid, Some(&process));
                }
                DeferredLink::MixedSplitOut {
                    from,
                    target,
                    process,
                } => {
                    let Some(target) = self.net.get_node(&target) else {
                        warn!(node = %target, "deferred mixed split target not found, dropping");
                        continue;
                    };
                    let mid = format!("{}_to_mixed_{}", from.id(), target.id());
                    self.connect(from, target, &mid, Some(&process));
                }
            }
        }
    }

    // ─── start/end ───

    /// Give every process with registered start/end transitions a feeding
    /// `start_p_{process}` place and a collecting `end_p_{process}` place.
    fn add_start_end(&mut self) {
        let starts: Vec<(String, Vec<TransitionId>)> = self
            .net
            .start_transitions()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (process, transitions) in starts {
            if transitions.is_empty() {
                continue;
            }
            let at = self.fringe_position(&transitions, true);
            let place = self
                .net
                .add_place(&format!("start_p_{process}"), "Start", at, Some(&process));
            for t in &transitions {
                self.net.link_pt(&place, t, Some(&process));
            }
            self.net.push_start_place(place);
        }

        let ends: Vec<(String, Vec<TransitionId>)> = self
            .net
            .end_transitions()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (process, transitions) in ends {
            if transitions.is_empty() {
                continue;
            }
            let at = self.fringe_position(&transitions, false);
            let place = self
                .net
                .add_place(&format!("end_p_{process}"), "End", at, Some(&process));
            for t in &transitions {
                self.net.link_tp(t, &place, Some(&process));
            }
            self.net.push_end_place(place);
        }
    }

    /// A spot 100 units outside the extreme x of the given transitions, at
    /// their average y.
    fn fringe_position(&self, transitions: &[TransitionId], left: bool) -> Point {
        let mut x = if left { f64::MAX } else { f64::MIN };
        let mut y = 0.0;
        let mut n = 0usize;
        for t in transitions {
            if let Some(t) = self.net.transition(t) {
                x = if left { x.min(t.at.x) } else { x.max(t.at.x) };
                y += t.at.y;
                n += 1;
            }
        }
        if n == 0 {
            return Point::default();
        }
        Point::new(if left { x - 100.0 } else { x + 100.0 }, y / n as f64)
    }

    /// When several processes contribute start (or end) places, bundle them
    /// behind one global place and transition so the net has a single
    /// source and sink.
    fn unify_start_end(&mut self) {
        let starts = self.net.start_places().to_vec();
        if starts.len() > 1 {
            let at = self.places_fringe(&starts, true);
            let t = self.net.add_transition(
                "start_t",
                "Start",
                at,
                TransitionKind::Plain,
                None,
            );
            for p in &starts {
                self.net.link_tp(&t, p, None);
            }
            let p = self
                .net
                .add_place("start_p", "Start", Point::new(at.x - 100.0, at.y), None);
            self.net.link_pt(&p, &t, None);
        }

        let ends = self.net.end_places().to_vec();
        if ends.len() > 1 {
            let at = self.places_fringe(&ends, false);
            let t = self
                .net
                .add_transition("end_t", "End", at, TransitionKind::Plain, None);
            for p in &ends {
                self.net.link_pt(p, &t, None);
            }
            let p = self
                .net
                .add_place("end_p", "End", Point::new(at.x + 100.0, at.y), None);
            self.net.link_tp(&t, &p, None);
        }
    }

    fn places_fringe(&self, places: &[PlaceId], left: bool) -> Point {
        let mut x = if left { f64::MAX } else { f64::MIN };
        let mut y = 0.0;
        let mut n = 0usize;
        for p in places {
            if let Some(p) = self.net.place(p) {
                x = if left { x.min(p.at.x) } else { x.max(p.at.x) };
                y += p.at.y;
                n += 1;
            }
        }
        if n == 0 {
            return Point::default();
        }
        Point::new(if left { x - 100.0 } else { x + 100.0 }, y / n as f64)
    }
}
