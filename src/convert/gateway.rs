//! Gateway decomposition and the XOR explosion pass.
//!
//! Each gateway kind is dispatched on its arity shape: a pure split (one
//! in, many out), a pure join (many in, one out), or mixed (many in, many
//! out). Degenerate gateways with at most one flow on each side are left
//! unconverted; their flows fall through to generic flow conversion.

use tracing::warn;

use crate::bpmn::{Flow, FlowKind, GatewayKind, Node, NodeKind, Process};
use crate::error::ConvertError;
use crate::geometry::{centroid, power_set, Point};
use crate::petri::{NodeRef, PlaceId, TransitionId, TransitionKind};

use super::{Converter, DeferredLink, XorStyle};

impl Converter<'_> {
    pub(super) fn convert_gateway(
        &mut self,
        gateway: &Node,
        kind: GatewayKind,
        process: &Process,
        flows: &[Flow],
    ) -> Result<(), ConvertError> {
        let incoming: Vec<&Flow> = flows
            .iter()
            .filter(|f| f.kind == FlowKind::Sequence && f.target == gateway.id)
            .collect();
        let outgoing: Vec<&Flow> = flows
            .iter()
            .filter(|f| f.kind == FlowKind::Sequence && f.source == gateway.id)
            .collect();

        match kind {
            GatewayKind::Exclusive => {
                self.convert_exclusive(gateway, process, flows, &incoming, &outgoing)
            }
            GatewayKind::Parallel => self.convert_parallel(gateway, process, &incoming, &outgoing),
            GatewayKind::Inclusive => {
                self.convert_inclusive(gateway, process, &incoming, &outgoing)
            }
            GatewayKind::EventBased => {
                self.convert_event_based(gateway, process, &incoming, &outgoing)
            }
            GatewayKind::Complex => {
                return Err(ConvertError::UnsupportedGateway {
                    id: gateway.id.clone(),
                })
            }
        }
        Ok(())
    }

    // ─── exclusive ───

    fn convert_exclusive(
        &mut self,
        gateway: &Node,
        process: &Process,
        flows: &[Flow],
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        match (incoming.len(), outgoing.len()) {
            (i, o) if i > 1 && o > 1 => {
                self.convert_mixed_exclusive(gateway, process, incoming, outgoing)
            }
            (1, o) if o > 1 => match self.options.xor {
                XorStyle::Collapsed => {
                    self.net.add_transition(
                        &gateway.id,
                        &gateway.name,
                        at,
                        TransitionKind::XorSplit,
                        pid,
                    );
                }
                XorStyle::Expanded => self.expand_xor_split(gateway, process, outgoing),
            },
            (i, 1) if i > 1 => match self.options.xor {
                XorStyle::Collapsed => {
                    self.net.add_transition(
                        &gateway.id,
                        &gateway.name,
                        at,
                        TransitionKind::XorJoin,
                        pid,
                    );
                }
                XorStyle::Expanded => self.expand_xor_join(gateway, process, flows, incoming),
            },
            _ => {}
        }
    }

    /// Expanded split: choice place, then a Choosing transition and a
    /// Chosen place per branch. Firing one Choosing transition resolves
    /// the conflict.
    fn expand_xor_split(&mut self, gateway: &Node, process: &Process, outgoing: &[&Flow]) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let choice = self.net.add_place(&gateway.id, &gateway.name, at, pid);

        for flow in outgoing {
            let Some(target) = process.node(&flow.target) else {
                warn!(flow = %flow.id, to = %flow.target, "split branch target missing");
                continue;
            };
            let target_at = target.bounds.center();
            let choosing = self.net.add_transition(
                &format!("{}_middle_split", target.id),
                &format!("{} Choosing", target.name),
                at.lerp(target_at, 0.3),
                TransitionKind::Plain,
                pid,
            );
            let chosen = self.net.add_place(
                &format!("{}_end_split", target.id),
                &format!("{} Chosen", target.name),
                at.lerp(target_at, 0.6),
                pid,
            );
            self.net.link_pt(&choice, &choosing, pid);
            self.net.link_tp(&choosing, &chosen, pid);

            match self.net.get_node(&flow.target) {
                Some(node) => {
                    let mid = format!("{}_to_{}", chosen, node.id());
                    self.connect(NodeRef::Place(chosen), node, &mid, pid);
                }
                None => self.deferred.push(DeferredLink::SplitOut {
                    from: chosen,
                    target: flow.target.clone(),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }
    }

    /// Expanded join: the mirror image of the split. Branches whose source
    /// is itself an exclusive join or split skip the Choosing/Chosen pair
    /// and share the join place directly via generic flow conversion.
    fn expand_xor_join(
        &mut self,
        gateway: &Node,
        process: &Process,
        flows: &[Flow],
        incoming: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let join = self.net.add_place(&gateway.id, &gateway.name, at, pid);

        for flow in incoming {
            let Some(source) = self.source_endpoint(flow, process) else {
                warn!(flow = %flow.id, from = %flow.source, "join branch source missing");
                continue;
            };
            if shares_join_place(process.node(&source.id), flows) {
                continue;
            }
            let place = self.net.add_place(
                &format!("{}_middle_join", source.id),
                &format!("{} Choosing", source.name),
                source.at.lerp(at, 0.3),
                pid,
            );
            let chosen = self.net.add_transition(
                &format!("{}_end_join", source.id),
                &format!("{} Chosen", source.name),
                source.at.lerp(at, 0.6),
                TransitionKind::Plain,
                pid,
            );

            match self.net.get_node(&source.id) {
                Some(node) => {
                    let mid = format!("{}_to_{}", node.id(), place);
                    self.connect(node, NodeRef::Place(place.clone()), &mid, pid);
                }
                None => self.deferred.push(DeferredLink::JoinIn {
                    source: source.id.clone(),
                    place: place.clone(),
                    process: process.id.clone(),
                }),
            }
            self.net.link_pt(&place, &chosen, pid);
            self.net.link_tp(&chosen, &join, pid);
            self.consumed.insert(flow.id.clone());
        }
    }

    /// A mixed exclusive gateway is a join place and a split place around a
    /// mid transition, in both XOR styles. Never subject to explosion.
    fn convert_mixed_exclusive(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let join = self.net.add_place(
            &format!("{}_j", gateway.id),
            &gateway.name,
            Point::new(at.x - 15.0, at.y),
            pid,
        );
        let split = self.net.add_place(
            &format!("{}_s", gateway.id),
            &gateway.name,
            Point::new(at.x + 15.0, at.y),
            pid,
        );

        for flow in incoming {
            let source_id = match self.source_endpoint(flow, process) {
                Some(endpoint) => endpoint.id,
                None => flow.source.clone(),
            };
            match self.net.get_node(&source_id) {
                Some(node) => {
                    let mid = format!("{}_to_{}", node.id(), gateway.id);
                    self.connect(node, NodeRef::Place(join.clone()), &mid, pid);
                }
                None => self.deferred.push(DeferredLink::MixedJoinIn {
                    source: source_id,
                    target: NodeRef::Place(join.clone()),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }

        let mid = self.net.add_transition(
            &format!("{}_mid", gateway.id),
            &format!("{} mid", gateway.name),
            at,
            TransitionKind::Plain,
            pid,
        );
        self.net.link_pt(&join, &mid, pid);
        self.net.link_tp(&mid, &split, pid);

        for flow in outgoing {
            match self.net.get_node(&flow.target) {
                Some(node) => {
                    let mid = format!("{}_to_{}", gateway.id, node.id());
                    self.connect(NodeRef::Place(split.clone()), node, &mid, pid);
                }
                None => self.deferred.push(DeferredLink::MixedSplitOut {
                    from: NodeRef::Place(split.clone()),
                    target: flow.target.clone(),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }
    }

    // ─── parallel ───

    fn convert_parallel(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        match (incoming.len(), outgoing.len()) {
            (i, o) if i > 1 && o > 1 => {
                self.convert_mixed_parallel(gateway, process, incoming, outgoing)
            }
            // pure split/join: one transition does all the forking/joining,
            // flows are wired by generic conversion
            (1, o) if o > 1 => {
                self.net.add_transition(
                    &gateway.id,
                    &gateway.name,
                    at,
                    TransitionKind::AndSplit,
                    pid,
                );
            }
            (i, 1) if i > 1 => {
                self.net.add_transition(
                    &gateway.id,
                    &gateway.name,
                    at,
                    TransitionKind::AndJoin,
                    pid,
                );
            }
            _ => {}
        }
    }

    /// Mixed parallel: join transition and split transition around a mid
    /// place, dual to the mixed exclusive construction.
    fn convert_mixed_parallel(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let join = self.net.add_transition(
            &format!("{}_j", gateway.id),
            &gateway.name,
            Point::new(at.x - 15.0, at.y),
            TransitionKind::AndJoin,
            pid,
        );
        let split = self.net.add_transition(
            &format!("{}_s", gateway.id),
            &gateway.name,
            Point::new(at.x + 15.0, at.y),
            TransitionKind::AndSplit,
            pid,
        );

        for flow in incoming {
            let source_id = match self.source_endpoint(flow, process) {
                Some(endpoint) => endpoint.id,
                None => flow.source.clone(),
            };
            match self.net.get_node(&source_id) {
                Some(node) => {
                    let mid = format!("{}_to_{}", node.id(), join);
                    self.connect(node, NodeRef::Transition(join.clone()), &mid, pid);
                }
                None => self.deferred.push(DeferredLink::MixedJoinIn {
                    source: source_id,
                    target: NodeRef::Transition(join.clone()),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }

        let mid = self.net.add_place(
            &format!("{}_mid", gateway.id),
            &format!("{} mid", gateway.name),
            at,
            pid,
        );
        self.net.link_tp(&join, &mid, pid);
        self.net.link_pt(&mid, &split, pid);

        for flow in outgoing {
            match self.net.get_node(&flow.target) {
                Some(node) => {
                    let mid = format!("{}_to_{}", split, node.id());
                    self.connect(NodeRef::Transition(split.clone()), node, &mid, pid);
                }
                None => self.deferred.push(DeferredLink::MixedSplitOut {
                    from: NodeRef::Transition(split.clone()),
                    target: flow.target.clone(),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }
    }

    // ─── inclusive ───

    fn convert_inclusive(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        match (incoming.len(), outgoing.len()) {
            (i, o) if i > 1 && o > 1 => {
                self.convert_mixed_inclusive(gateway, process, incoming, outgoing)
            }
            (1, o) if o > 1 => {
                let choice = self.net.add_place(&gateway.id, &gateway.name, at, pid);
                let branches = self.inclusive_split_branches(gateway, process, outgoing, &choice);
                self.inclusive_combinations(&choice, &branches, &gateway.id, "_s", true, process);
            }
            (i, 1) if i > 1 => {
                let join = self.net.add_place(&gateway.id, &gateway.name, at, pid);
                let branches = self.inclusive_join_branches(gateway, process, incoming, &join);
                self.inclusive_combinations(&join, &branches, &gateway.id, "_j", false, process);
            }
            _ => {}
        }
    }

    /// One Choosing transition and Chosen place per outgoing branch.
    /// Returns the Chosen places for combination wiring.
    fn inclusive_split_branches(
        &mut self,
        gateway: &Node,
        process: &Process,
        outgoing: &[&Flow],
        choice: &PlaceId,
    ) -> Vec<PlaceId> {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let mut branches = Vec::new();
        for flow in outgoing {
            let Some(target) = process.node(&flow.target) else {
                warn!(flow = %flow.id, to = %flow.target, "split branch target missing");
                continue;
            };
            let target_at = target.bounds.center();
            let choosing = self.net.add_transition(
                &format!("{}_middle_split", target.id),
                &format!("Choosing {}", target.name),
                at.lerp(target_at, 0.3),
                TransitionKind::Plain,
                pid,
            );
            let chosen = self.net.add_place(
                &format!("{}_end_split", target.id),
                &format!("{} Chosen", target.name),
                at.lerp(target_at, 0.6),
                pid,
            );
            branches.push(chosen.clone());
            self.net.link_pt(choice, &choosing, pid);
            self.net.link_tp(&choosing, &chosen, pid);

            match self.net.get_node(&flow.target) {
                Some(node) => {
                    let mid = format!("{}_to_{}", chosen, node.id());
                    self.connect(NodeRef::Place(chosen), node, &mid, pid);
                }
                None => self.deferred.push(DeferredLink::SplitOut {
                    from: chosen,
                    target: flow.target.clone(),
                    process: process.id.clone(),
                }),
            }
            self.consumed.insert(flow.id.clone());
        }
        branches
    }

    /// One Choosing place and Chosen transition per incoming branch.
    /// Returns the Choosing places for combination wiring.
    fn inclusive_join_branches(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        join: &PlaceId,
    ) -> Vec<PlaceId> {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());
        let mut branches = Vec::new();
        for flow in incoming {
            let Some(source) = self.source_endpoint(flow, process) else {
                warn!(flow = %flow.id, from = %flow.source, "join branch source missing");
                continue;
            };
            let place = self.net.add_place(
                &format!("{}_middle_join", source.id),
                &format!("{} Choosing", source.name),
                source.at.lerp(at, 0.3),
                pid,
            );
            let chosen = self.net.add_transition(
                &format!("{}_end_join", source.id),
                &format!("{} Chosen", source.name),
                source.at.lerp(at, 0.6),
                TransitionKind::Plain,
                pid,
            );
            branches.push(place.clone());

            match self.net.get_node(&source.id) {
                Some(node) => {
                    let mid = format!("{}_to_{}", node.id(), place);
                    self.connect(node, NodeRef::Place(place.clone()), &mid, pid);
                }
                None => self.deferred.push(DeferredLink::JoinIn {
                    source: source.id.clone(),
                    place: place.clone(),
                    process: process.id.clone(),
                }),
            }
            self.net.link_pt(&place, &chosen, pid);
            self.net.link_tp(&chosen, join, pid);
            self.consumed.insert(flow.id.clone());
        }
        branches
    }

    fn convert_mixed_inclusive(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        let at = gateway.bounds.center();
        let pid = Some(process.id.as_str());

        let join = self.net.add_place(
            &format!("{}_join", gateway.id),
            &gateway.name,
            Point::new(at.x - 20.0, at.y),
            pid,
        );
        let in_branches = self.inclusive_join_branches(gateway, process, incoming, &join);
        self.inclusive_combinations(&join, &in_branches, &gateway.id, "_j", false, process);

        let mid = self.net.add_transition(
            &format!("{}_mid", gateway.id),
            &format!("{} mid", gateway.name),
            at,
            TransitionKind::Plain,
            pid,
        );
        self.net.link_pt(&join, &mid, pid);

        let split = self.net.add_place(
            &format!("{}_split", gateway.id),
            &gateway.name,
            Point::new(at.x + 20.0, at.y),
            pid,
        );
        self.net.link_tp(&mid, &split, pid);

        let out_branches = self.inclusive_split_branches(gateway, process, outgoing, &split);
        self.inclusive_combinations(&split, &out_branches, &gateway.id, "_s", true, process);
    }

    /// One extra transition per branch subset of size >= 2, firing all the
    /// subset's branches together. Indices follow the power-set enumeration,
    /// so they are 1-based and sparse.
    fn inclusive_combinations(
        &mut self,
        hub: &PlaceId,
        branches: &[PlaceId],
        gateway_id: &str,
        suffix: &str,
        fan_out: bool,
        process: &Process,
    ) {
        let pid = Some(process.id.as_str());
        for (i, subset) in power_set(branches).into_iter().enumerate() {
            if subset.len() < 2 {
                continue;
            }
            let points: Vec<Point> = subset
                .iter()
                .map(|p| self.net.position(&NodeRef::Place(p.clone())))
                .collect();
            let mut name = String::from("Choosing");
            for p in &subset {
                let branch = self
                    .net
                    .place(p)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                let branch = branch
                    .trim_end_matches(" Chosen")
                    .trim_end_matches(" Choosing");
                name.push(' ');
                name.push_str(branch);
            }
            let combination = self.net.add_transition(
                &format!("{}{}{}", gateway_id, suffix, i + 1),
                &name,
                centroid(&points),
                TransitionKind::Plain,
                pid,
            );
            if fan_out {
                self.net.link_pt(hub, &combination, pid);
                for p in &subset {
                    self.net.link_tp(&combination, p, pid);
                }
            } else {
                for p in &subset {
                    self.net.link_pt(p, &combination, pid);
                }
                self.net.link_tp(&combination, hub, pid);
            }
        }
    }

    // ─── event-based ───

    /// The gateway becomes a place; the downstream catch events compete for
    /// its token. Flows stay with generic conversion. Only the proper split
    /// shape converts; degenerate arities are left alone.
    fn convert_event_based(
        &mut self,
        gateway: &Node,
        process: &Process,
        incoming: &[&Flow],
        outgoing: &[&Flow],
    ) {
        if incoming.len() > 1 {
            warn!(
                gateway = %gateway.id,
                "event-based gateway with multiple incoming flows left unconverted"
            );
            return;
        }
        if incoming.len() != 1 || outgoing.len() <= 1 {
            return;
        }
        self.net.add_place(
            &gateway.id,
            &gateway.name,
            gateway.bounds.center(),
            Some(&process.id),
        );
    }

    // ─── XOR explosion ───

    /// Divide every collapsed XOR transition into one transition per
    /// branch, so exclusive choice becomes a plain Petri-net conflict. The
    /// originals and their arcs are scheduled for removal; the pass runs
    /// over a snapshot, so the replacement transitions are never revisited.
    pub(super) fn explode_xor(&mut self) {
        let snapshot: Vec<(TransitionId, TransitionKind)> = self
            .net
            .transitions()
            .filter(|t| matches!(t.kind, TransitionKind::XorSplit | TransitionKind::XorJoin))
            .map(|t| (t.id.clone(), t.kind))
            .collect();
        for (id, kind) in snapshot {
            match kind {
                TransitionKind::XorSplit => self.divide_xor_split(&id),
                TransitionKind::XorJoin => self.divide_xor_join(&id),
                _ => {}
            }
        }
    }

    fn divide_xor_split(&mut self, id: &TransitionId) {
        let Some(t) = self.net.transition(id) else {
            return;
        };
        let in_arcs = t.in_arcs().to_vec();
        let out_arcs = t.out_arcs().to_vec();
        if in_arcs.len() != 1 || out_arcs.len() <= 1 {
            return;
        }
        let name = t.name.clone();
        let at = t.at;
        let process = t.process.clone();
        let pid = process.as_deref();

        let source = match self.net.arc(&in_arcs[0]).map(|a| a.source()) {
            Some(NodeRef::Place(p)) => p,
            _ => return,
        };
        for (i, arc_id) in out_arcs.iter().enumerate() {
            let target = match self.net.arc(arc_id).map(|a| a.target()) {
                Some(NodeRef::Place(p)) => p,
                _ => continue,
            };
            let branch = self.net.add_transition(
                &format!("{}_op_{}", id, i + 1),
                &name,
                at,
                TransitionKind::XorSplit,
                pid,
            );
            self.net.link_pt(&source, &branch, pid);
            self.net.link_tp(&branch, &target, pid);
            self.removals.arcs.push(arc_id.clone());
        }
        self.removals.arcs.push(in_arcs[0].clone());
        self.removals.transitions.push(id.clone());
    }

    fn divide_xor_join(&mut self, id: &TransitionId) {
        let Some(t) = self.net.transition(id) else {
            return;
        };
        let in_arcs = t.in_arcs().to_vec();
        let out_arcs = t.out_arcs().to_vec();
        if out_arcs.len() != 1 || in_arcs.len() <= 1 {
            return;
        }
        let name = t.name.clone();
        let at = t.at;
        let process = t.process.clone();
        let pid = process.as_deref();

        let target = match self.net.arc(&out_arcs[0]).map(|a| a.target()) {
            Some(NodeRef::Place(p)) => p,
            _ => return,
        };
        for (i, arc_id) in in_arcs.iter().enumerate() {
            let source = match self.net.arc(arc_id).map(|a| a.source()) {
                Some(NodeRef::Place(p)) => p,
                _ => continue,
            };
            let branch = self.net.add_transition(
                &format!("{}_op_{}", id, i + 1),
                &name,
                at,
                TransitionKind::XorJoin,
                pid,
            );
            self.net.link_pt(&source, &branch, pid);
            self.net.link_tp(&branch, &target, pid);
            self.removals.arcs.push(arc_id.clone());
        }
        self.removals.arcs.push(out_arcs[0].clone());
        self.removals.transitions.push(id.clone());
    }
}

/// Join-side skip rule: the branch's source is itself an exclusive gateway
/// that is a pure join or a split. Its token lands on the join place via
/// generic flow conversion instead of a Choosing/Chosen pair.
fn shares_join_place(source: Option<&Node>, flows: &[Flow]) -> bool {
    let Some(source) = source else {
        return false;
    };
    if !matches!(source.kind, NodeKind::Gateway(GatewayKind::Exclusive)) {
        return false;
    }
    let ins = flows
        .iter()
        .filter(|f| f.kind == FlowKind::Sequence && f.target == source.id)
        .count();
    let outs = flows
        .iter()
        .filter(|f| f.kind == FlowKind::Sequence && f.source == source.id)
        .count();
    (ins > 1 && outs == 1) || outs > 1
}
