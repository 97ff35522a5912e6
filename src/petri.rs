//! The Petri-net model produced by conversion.
//!
//! Places, transitions and arcs live in id-keyed maps. Arc identity is the
//! concatenation of the endpoint ids, which deduplicates parallel arcs
//! between the same pair of nodes; this is a deliberate simplification. The
//! arc endpoint enum makes the bipartite invariant structural: an arc can
//! only ever join a place to a transition or a transition to a place.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

id_type! {
    /// Identifier of a place.
    PlaceId
}
id_type! {
    /// Identifier of a transition.
    TransitionId
}
id_type! {
    /// Identifier of an arc (endpoint ids concatenated).
    ArcId
}

/// A reference to either kind of net node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Place(PlaceId),
    Transition(TransitionId),
}

impl NodeRef {
    pub fn id(&self) -> &str {
        match self {
            NodeRef::Place(p) => p.as_str(),
            NodeRef::Transition(t) => t.as_str(),
        }
    }

    pub fn is_place(&self) -> bool {
        matches!(self, NodeRef::Place(_))
    }
}

/// Rendering tag recording which routing construct a transition came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    #[default]
    Plain,
    AndSplit,
    AndJoin,
    XorSplit,
    XorJoin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub at: Point,
    pub tokens: u32,
    /// Owning process; absent for message plumbing and global start/end.
    pub process: Option<String>,
    in_arcs: Vec<ArcId>,
    out_arcs: Vec<ArcId>,
}

impl Place {
    pub fn in_arcs(&self) -> &[ArcId] {
        &self.in_arcs
    }

    pub fn out_arcs(&self) -> &[ArcId] {
        &self.out_arcs
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub name: String,
    pub at: Point,
    pub kind: TransitionKind,
    pub process: Option<String>,
    in_arcs: Vec<ArcId>,
    out_arcs: Vec<ArcId>,
}

impl Transition {
    pub fn in_arcs(&self) -> &[ArcId] {
        &self.in_arcs
    }

    pub fn out_arcs(&self) -> &[ArcId] {
        &self.out_arcs
    }
}

/// The endpoints of an arc. Same-kind endpoints are unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcEnds {
    PlaceToTransition(PlaceId, TransitionId),
    TransitionToPlace(TransitionId, PlaceId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Arc {
    pub id: ArcId,
    ends: ArcEnds,
    /// Interior routing hints inherited from the diagram edge.
    pub waypoints: Vec<Point>,
    pub process: Option<String>,
}

impl Arc {
    pub fn ends(&self) -> &ArcEnds {
        &self.ends
    }

    pub fn source(&self) -> NodeRef {
        match &self.ends {
            ArcEnds::PlaceToTransition(p, _) => NodeRef::Place(p.clone()),
            ArcEnds::TransitionToPlace(t, _) => NodeRef::Transition(t.clone()),
        }
    }

    pub fn target(&self) -> NodeRef {
        match &self.ends {
            ArcEnds::PlaceToTransition(_, t) => NodeRef::Transition(t.clone()),
            ArcEnds::TransitionToPlace(_, p) => NodeRef::Place(p.clone()),
        }
    }
}

/// The net under construction and the finished conversion result.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PetriNet {
    places: BTreeMap<PlaceId, Place>,
    transitions: BTreeMap<TransitionId, Transition>,
    arcs: BTreeMap<ArcId, Arc>,
    /// Transitions for start events, keyed by owning process.
    start_transitions: BTreeMap<String, Vec<TransitionId>>,
    /// Transitions for end events, keyed by owning process.
    end_transitions: BTreeMap<String, Vec<TransitionId>>,
    start_places: Vec<PlaceId>,
    end_places: Vec<PlaceId>,
}

impl PetriNet {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── construction ───

    /// Add a place, or return the existing one with this id.
    pub fn add_place(
        &mut self,
        id: &str,
        name: &str,
        at: Point,
        process: Option<&str>,
    ) -> PlaceId {
        let id = PlaceId::from(id);
        self.places.entry(id.clone()).or_insert_with(|| Place {
            id: id.clone(),
            name: name.to_owned(),
            at,
            tokens: 0,
            process: process.map(str::to_owned),
            in_arcs: Vec::new(),
            out_arcs: Vec::new(),
        });
        id
    }

    /// Add a transition, or return the existing one with this id.
    pub fn add_transition(
        &mut self,
        id: &str,
        name: &str,
        at: Point,
        kind: TransitionKind,
        process: Option<&str>,
    ) -> TransitionId {
        let id = TransitionId::from(id);
        self.transitions
            .entry(id.clone())
            .or_insert_with(|| Transition {
                id: id.clone(),
                name: name.to_owned(),
                at,
                kind,
                process: process.map(str::to_owned),
                in_arcs: Vec::new(),
                out_arcs: Vec::new(),
            });
        id
    }

    /// Arc from a place to a transition. Idempotent by derived id.
    pub fn link_pt(
        &mut self,
        place: &PlaceId,
        transition: &TransitionId,
        process: Option<&str>,
    ) -> ArcId {
        let id = ArcId::from(format!("{}{}", place, transition));
        if !self.arcs.contains_key(&id) {
            self.arcs.insert(
                id.clone(),
                Arc {
                    id: id.clone(),
                    ends: ArcEnds::PlaceToTransition(place.clone(), transition.clone()),
                    waypoints: Vec::new(),
                    process: process.map(str::to_owned),
                },
            );
            if let Some(p) = self.places.get_mut(place) {
                p.out_arcs.push(id.clone());
            }
            if let Some(t) = self.transitions.get_mut(transition) {
                t.in_arcs.push(id.clone());
            }
        }
        id
    }

    /// Arc from a transition to a place. Idempotent by derived id.
    pub fn link_tp(
        &mut self,
        transition: &TransitionId,
        place: &PlaceId,
        process: Option<&str>,
    ) -> ArcId {
        let id = ArcId::from(format!("{}{}", transition, place));
        if !self.arcs.contains_key(&id) {
            self.arcs.insert(
                id.clone(),
                Arc {
                    id: id.clone(),
                    ends: ArcEnds::TransitionToPlace(transition.clone(), place.clone()),
                    waypoints: Vec::new(),
                    process: process.map(str::to_owned),
                },
            );
            if let Some(t) = self.transitions.get_mut(transition) {
                t.out_arcs.push(id.clone());
            }
            if let Some(p) = self.places.get_mut(place) {
                p.in_arcs.push(id.clone());
            }
        }
        id
    }

    // ─── lookup ───

    /// Resolve an id to whichever node carries it, places first.
    pub fn get_node(&self, id: &str) -> Option<NodeRef> {
        if let Some(p) = self.places.get(id) {
            return Some(NodeRef::Place(p.id.clone()));
        }
        self.transitions
            .get(id)
            .map(|t| NodeRef::Transition(t.id.clone()))
    }

    pub fn place(&self, id: &PlaceId) -> Option<&Place> {
        self.places.get(id)
    }

    pub fn place_mut(&mut self, id: &PlaceId) -> Option<&mut Place> {
        self.places.get_mut(id)
    }

    pub fn transition(&self, id: &TransitionId) -> Option<&Transition> {
        self.transitions.get(id)
    }

    pub fn transition_mut(&mut self, id: &TransitionId) -> Option<&mut Transition> {
        self.transitions.get_mut(id)
    }

    pub fn arc(&self, id: &ArcId) -> Option<&Arc> {
        self.arcs.get(id)
    }

    pub fn arc_mut(&mut self, id: &ArcId) -> Option<&mut Arc> {
        self.arcs.get_mut(id)
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.values()
    }

    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    /// Position of a node, for placing synthetic neighbors.
    pub fn position(&self, node: &NodeRef) -> Point {
        match node {
            NodeRef::Place(p) => self.places.get(p).map(|p| p.at),
            NodeRef::Transition(t) => self.transitions.get(t).map(|t| t.at),
        }
        .unwrap_or_default()
    }

    // ─── start/end bookkeeping ───

    pub fn register_start_transition(&mut self, transition: &TransitionId, process: &str) {
        self.start_transitions
            .entry(process.to_owned())
            .or_default()
            .push(transition.clone());
    }

    pub fn register_end_transition(&mut self, transition: &TransitionId, process: &str) {
        self.end_transitions
            .entry(process.to_owned())
            .or_default()
            .push(transition.clone());
    }

    pub fn start_transitions(&self) -> &BTreeMap<String, Vec<TransitionId>> {
        &self.start_transitions
    }

    pub fn end_transitions(&self) -> &BTreeMap<String, Vec<TransitionId>> {
        &self.end_transitions
    }

    pub fn push_start_place(&mut self, place: PlaceId) {
        self.start_places.push(place);
    }

    pub fn push_end_place(&mut self, place: PlaceId) {
        self.end_places.push(place);
    }

    pub fn start_places(&self) -> &[PlaceId] {
        &self.start_places
    }

    pub fn end_places(&self) -> &[PlaceId] {
        &self.end_places
    }

    // ─── removal ───

    /// Remove an arc and detach it from both endpoints' adjacency lists.
    pub fn remove_arc(&mut self, id: &ArcId) {
        let Some(arc) = self.arcs.remove(id) else {
            return;
        };
        match arc.ends {
            ArcEnds::PlaceToTransition(p, t) => {
                if let Some(p) = self.places.get_mut(&p) {
                    p.out_arcs.retain(|a| a != id);
                }
                if let Some(t) = self.transitions.get_mut(&t) {
                    t.in_arcs.retain(|a| a != id);
                }
            }
            ArcEnds::TransitionToPlace(t, p) => {
                if let Some(t) = self.transitions.get_mut(&t) {
                    t.out_arcs.retain(|a| a != id);
                }
                if let Some(p) = self.places.get_mut(&p) {
                    p.in_arcs.retain(|a| a != id);
                }
            }
        }
    }

    /// Remove a transition. Its arcs must have been removed first.
    pub fn remove_transition(&mut self, id: &TransitionId) {
        self.transitions.remove(id);
    }

    // ─── token game ───

    pub fn add_tokens(&mut self, place: &PlaceId, count: u32) {
        if let Some(p) = self.places.get_mut(place) {
            p.tokens += count;
        }
    }

    pub fn remove_tokens(&mut self, place: &PlaceId, count: u32) {
        if let Some(p) = self.places.get_mut(place) {
            p.tokens = p.tokens.saturating_sub(count);
        }
    }

    /// A transition is enabled when every input place holds a token.
    pub fn can_fire(&self, transition: &TransitionId) -> bool {
        let Some(t) = self.transitions.get(transition) else {
            return false;
        };
        t.in_arcs.iter().all(|a| {
            self.arcs
                .get(a)
                .and_then(|a| match &a.ends {
                    ArcEnds::PlaceToTransition(p, _) => self.places.get(p),
                    ArcEnds::TransitionToPlace(..) => None,
                })
                .is_some_and(|p| p.tokens > 0)
        })
    }

    /// Fire a transition if enabled: consume one token per input place,
    /// produce one per output place. Returns whether it fired.
    pub fn fire(&mut self, transition: &TransitionId) -> bool {
        if !self.can_fire(transition) {
            return false;
        }
        let Some(t) = self.transitions.get(transition) else {
            return false;
        };
        let inputs: Vec<PlaceId> = t
            .in_arcs
            .iter()
            .filter_map(|a| match self.arcs.get(a).map(|a| &a.ends) {
                Some(ArcEnds::PlaceToTransition(p, _)) => Some(p.clone()),
                _ => None,
            })
            .collect();
        let outputs: Vec<PlaceId> = t
            .out_arcs
            .iter()
            .filter_map(|a| match self.arcs.get(a).map(|a| &a.ends) {
                Some(ArcEnds::TransitionToPlace(_, p)) => Some(p.clone()),
                _ => None,
            })
            .collect();
        for p in &inputs {
            self.remove_tokens(p, 1);
        }
        for p in &outputs {
            self.add_tokens(p, 1);
        }
        true
    }

    /// Set the initial marking: one token on every place without inbound
    /// arcs, zero elsewhere. Runs last, after all structure exists.
    pub fn assign_initial_marking(&mut self) {
        for place in self.places.values_mut() {
            place.tokens = if place.in_arcs.is_empty() { 1 } else { 0 };
        }
    }
}

impl fmt::Display for PetriNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Places:")?;
        for p in self.places.values() {
            writeln!(f, "  {} [{}] tokens={}", p.id, p.name, p.tokens)?;
        }
        writeln!(f, "Transitions:")?;
        for t in self.transitions.values() {
            writeln!(f, "  {} [{}] {:?}", t.id, t.name, t.kind)?;
        }
        writeln!(f, "Arcs:")?;
        for a in self.arcs.values() {
            writeln!(f, "  {} -> {}", a.source().id(), a.target().id())?;
        }
        Ok(())
    }
}
