//! The graph model
//!
//! `ParticleSystem` owns the user-facing graph: nodes addressed by id or
//! unique name, directed edges (at most one per ordered pair), and their
//! data. Every structural edit is turned into a [`Change`] and buffered; the
//! buffer is flushed to the engine as one changeset once no edit has arrived
//! for the debounce window.
//!
//! Positions flow the other way. [`ParticleSystem::frame`] polls the
//! transport for the newest snapshot and mirrors its coordinates onto the
//! nodes, unless the snapshot predates an edit already made locally.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::{ParamUpdate, Parameters};
use crate::graph::{Branch, Data, Edge, GraphDiff, Node, NodeRef, strip_node_reserved};
use crate::kernel::Kernel;
use crate::protocol::{Change, Energy, EntityId, ParticleMods, Snapshot};
use crate::renderer::Renderer;
use crate::screen::{Padding, Screen};
use crate::transport::{InlineTransport, Transport, WorkerTransport};
use crate::vector::{Bounds, Vector};

/// Result of [`ParticleSystem::nearest`]
#[derive(Debug, Clone, PartialEq)]
pub struct Nearest {
    pub node: EntityId,
    pub name: String,
    /// Node position in simulation space
    pub point: Vector,
    /// Node position in pixels, when a screen size is set
    pub screen_point: Option<Vector>,
    /// Distance in pixels with a screen size, simulation units without
    pub distance: f64,
}

pub struct ParticleSystem {
    kernel: Kernel,
    clock: Arc<dyn Clock>,
    params: Parameters,
    nodes: BTreeMap<EntityId, Node>,
    edges: BTreeMap<EntityId, Edge>,
    /// `source -> target -> edge`
    adjacency: BTreeMap<EntityId, BTreeMap<EntityId, EntityId>>,
    names: BTreeMap<String, EntityId>,
    next_node_id: EntityId,
    next_edge_id: EntityId,
    changes: Vec<Change>,
    /// Time of the latest edit in the pending batch
    last_change: Option<Instant>,
    /// Number of batches started; snapshots older than this are stale
    epoch: u64,
    energy: Energy,
    screen: Screen,
    renderer: Option<Box<dyn Renderer>>,
    renderer_ready: bool,
    frames_drawn: u64,
}

impl fmt::Debug for ParticleSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleSystem")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("pending", &self.changes.len())
            .field("epoch", &self.epoch)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ParticleSystem {
    /// Create a graph model talking to its engine through `transport`
    pub fn new(params: Parameters, transport: Box<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let params = params.sanitized();
        let kernel = Kernel::new(transport, Arc::clone(&clock), &params);

        Self {
            kernel,
            clock,
            params,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            names: BTreeMap::new(),
            next_node_id: 1,
            next_edge_id: -1,
            changes: Vec::new(),
            last_change: None,
            epoch: 0,
            energy: Energy::default(),
            screen: Screen::new(),
            renderer: None,
            renderer_ready: false,
            frames_drawn: 0,
        }
    }

    /// Engine stepped in-process on every frame
    pub fn inline(params: Parameters, clock: Arc<dyn Clock>) -> Self {
        let transport = InlineTransport::new(params.clone(), Arc::clone(&clock));
        Self::new(params, Box::new(transport), clock)
    }

    /// Engine running on its own tokio task; must be called inside a runtime
    pub fn threaded(params: Parameters, clock: Arc<dyn Clock>) -> Self {
        let transport = WorkerTransport::spawn(params.clone(), Arc::clone(&clock));
        Self::new(params, Box::new(transport), clock)
    }

    // ---- nodes ----

    /// Add a node, or replace the data of the node already using `name`
    ///
    /// `x`, `y`, `mass` and `fixed` are taken out of `data` and used as the
    /// node's starting state. They are ignored when the node already exists.
    pub fn add_node(&mut self, name: &str, data: Data) -> &Node {
        let (id, _) = self.upsert_node(name, data);
        &self.nodes[&id]
    }

    fn upsert_node(&mut self, name: &str, mut data: Data) -> (EntityId, bool) {
        if let Some(&id) = self.names.get(name) {
            if let Some(node) = self.nodes.get_mut(&id) {
                strip_node_reserved(&mut data);
                node.data = data;
            }
            return (id, false);
        }

        let id = self.next_node_id;
        self.next_node_id += 1;

        let node = Node::new(id, name, data);
        let (x, y) = node.requested_coordinates();
        self.push_change(Change::AddNode {
            id,
            mass: node.mass,
            x,
            y,
            fixed: node.fixed,
        });
        self.names.insert(name.to_owned(), id);
        self.nodes.insert(id, node);
        (id, true)
    }

    /// Existing node by name, created empty if missing
    fn node_named(&mut self, name: &str) -> (EntityId, bool) {
        match self.names.get(name) {
            Some(&id) => (id, false),
            None => self.upsert_node(name, Data::new()),
        }
    }

    fn resolve(&self, node: NodeRef<'_>) -> Option<EntityId> {
        match node {
            NodeRef::Id(id) => self.nodes.contains_key(&id).then_some(id),
            NodeRef::Name(name) => self.names.get(name).copied(),
        }
    }

    pub fn get_node<'a>(&self, node: impl Into<NodeRef<'a>>) -> Option<&Node> {
        self.resolve(node.into()).and_then(|id| self.nodes.get(&id))
    }

    /// Remove a node and every edge touching it
    pub fn prune_node<'a>(&mut self, node: impl Into<NodeRef<'a>>) -> bool {
        let Some(id) = self.resolve(node.into()) else {
            return false;
        };
        self.drop_node(id, &mut GraphDiff::default())
    }

    fn drop_node(&mut self, id: EntityId, diff: &mut GraphDiff) -> bool {
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        self.names.remove(&node.name);

        let incident: Vec<EntityId> = self
            .edges
            .values()
            .filter(|e| e.source == id || e.target == id)
            .map(|e| e.id)
            .collect();
        for edge in incident {
            if self.prune_edge(edge) {
                diff.dropped_edges.push(edge);
            }
        }

        self.push_change(Change::DropNode { id });
        diff.dropped_nodes.push(id);
        true
    }

    /// Remove every node for which `predicate(node, outgoing, incoming)` holds
    pub fn prune<F>(&mut self, mut predicate: F) -> GraphDiff
    where
        F: FnMut(&Node, &[&Edge], &[&Edge]) -> bool,
    {
        let doomed: Vec<EntityId> = self
            .nodes
            .values()
            .filter(|&node| {
                let from = self.get_edges_from(node.id);
                let to = self.get_edges_to(node.id);
                predicate(node, from.as_slice(), to.as_slice())
            })
            .map(|node| node.id)
            .collect();

        let mut diff = GraphDiff::default();
        for id in doomed {
            self.drop_node(id, &mut diff);
        }
        diff
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- edges ----

    /// Connect `source` to `target`
    ///
    /// Endpoints given by name are created when missing; an unknown id
    /// yields `None`. If the pair is already connected, `data` is merged
    /// into the existing edge and no new spring is requested.
    pub fn add_edge<'a>(
        &mut self,
        source: impl Into<NodeRef<'a>>,
        target: impl Into<NodeRef<'a>>,
        data: Data,
    ) -> Option<&Edge> {
        let source = self.resolve_or_create(source.into())?;
        let target = self.resolve_or_create(target.into())?;

        let id = match self.edge_between(source, target) {
            Some(id) => {
                if let Some(edge) = self.edges.get_mut(&id) {
                    let mut data = data;
                    data.remove("length");
                    edge.data.extend(data);
                }
                id
            }
            None => self.insert_edge(source, target, data),
        };
        self.edges.get(&id)
    }

    fn resolve_or_create(&mut self, node: NodeRef<'_>) -> Option<EntityId> {
        match node {
            NodeRef::Id(id) => self.nodes.contains_key(&id).then_some(id),
            NodeRef::Name(name) => Some(self.node_named(name).0),
        }
    }

    fn edge_between(&self, source: EntityId, target: EntityId) -> Option<EntityId> {
        self.adjacency
            .get(&source)
            .and_then(|targets| targets.get(&target))
            .copied()
    }

    fn insert_edge(&mut self, source: EntityId, target: EntityId, data: Data) -> EntityId {
        let id = self.next_edge_id;
        self.next_edge_id -= 1;

        let edge = Edge::new(id, source, target, data);
        self.push_change(Change::AddSpring {
            id,
            from: source,
            to: target,
            length: edge.length,
        });
        self.adjacency.entry(source).or_default().insert(target, id);
        self.edges.insert(id, edge);
        id
    }

    pub fn prune_edge(&mut self, id: EntityId) -> bool {
        let Some(edge) = self.edges.remove(&id) else {
            return false;
        };

        if let Some(targets) = self.adjacency.get_mut(&edge.source) {
            targets.remove(&edge.target);
            if targets.is_empty() {
                self.adjacency.remove(&edge.source);
            }
        }

        self.push_change(Change::DropSpring { id });
        true
    }

    pub fn get_edge(&self, id: EntityId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Edges from `source` to `target`; empty or a single edge
    pub fn get_edges<'a>(
        &self,
        source: impl Into<NodeRef<'a>>,
        target: impl Into<NodeRef<'a>>,
    ) -> Vec<&Edge> {
        let source = self.resolve(source.into());
        let target = self.resolve(target.into());
        let (Some(source), Some(target)) = (source, target) else {
            return Vec::new();
        };
        self.edge_between(source, target)
            .and_then(|id| self.edges.get(&id))
            .into_iter()
            .collect()
    }

    pub fn get_edges_from<'a>(&self, node: impl Into<NodeRef<'a>>) -> Vec<&Edge> {
        let Some(id) = self.resolve(node.into()) else {
            return Vec::new();
        };
        self.adjacency
            .get(&id)
            .into_iter()
            .flat_map(|targets| targets.values())
            .filter_map(|edge| self.edges.get(edge))
            .collect()
    }

    pub fn get_edges_to<'a>(&self, node: impl Into<NodeRef<'a>>) -> Vec<&Edge> {
        let Some(id) = self.resolve(node.into()) else {
            return Vec::new();
        };
        self.edges.values().filter(|e| e.target == id).collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ---- bulk updates ----

    /// Add everything described by `branch`, replacing the data of nodes and
    /// edges that already exist
    pub fn graft(&mut self, branch: &Branch) -> GraphDiff {
        let mut diff = GraphDiff::default();

        for (name, data) in &branch.nodes {
            let (id, created) = self.upsert_node(name, data.clone());
            if created {
                diff.added_nodes.push(id);
            }
        }

        for (source, targets) in &branch.edges {
            let (src, created) = self.node_named(source);
            if created {
                diff.added_nodes.push(src);
            }

            for (target, data) in targets {
                let (dst, created) = self.node_named(target);
                if created {
                    diff.added_nodes.push(dst);
                }

                match self.edge_between(src, dst) {
                    Some(id) => {
                        if let Some(edge) = self.edges.get_mut(&id) {
                            let mut data = data.clone();
                            data.remove("length");
                            edge.data = data;
                        }
                    }
                    None => {
                        let id = self.insert_edge(src, dst, data.clone());
                        diff.added_edges.push(id);
                    }
                }
            }
        }

        diff
    }

    /// Make the graph match `branch`: edges and nodes it does not mention
    /// are dropped, then the branch is grafted
    pub fn merge(&mut self, branch: &Branch) -> GraphDiff {
        let mut diff = GraphDiff::default();

        let stale: Vec<EntityId> = self
            .edges
            .values()
            .filter(|e| !branch.has_edge(self.name_of(e.source), self.name_of(e.target)))
            .map(|e| e.id)
            .collect();
        for id in stale {
            if self.prune_edge(id) {
                diff.dropped_edges.push(id);
            }
        }

        diff.extend(self.prune(|node, _, _| !branch.mentions(&node.name)));
        diff.extend(self.graft(branch));
        diff
    }

    fn name_of(&self, id: EntityId) -> &str {
        self.nodes.get(&id).map(|n| n.name.as_str()).unwrap_or_default()
    }

    // ---- particle state ----

    /// Move a node; delivered with the next changeset
    pub fn set_position<'a>(&mut self, node: impl Into<NodeRef<'a>>, position: Vector) -> bool {
        self.enqueue_modify(node.into(), ParticleMods::position(position.x, position.y))
    }

    pub fn set_mass<'a>(&mut self, node: impl Into<NodeRef<'a>>, mass: f64) -> bool {
        self.enqueue_modify(
            node.into(),
            ParticleMods {
                mass: Some(mass),
                ..Default::default()
            },
        )
    }

    pub fn set_fixed<'a>(&mut self, node: impl Into<NodeRef<'a>>, fixed: bool) -> bool {
        self.enqueue_modify(
            node.into(),
            ParticleMods {
                fixed: Some(fixed),
                ..Default::default()
            },
        )
    }

    /// Temporarily override the mass; it decays back over the next ticks
    pub fn set_temp_mass<'a>(&mut self, node: impl Into<NodeRef<'a>>, mass: f64) -> bool {
        self.enqueue_modify(
            node.into(),
            ParticleMods {
                temp_mass: Some(mass),
                ..Default::default()
            },
        )
    }

    fn enqueue_modify(&mut self, node: NodeRef<'_>, mods: ParticleMods) -> bool {
        let Some(id) = self.resolve(node) else {
            return false;
        };
        self.mirror(id, &mods);
        self.push_change(Change::Modify { id, mods });
        true
    }

    /// Send a particle update straight to the engine, bypassing the
    /// changeset buffer; meant for interactive dragging
    pub fn modify_particle(&mut self, id: EntityId, mods: ParticleMods) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        self.mirror(id, &mods);
        self.kernel.particle_modified(id, mods);
        true
    }

    fn mirror(&mut self, id: EntityId, mods: &ParticleMods) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };

        match (node.position, mods.x, mods.y) {
            (_, Some(x), Some(y)) => node.position = Some(Vector::new(x, y)),
            (Some(p), Some(x), None) => node.position = Some(Vector::new(x, p.y)),
            (Some(p), None, Some(y)) => node.position = Some(Vector::new(p.x, y)),
            _ => {}
        }
        if let Some(mass) = mods.mass.filter(|m| m.is_finite() && *m > 0.0) {
            node.mass = mass;
        }
        if let Some(fixed) = mods.fixed {
            node.fixed = fixed;
        }
    }

    // ---- changeset buffering ----

    fn push_change(&mut self, change: Change) {
        self.changes.push(change);
        if self.last_change.is_none() {
            self.epoch += 1;
        }
        self.last_change = Some(self.clock.now());
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Flush the pending batch once the debounce window has passed
    fn synchronize(&mut self) -> bool {
        let Some(last) = self.last_change else {
            return false;
        };
        if self.clock.now().duration_since(last) < self.params.debounce() {
            return false;
        }
        self.flush()
    }

    /// Send the pending batch to the engine now
    pub fn flush(&mut self) -> bool {
        self.last_change = None;
        if self.changes.is_empty() {
            return false;
        }
        let changes = std::mem::take(&mut self.changes);
        self.kernel.graph_changed(changes);
        true
    }

    /// Number of changeset batches started so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ---- frames ----

    /// One consumer frame
    ///
    /// Flushes a due changeset, mirrors the newest snapshot, steps the view
    /// bounds and redraws when anything moved. Returns whether it redrew.
    pub fn frame(&mut self) -> bool {
        self.synchronize();

        let mut redraw = false;
        if let Some(snapshot) = self.kernel.poll() {
            redraw |= self.update_geometry(snapshot);
        }

        let has_nodes = !self.nodes.is_empty();
        if self.screen.update_bounds(self.bounds(), has_nodes) {
            redraw = true;
        }

        if redraw {
            self.draw();
            self.kernel.record_frame();
            self.frames_drawn += 1;
        }
        redraw
    }

    fn update_geometry(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.epoch < self.epoch {
            tracing::trace!(
                snapshot = snapshot.epoch,
                model = self.epoch,
                "discarding stale snapshot"
            );
            return false;
        }

        self.energy = snapshot.energy;
        for (id, x, y) in snapshot.geometry {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.position = Some(Vector::new(x, y));
            }
        }
        true
    }

    fn draw(&mut self) {
        let Some(mut renderer) = self.renderer.take() else {
            return;
        };
        if !self.renderer_ready {
            renderer.init(self);
            self.renderer_ready = true;
        }
        renderer.redraw(self);
        self.renderer = Some(renderer);
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = Some(renderer);
        self.renderer_ready = false;
    }

    pub fn take_renderer(&mut self) -> Option<Box<dyn Renderer>> {
        self.renderer_ready = false;
        self.renderer.take()
    }

    /// Visit every positioned node with its screen point (or simulation
    /// point when no screen size is set)
    pub fn each_node<F: FnMut(&Node, Vector)>(&self, mut f: F) {
        for node in self.nodes.values() {
            if let Some(point) = node.position.and_then(|p| self.display_point(p)) {
                f(node, point);
            }
        }
    }

    /// Visit every edge whose endpoints are both positioned
    pub fn each_edge<F: FnMut(&Edge, Vector, Vector)>(&self, mut f: F) {
        for edge in self.edges.values() {
            let point = |id: EntityId| {
                self.nodes
                    .get(&id)
                    .and_then(|n| n.position)
                    .and_then(|p| self.display_point(p))
            };
            if let (Some(p1), Some(p2)) = (point(edge.source), point(edge.target)) {
                f(edge, p1, p2);
            }
        }
    }

    fn display_point(&self, p: Vector) -> Option<Vector> {
        if self.screen.size().is_some() {
            self.screen.to_screen(p)
        } else {
            Some(p)
        }
    }

    /// Closest positioned node to `point`
    ///
    /// `point` is in pixels when a screen size is set, otherwise in
    /// simulation units.
    pub fn nearest(&self, point: Vector) -> Option<Nearest> {
        let on_screen = self.screen.size().is_some();
        let target = if on_screen {
            self.screen.from_screen(point)?
        } else {
            point
        };

        let (node, position, distance) = self
            .nodes
            .values()
            .filter_map(|n| n.position.map(|p| (n, p, (p - target).magnitude())))
            .min_by(|a, b| a.2.total_cmp(&b.2))?;

        let screen_point = if on_screen {
            self.screen.to_screen(position)
        } else {
            None
        };
        let distance = match screen_point {
            Some(sp) => (sp - point).magnitude(),
            None => distance,
        };

        Some(Nearest {
            node: node.id,
            name: node.name.clone(),
            point: position,
            screen_point,
            distance,
        })
    }

    // ---- view ----

    /// Extent of every positioned node, `(-1,-1)..(1,1)` when there is none
    pub fn bounds(&self) -> Bounds {
        Bounds::enclosing(self.nodes.values().filter_map(|n| n.position)).unwrap_or_default()
    }

    /// Energy carried by the last accepted snapshot
    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn set_screen_size(&mut self, width: f64, height: f64) {
        self.screen.set_size(width, height);
        let has_nodes = !self.nodes.is_empty();
        self.screen.update_bounds(self.bounds(), has_nodes);
    }

    pub fn set_screen_padding(&mut self, padding: impl Into<Padding>) {
        self.screen.set_padding(padding);
    }

    pub fn set_screen_step(&mut self, step: f64) {
        self.screen.set_step(step);
    }

    pub fn to_screen(&self, p: Vector) -> Option<Vector> {
        self.screen.to_screen(p)
    }

    pub fn from_screen(&self, s: Vector) -> Option<Vector> {
        self.screen.from_screen(s)
    }

    // ---- run control ----

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn set_parameters(&mut self, update: ParamUpdate) {
        self.params.apply(&update);
        self.kernel.physics_modified(update);
    }

    /// Frames in which something moved, since creation
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Measured frame rate
    pub fn fps(&self) -> f64 {
        self.kernel.fps()
    }

    /// Change the target frame rate; a running frame loop must be restarted
    pub fn set_fps(&mut self, fps: f64) {
        self.set_parameters(ParamUpdate {
            fps: Some(fps),
            ..Default::default()
        });
    }

    pub fn frame_interval(&self) -> Duration {
        self.params.frame_interval()
    }

    /// Resume after [`ParticleSystem::stop`]
    pub fn start(&mut self) {
        self.kernel.start();
    }

    /// Halt the simulation until an explicit [`ParticleSystem::start`]
    pub fn stop(&mut self) {
        self.kernel.stop();
    }
}
