//! The force layout stage
//!
//! [`ForceTransform`] keeps a force simulation synchronised with the node and link
//! records flowing through a dataflow pipeline. Every invocation reconciles the
//! registries with the incoming changesets, runs the simulation (a fixed tick budget in
//! batch mode, a periodic driver in interactive mode), applies the pin/drag/bound rules
//! and writes the coordinates onto the node records.
//!
//! All simulation state lives in one [`StageState`] behind a mutex. Invocations, driver
//! steps and frame steps each hold that lock for their whole duration, so there is a
//! single writer at any time.

mod config;

pub use config::{ForceConfig, TRANSFORM_TYPE};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::{TickBridge, Ticker};
use crate::components::ChangeSet;
use crate::dataflow::{DataSource, Dataflow, Signal};
use crate::errors::{
    ChangesetError, ConfigError, Diagnostic, EngineError, ForceError, ForceResult,
};
use crate::events::Reflow;
use crate::layout::{ForceLayout, LayoutEngine};
use crate::registry::{LinkRegistry, NodeRegistry};
use crate::systems::{Bounds, ConstraintResolver};
use crate::value_objects::{ActiveNode, RecordId, Vec2};

/// Lifecycle of the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutPhase {
    /// No invocation has configured the simulation yet
    Unconfigured,
    /// Configured and idle
    Configured,
    /// Inside the tick budget of a batch invocation
    RunningBatch,
    /// Interactive simulation still cooling
    RunningInteractive,
}

/// Result of one invocation
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// The node changeset with the coordinate fields marked modified
    pub changeset: ChangeSet,
    /// Non-fatal problems found while processing the invocation
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything the simulation mutates, guarded by the stage lock
struct StageState {
    nodes: NodeRegistry,
    links: LinkRegistry,
    engine: Box<dyn LayoutEngine>,
    previous_active: Option<ActiveNode>,
    phase: LayoutPhase,
    needs_setup: bool,
    /// Engine fault raised by the periodic driver, reported by the next call
    fault: Option<EngineError>,
    /// Stamp of the last link pulse consumed
    last_link_stamp: u64,
    /// Links that were skipped or cascaded away; upstream may still remove them
    retired_links: HashSet<RecordId>,
    /// Whether a periodic driver is (still) stepping this simulation
    driver_live: bool,
    frames: u64,
    shut_down: bool,
}

/// Collaborators resolved from the stage definition
struct Inputs {
    links: Arc<dyn DataSource>,
    fixed: Option<Arc<dyn DataSource>>,
    active: Option<Arc<dyn Signal>>,
}

impl Inputs {
    fn resolve(config: &ForceConfig, dataflow: &dyn Dataflow) -> Result<Self, ConfigError> {
        let links_name = config.links_source()?;
        let links = dataflow
            .data(links_name)
            .ok_or_else(|| ConfigError::UnknownData(links_name.to_string()))?;

        let fixed = match config.fixed.as_deref() {
            Some(name) => Some(
                dataflow
                    .data(name)
                    .ok_or_else(|| ConfigError::UnknownData(name.to_string()))?,
            ),
            None => None,
        };

        let active = match config.active.as_deref() {
            Some(name) => Some(
                dataflow
                    .signal(name)
                    .ok_or_else(|| ConfigError::UnknownSignal(name.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            links,
            fixed,
            active,
        })
    }

    /// Node identities named by the `id` field of the fixed data set
    fn fixed_ids(&self) -> HashSet<RecordId> {
        self.fixed
            .as_ref()
            .map(|source| {
                source
                    .values()
                    .iter()
                    .filter_map(|record| record.get_u64("id"))
                    .map(RecordId::new)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn active_node(&self) -> Result<Option<ActiveNode>, ConfigError> {
        match &self.active {
            Some(signal) => ActiveNode::from_signal(&signal.get()),
            None => Ok(None),
        }
    }
}

/// Force-directed layout stage
pub struct ForceTransform {
    stage_id: Uuid,
    config: ForceConfig,
    dataflow: Arc<dyn Dataflow>,
    inputs: Inputs,
    state: Arc<Mutex<StageState>>,
    bridge: TickBridge,
    runtime: Option<Handle>,
    ticker: Option<Ticker>,
    /// The engine is the built-in simulation and may be rebuilt on reconfiguration
    default_engine: bool,
}

impl ForceTransform {
    /// Build a stage with the default simulation
    pub fn new(config: ForceConfig, dataflow: Arc<dyn Dataflow>) -> ForceResult<Self> {
        let engine = match config.seed {
            Some(seed) => ForceLayout::with_seed(seed),
            None => ForceLayout::new(),
        };
        let mut stage = Self::with_engine(config, dataflow, Box::new(engine))?;
        stage.default_engine = true;
        Ok(stage)
    }

    /// Build a stage around a custom simulation.
    ///
    /// Interactive stages pick up the ambient tokio runtime when there is one; without
    /// a runtime the host advances them with [`ForceTransform::advance_frame`].
    pub fn with_engine(
        config: ForceConfig,
        dataflow: Arc<dyn Dataflow>,
        engine: Box<dyn LayoutEngine>,
    ) -> ForceResult<Self> {
        config.validate()?;
        let inputs = Inputs::resolve(&config, dataflow.as_ref())?;
        // A malformed descriptor is a definition error, not a per-invocation one
        inputs.active_node()?;

        let stage_id = Uuid::new_v4();
        info!(
            stage_id = %stage_id,
            links = %inputs.links.name(),
            interactive = config.interactive,
            "Force layout stage created"
        );

        Ok(Self {
            stage_id,
            config,
            dataflow,
            inputs,
            state: Arc::new(Mutex::new(StageState {
                nodes: NodeRegistry::new(),
                links: LinkRegistry::new(),
                engine,
                previous_active: None,
                phase: LayoutPhase::Unconfigured,
                needs_setup: true,
                fault: None,
                last_link_stamp: 0,
                retired_links: HashSet::new(),
                driver_live: false,
                frames: 0,
                shut_down: false,
            })),
            bridge: TickBridge::new(),
            runtime: Handle::try_current().ok(),
            ticker: None,
            default_engine: false,
        })
    }

    /// Drive interactive layouts on `runtime`
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Drive interactive layouts from the host through `advance_frame()` only
    pub fn without_runtime(mut self) -> Self {
        self.runtime = None;
        self
    }

    /// Process one pulse of node changes together with the latest link pulse.
    ///
    /// An engine fault during a batch run does not abort the invocation halfway: the
    /// removals are still applied and the fault is returned afterwards.
    pub fn transform(&mut self, input: ChangeSet) -> ForceResult<TransformOutput> {
        let link_input = self.inputs.links.last();
        let active = self.inputs.active_node()?;
        let fixed = self.inputs.fixed_ids();
        let bounds = Bounds::new(self.config.bound, self.config.size);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shut_down {
            return Err(ForceError::ShutDown);
        }
        if let Some(fault) = state.fault.take() {
            return Err(fault.into());
        }

        let link_input = if link_input.stamp != 0 && link_input.stamp == state.last_link_stamp {
            // Same link pulse as last time
            ChangeSet::new()
        } else {
            link_input
        };
        validate(state, &input, &link_input)?;
        state.last_link_stamp = link_input.stamp;

        let mut diagnostics = Vec::new();
        for field in ["source", "target"] {
            if !link_input.touches(field) {
                continue;
            }
            let live = link_input.modified.iter().filter(|r| state.links.contains(r.id()));
            for record in live {
                warn!(
                    stage_id = %self.stage_id,
                    link = %record.id(),
                    field,
                    "Ignoring edit of link endpoint"
                );
                diagnostics.push(Diagnostic::UnsupportedLinkEdit {
                    link: record.id(),
                    field: field.to_string(),
                });
            }
        }

        if state.needs_setup || input.has_additions() || link_input.has_additions() {
            self.configure(state, &input, &link_input, &mut diagnostics)?;
        }

        let resolver =
            ConstraintResolver::new(&fixed, active.as_ref(), bounds, &self.config.output);
        resolver.prepare(&mut state.nodes);

        let outcome = if self.config.interactive {
            Ok(())
        } else {
            state.phase = LayoutPhase::RunningBatch;
            let outcome = run_batch(state, self.config.iterations);
            state.engine.stop();
            state.phase = LayoutPhase::Configured;
            outcome
        };

        resolver.apply(&mut state.nodes);

        if active != state.previous_active {
            let drag_start = active
                .as_ref()
                .is_some_and(|a| a.is_drag() && state.nodes.contains(a.id));
            if drag_start {
                debug!(stage_id = %self.stage_id, alpha = self.config.alpha, "Reheating for drag");
                state.engine.set_alpha(self.config.alpha);
            }
            state.previous_active = active;
        }

        let removed_links = state.links.remove_links(&link_input.removed_ids());
        let removed_nodes = state.nodes.remove_nodes(&input.removed_ids());
        let cascaded = state.links.cascade(&removed_nodes);
        for id in link_input.removed_ids() {
            state.retired_links.remove(&id);
        }
        state.retired_links.extend(cascaded.iter().copied());
        if !removed_nodes.is_empty() || !removed_links.is_empty() || !cascaded.is_empty() {
            state.engine.set_nodes(&state.nodes);
            state.engine.set_links(&state.nodes, &state.links);
        }

        let spawn_driver = self.config.interactive && self.claim_driver(state);
        if self.config.interactive && state.engine.is_running() {
            state.phase = LayoutPhase::RunningInteractive;
        }

        debug!(
            stage_id = %self.stage_id,
            added = input.add.len(),
            removed = removed_nodes.len(),
            links_removed = removed_links.len() + cascaded.len(),
            nodes = state.nodes.len(),
            links = state.links.len(),
            alpha = state.engine.alpha(),
            diagnostics = diagnostics.len(),
            "Force layout invocation complete"
        );
        drop(guard);

        if spawn_driver {
            self.spawn_driver();
        }
        if let Err(error) = outcome {
            warn!(
                stage_id = %self.stage_id,
                error = %error,
                "Batch layout stopped on engine fault"
            );
            return Err(error.into());
        }

        let mut changeset = input;
        changeset.mark_modified(&self.config.output.x);
        changeset.mark_modified(&self.config.output.y);
        Ok(TransformOutput {
            changeset,
            diagnostics,
        })
    }

    /// Add the new records and (re)initialise the simulation
    fn configure(
        &self,
        state: &mut StageState,
        input: &ChangeSet,
        link_input: &ChangeSet,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ForceResult<()> {
        let batch = state.nodes.add_batch(&input.add)?;

        for record in &link_input.add {
            state.retired_links.remove(&record.id());
            let resolved = LinkRegistry::resolve_endpoints(
                record,
                &batch,
                &state.nodes,
                self.config.link_resolution,
            );
            let (source, target) = match resolved {
                Ok(endpoints) => endpoints,
                Err(error) => {
                    warn!(
                        stage_id = %self.stage_id,
                        link = %error.link(),
                        error = %error,
                        "Skipping unresolved link"
                    );
                    state.retired_links.insert(record.id());
                    diagnostics.push(Diagnostic::Unresolved(error));
                    continue;
                }
            };
            let endpoints = (state.nodes.get(source), state.nodes.get(target));
            if let (Some(source), Some(target)) = endpoints {
                state
                    .links
                    .add_link(record.clone(), source, target, &self.config.output)?;
            }
        }

        let engine = state.engine.as_mut();
        engine.set_size(self.config.size);
        engine.set_link_strength(self.config.link_strength.clone());
        engine.set_link_distance(self.config.link_distance.clone());
        engine.set_charge_distance(self.config.charge_distance());
        engine.set_charge(self.config.charge.clone());
        engine.set_theta(self.config.theta);
        engine.set_gravity(self.config.gravity);
        engine.set_friction(self.config.friction);
        engine.set_nodes(&state.nodes);
        engine.set_links(&state.nodes, &state.links);

        let listener = (self.config.interactive && self.runtime.is_some())
            .then(|| self.bridge.listener(self.stage_id));
        engine.on_tick(listener);
        engine.start(&mut state.nodes, &state.links);
        engine.set_alpha(self.config.alpha);

        if state.phase == LayoutPhase::Unconfigured {
            info!(
                stage_id = %self.stage_id,
                nodes = state.nodes.len(),
                links = state.links.len(),
                "Force layout configured"
            );
        }
        state.phase = LayoutPhase::Configured;
        state.needs_setup = false;
        Ok(())
    }

    /// Decide under the stage lock whether a new periodic driver must be spawned
    fn claim_driver(&self, state: &mut StageState) -> bool {
        if self.runtime.is_none() || state.driver_live || !state.engine.is_running() {
            return false;
        }
        state.driver_live = true;
        true
    }

    fn spawn_driver(&mut self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let stage_id = self.stage_id;
        let period = Duration::from_millis(self.config.tick_interval_ms);

        info!(
            stage_id = %stage_id,
            period_ms = self.config.tick_interval_ms,
            "Starting layout driver"
        );
        self.ticker = Some(Ticker::spawn(runtime, period, move || {
            drive_step(&state, stage_id)
        }));
    }

    /// Turn the ticks completed by the periodic driver into reflow pulses.
    ///
    /// Coordinates are written onto the node records once per drain; one [`Reflow`] is
    /// returned per completed tick, oldest first.
    pub fn drain_ticks(&self) -> ForceResult<Vec<Reflow>> {
        let ticks = self.bridge.receive();
        if ticks.is_empty() {
            return self.take_fault().map(|()| Vec::new());
        }

        let fixed = self.inputs.fixed_ids();
        let active = self.inputs.active_node()?;
        let bounds = Bounds::new(self.config.bound, self.config.size);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shut_down {
            return Err(ForceError::ShutDown);
        }
        ConstraintResolver::new(&fixed, active.as_ref(), bounds, &self.config.output)
            .apply(&mut state.nodes);
        let fault = state.fault.take();
        drop(guard);

        let reflows = ticks
            .iter()
            .filter(|tick| tick.stage_id == self.stage_id)
            .map(|tick| self.reflow(tick.tick, tick.alpha))
            .collect();
        match fault {
            Some(error) => Err(error.into()),
            None => Ok(reflows),
        }
    }

    /// Advance a frame-driven interactive simulation by one step.
    ///
    /// Returns `None` when the simulation has cooled down, in batch mode, or when a
    /// periodic driver owns the stepping.
    pub fn advance_frame(&self) -> ForceResult<Option<Reflow>> {
        if !self.config.interactive || self.runtime.is_some() {
            debug!(stage_id = %self.stage_id, "Frame ignored, stage is not frame-driven");
            return Ok(None);
        }

        let fixed = self.inputs.fixed_ids();
        let active = self.inputs.active_node()?;
        let bounds = Bounds::new(self.config.bound, self.config.size);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shut_down {
            return Err(ForceError::ShutDown);
        }
        if !state.engine.is_running() {
            return Ok(None);
        }
        if state.engine.tick(&mut state.nodes)? {
            debug!(stage_id = %self.stage_id, "Layout converged");
            return Ok(None);
        }
        state.frames += 1;
        ConstraintResolver::new(&fixed, active.as_ref(), bounds, &self.config.output)
            .apply(&mut state.nodes);
        let (frame, alpha) = (state.frames, state.engine.alpha());
        drop(guard);

        Ok(Some(self.reflow(frame, alpha)))
    }

    fn reflow(&self, tick: u64, alpha: f64) -> Reflow {
        let mut nodes = ChangeSet::reflow();
        nodes.mark_modified(&self.config.output.x);
        nodes.mark_modified(&self.config.output.y);
        Reflow {
            nodes,
            links: ChangeSet::reflow(),
            link_source: self.inputs.links.name().to_string(),
            tick,
            alpha,
        }
    }

    fn take_fault(&self) -> ForceResult<()> {
        match self.state.lock().fault.take() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Replace the stage parameters. The simulation is fully reconfigured on the next
    /// invocation; node positions are kept.
    ///
    /// A new `seed` rebuilds the built-in simulation. Custom engines passed to
    /// [`ForceTransform::with_engine`] are kept as they are.
    pub fn update_config(&mut self, config: ForceConfig) -> ForceResult<()> {
        config.validate()?;
        let inputs = Inputs::resolve(&config, self.dataflow.as_ref())?;
        inputs.active_node()?;

        let leaving_interactive = self.config.interactive && !config.interactive;
        let reseed = self.default_engine && config.seed != self.config.seed;
        {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(ForceError::ShutDown);
            }
            state.needs_setup = true;
            if reseed {
                let engine = match config.seed {
                    Some(seed) => ForceLayout::with_seed(seed),
                    None => ForceLayout::new(),
                };
                state.engine = Box::new(engine);
                debug!(stage_id = %self.stage_id, seed = ?config.seed, "Simulation reseeded");
            }
            if leaving_interactive {
                state.engine.stop();
                state.engine.on_tick(None);
                state.driver_live = false;
                state.phase = LayoutPhase::Configured;
            }
        }
        if leaving_interactive {
            if let Some(ticker) = self.ticker.take() {
                ticker.cancel();
            }
            self.bridge.clear();
        }

        info!(
            stage_id = %self.stage_id,
            interactive = config.interactive,
            "Force layout reconfigured"
        );
        self.config = config;
        self.inputs = inputs;
        Ok(())
    }

    /// Stop the simulation and release it.
    ///
    /// The engine is stopped under the stage lock first, so no step runs after this
    /// returns. Further invocations fail with [`ForceError::ShutDown`].
    pub fn shutdown(&mut self) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.shut_down {
                return;
            }
            state.engine.stop();
            state.engine.on_tick(None);
            state.driver_live = false;
            state.shut_down = true;
            state.phase = LayoutPhase::Unconfigured;
            state.nodes = NodeRegistry::new();
            state.links = LinkRegistry::new();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        self.bridge.clear();
        info!(stage_id = %self.stage_id, "Force layout stage shut down");
    }

    /// Names of the fields this stage writes: node x and y, link source and target
    pub fn declared_fields(&self) -> [&str; 4] {
        self.config.output.all()
    }

    pub fn stage_id(&self) -> Uuid {
        self.stage_id
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn phase(&self) -> LayoutPhase {
        let state = self.state.lock();
        match state.phase {
            LayoutPhase::RunningInteractive if !state.engine.is_running() => {
                LayoutPhase::Configured
            }
            phase => phase,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.state.lock().engine.alpha()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Simulated position of a node, before clamping
    pub fn position(&self, id: RecordId) -> Option<Vec2> {
        self.state.lock().nodes.get(id).and_then(|node| node.position)
    }

    /// Whether a periodic driver is stepping the simulation
    pub fn is_driving(&self) -> bool {
        self.state.lock().driver_live
            && self.ticker.as_ref().is_some_and(|ticker| !ticker.is_finished())
    }
}

impl Drop for ForceTransform {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reject inconsistent changesets before anything is mutated
fn validate(
    state: &StageState,
    input: &ChangeSet,
    link_input: &ChangeSet,
) -> Result<(), ChangesetError> {
    state.nodes.check_additions(&input.add)?;
    let added_nodes: HashSet<RecordId> = input.added_ids().into_iter().collect();
    if let Some(unknown) = input
        .removed_ids()
        .into_iter()
        .find(|id| !state.nodes.contains(*id) && !added_nodes.contains(id))
    {
        return Err(ChangesetError::UnknownNode(unknown));
    }

    state.links.check_additions(&link_input.add)?;
    let added_links: HashSet<RecordId> = link_input.added_ids().into_iter().collect();
    if let Some(unknown) = link_input.removed_ids().into_iter().find(|id| {
        !state.links.contains(*id) && !added_links.contains(id) && !state.retired_links.contains(id)
    }) {
        return Err(ChangesetError::UnknownLink(unknown));
    }
    Ok(())
}

fn run_batch(state: &mut StageState, iterations: usize) -> Result<(), EngineError> {
    for _ in 0..iterations {
        // Convergence is ignored so the cost is fixed by `iterations`
        state.engine.tick(&mut state.nodes)?;
    }
    Ok(())
}

/// One period of the interactive driver; returns `false` to end the driver
fn drive_step(state: &Mutex<StageState>, stage_id: Uuid) -> bool {
    let mut guard = state.lock();
    let state = &mut *guard;
    if state.shut_down || state.fault.is_some() || !state.engine.is_running() {
        state.driver_live = false;
        return false;
    }

    match state.engine.tick(&mut state.nodes) {
        Ok(false) => true,
        Ok(true) => {
            debug!(stage_id = %stage_id, "Layout converged, driver idle");
            state.driver_live = false;
            false
        }
        Err(error) => {
            warn!(stage_id = %stage_id, error = %error, "Layout driver stopped on engine fault");
            state.fault = Some(error);
            state.driver_live = false;
            false
        }
    }
}
