//! Force layout stage integration tests (batch mode)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cim_graph_force::{
    errors::Endpoint,
    layout::TickListener,
    registry::{LinkRegistry, NodeRegistry},
    ChangeSet, ChangesetError, ConfigError, Diagnostic, EngineError, ForceConfig,
    ForceError, ForceLayout, ForceTransform, InMemoryDataflow, LayoutEngine, LayoutPhase, Record,
    RecordId, ResolutionError, Scalar,
};
use serde_json::{json, Value};

/// Wraps the default simulation and counts `tick()` calls
struct CountingEngine {
    inner: ForceLayout,
    ticks: Arc<AtomicUsize>,
}

impl LayoutEngine for CountingEngine {
    fn set_size(&mut self, size: [f64; 2]) {
        self.inner.set_size(size)
    }

    fn set_link_strength(&mut self, strength: Scalar) {
        self.inner.set_link_strength(strength)
    }

    fn set_link_distance(&mut self, distance: Scalar) {
        self.inner.set_link_distance(distance)
    }

    fn set_charge(&mut self, charge: Scalar) {
        self.inner.set_charge(charge)
    }

    fn set_charge_distance(&mut self, distance: Scalar) {
        self.inner.set_charge_distance(distance)
    }

    fn set_theta(&mut self, theta: f64) {
        self.inner.set_theta(theta)
    }

    fn set_friction(&mut self, friction: f64) {
        self.inner.set_friction(friction)
    }

    fn set_gravity(&mut self, gravity: f64) {
        self.inner.set_gravity(gravity)
    }

    fn set_nodes(&mut self, nodes: &NodeRegistry) {
        self.inner.set_nodes(nodes)
    }

    fn set_links(&mut self, nodes: &NodeRegistry, links: &LinkRegistry) {
        self.inner.set_links(nodes, links)
    }

    fn on_tick(&mut self, listener: Option<TickListener>) {
        self.inner.on_tick(listener)
    }

    fn start(&mut self, nodes: &mut NodeRegistry, links: &LinkRegistry) {
        self.inner.start(nodes, links)
    }

    fn alpha(&self) -> f64 {
        self.inner.alpha()
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.inner.set_alpha(alpha)
    }

    fn tick(&mut self, nodes: &mut NodeRegistry) -> Result<bool, EngineError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        self.inner.tick(nodes)
    }

    fn stop(&mut self) {
        self.inner.stop()
    }
}

/// Dataflow with the `links` and `pinned` data sets and the `drag` signal
fn dataflow() -> Arc<InMemoryDataflow> {
    let dataflow = Arc::new(InMemoryDataflow::new());
    dataflow.source("links");
    dataflow.source("pinned");
    dataflow.define_signal("drag", Value::Null);
    dataflow
}

fn stage(dataflow: &Arc<InMemoryDataflow>, config: Value) -> ForceTransform {
    let config = ForceConfig::from_json(config).unwrap();
    ForceTransform::new(config, dataflow.clone()).unwrap()
}

fn node_records(dataflow: &InMemoryDataflow, count: usize) -> Vec<Record> {
    dataflow.records(&vec![json!({}); count])
}

fn coords(record: &Record) -> (f64, f64) {
    (
        record.get_f64("layout_x").unwrap(),
        record.get_f64("layout_y").unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_stay_inside_bounds() {
        let dataflow = dataflow();
        let mut stage = stage(
            &dataflow,
            json!({
                "type": "force",
                "links": "links",
                "size": [100, 100],
                "iterations": 50,
                "seed": 1
            }),
        );
        let nodes = node_records(&dataflow, 3);

        let output = stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        assert!(output.diagnostics.is_empty());
        assert!(output.changeset.touches("layout_x"));
        assert!(output.changeset.touches("layout_y"));
        for node in &nodes {
            let (x, y) = coords(node);
            assert!((0.0..=100.0).contains(&x), "x = {x}");
            assert!((0.0..=100.0).contains(&y), "y = {y}");
        }
        assert_eq!(stage.phase(), LayoutPhase::Configured);
        assert_eq!(stage.alpha(), 0.0);
    }

    #[test]
    fn test_isolated_spring_reaches_rest_length() {
        let dataflow = dataflow();
        let mut stage = stage(
            &dataflow,
            json!({
                "links": "links",
                "charge": 0,
                "gravity": 0,
                "linkResolution": "identity",
                "seed": 21
            }),
        );
        let nodes = node_records(&dataflow, 2);
        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        dataflow.ingest(
            "links",
            &[json!({"source": nodes[0].id().get(), "target": nodes[1].id().get()})],
        );
        let output = stage.transform(ChangeSet::new()).unwrap();
        assert!(output.diagnostics.is_empty());
        assert_eq!(stage.link_count(), 1);

        let a = stage.position(nodes[0].id()).unwrap();
        let b = stage.position(nodes[1].id()).unwrap();
        let distance = a.distance(b);
        assert!((distance - 20.0).abs() < 2.0, "distance = {distance}");
    }

    #[test]
    fn test_batch_runs_exactly_the_tick_budget() {
        let dataflow = dataflow();
        let ticks = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine {
            inner: ForceLayout::with_seed(4),
            ticks: ticks.clone(),
        };
        let config = ForceConfig::from_json(json!({"links": "links", "iterations": 37})).unwrap();
        let mut stage =
            ForceTransform::with_engine(config, dataflow.clone(), Box::new(engine)).unwrap();

        stage
            .transform(ChangeSet::new().with_add(node_records(&dataflow, 3)))
            .unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 37);

        // Convergence does not shorten the budget
        stage.transform(ChangeSet::new()).unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 74);
    }

    #[test]
    fn test_zero_iterations_still_places_nodes() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 0, "seed": 2}));
        let nodes = node_records(&dataflow, 4);

        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        for node in &nodes {
            let (x, y) = coords(node);
            assert!((0.0..=500.0).contains(&x));
            assert!((0.0..=500.0).contains(&y));
        }
    }

    #[test]
    fn test_empty_node_set_is_normal() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 10}));

        let output = stage.transform(ChangeSet::new()).unwrap();

        assert!(output.changeset.is_empty());
        assert_eq!(stage.node_count(), 0);
        assert_eq!(stage.phase(), LayoutPhase::Configured);
    }

    #[test]
    fn test_existing_positions_survive_additions() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 0, "seed": 3}));
        let first = node_records(&dataflow, 3);
        stage.transform(ChangeSet::new().with_add(first.clone())).unwrap();
        let before: Vec<_> = first.iter().map(|n| stage.position(n.id())).collect();

        let second = node_records(&dataflow, 1);
        stage.transform(ChangeSet::new().with_add(second.clone())).unwrap();

        let after: Vec<_> = first.iter().map(|n| stage.position(n.id())).collect();
        assert_eq!(before, after);
        assert_eq!(stage.node_count(), 4);
        assert!(stage.position(second[0].id()).is_some());
    }

    #[test]
    fn test_node_removal_cascades_to_links() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 20, "seed": 8}));
        let nodes = node_records(&dataflow, 3);
        let links = dataflow.ingest(
            "links",
            &[json!({"source": 0, "target": 1}), json!({"source": 1, "target": 2})],
        );
        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();
        assert_eq!(stage.link_count(), 2);

        // Resolved endpoints are mirrored onto the link records
        let first_link = &links.add[0];
        assert_eq!(first_link.get_record("_source").unwrap().id(), nodes[0].id());
        assert_eq!(first_link.get_record("_target").unwrap().id(), nodes[1].id());

        stage
            .transform(ChangeSet::new().with_rem(vec![nodes[2].clone()]))
            .unwrap();
        assert_eq!(stage.node_count(), 2);
        assert_eq!(stage.link_count(), 1);
        assert!(stage.position(nodes[2].id()).is_none());

        // Upstream may still retract the link that was cascaded away
        dataflow.source("links").remove(&[links.add[1].id()]);
        stage.transform(ChangeSet::new()).unwrap();
        assert_eq!(stage.link_count(), 1);
    }

    #[test]
    fn test_fixed_nodes_do_not_move() {
        let dataflow = dataflow();
        let definition = json!({"links": "links", "fixed": "pinned", "iterations": 0, "seed": 11});
        let mut stage = stage(&dataflow, definition.clone());
        let nodes = node_records(&dataflow, 3);
        dataflow.ingest(
            "links",
            &[json!({"source": 0, "target": 1}), json!({"source": 1, "target": 2})],
        );
        dataflow.ingest("pinned", &[json!({"id": nodes[1].id().get()})]);

        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();
        let pinned_before = stage.position(nodes[1].id()).unwrap();
        let free_before = stage.position(nodes[0].id()).unwrap();

        let mut config = ForceConfig::from_json(definition).unwrap();
        config.iterations = 200;
        stage.update_config(config).unwrap();
        stage.transform(ChangeSet::new()).unwrap();

        assert_eq!(stage.position(nodes[1].id()).unwrap(), pinned_before);
        assert_ne!(stage.position(nodes[0].id()).unwrap(), free_before);
    }

    #[test]
    fn test_new_seed_rebuilds_the_simulation() {
        let definition = |seed: u64| json!({"links": "links", "iterations": 10, "seed": seed});
        let reseeded_flow = dataflow();
        let mut reseeded = stage(&reseeded_flow, definition(1));
        reseeded
            .update_config(ForceConfig::from_json(definition(2)).unwrap())
            .unwrap();
        let fresh_flow = dataflow();
        let mut fresh = stage(&fresh_flow, definition(2));

        let reseeded_nodes = node_records(&reseeded_flow, 3);
        let fresh_nodes = node_records(&fresh_flow, 3);
        reseeded
            .transform(ChangeSet::new().with_add(reseeded_nodes.clone()))
            .unwrap();
        fresh
            .transform(ChangeSet::new().with_add(fresh_nodes.clone()))
            .unwrap();

        for (a, b) in reseeded_nodes.iter().zip(&fresh_nodes) {
            assert_eq!(coords(a), coords(b));
        }
    }

    #[test]
    fn test_drag_overrides_position() {
        let dataflow = dataflow();
        let mut stage = stage(
            &dataflow,
            json!({"links": "links", "active": "drag", "size": [100, 100], "seed": 5}),
        );
        let nodes = node_records(&dataflow, 3);
        dataflow.define_signal("drag", Value::Null).set(json!({
            "id": nodes[0].id().get(),
            "x": 10.0,
            "y": 10.0,
            "update": true
        }));

        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        assert_eq!(coords(&nodes[0]), (10.0, 10.0));
        let position = stage.position(nodes[0].id()).unwrap();
        assert_eq!((position.x, position.y), (10.0, 10.0));
    }

    #[test]
    fn test_unresolved_link_is_reported_and_skipped() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 5}));
        let nodes = node_records(&dataflow, 2);
        let links = dataflow.ingest("links", &[json!({"source": 0, "target": 5})]);

        let output = stage.transform(ChangeSet::new().with_add(nodes)).unwrap();

        assert_eq!(
            output.diagnostics,
            vec![Diagnostic::Unresolved(ResolutionError::IndexOutOfBatch {
                link: links.add[0].id(),
                endpoint: Endpoint::Target,
                index: 5,
                batch_len: 2,
            })]
        );
        assert_eq!(stage.link_count(), 0);
        assert!(!links.add[0].has("_source"));

        dataflow.source("links").remove(&[links.add[0].id()]);
        assert!(stage.transform(ChangeSet::new()).is_ok());
    }

    #[test]
    fn test_inconsistent_changesets_leave_state_untouched() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 5}));
        let nodes = node_records(&dataflow, 2);
        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        let fresh = node_records(&dataflow, 1);
        let error = stage
            .transform(ChangeSet::new().with_add(vec![fresh[0].clone(), nodes[0].clone()]))
            .unwrap_err();
        assert!(matches!(
            error,
            ForceError::Changeset(ChangesetError::DuplicateNode(id)) if id == nodes[0].id()
        ));
        assert_eq!(stage.node_count(), 2);
        assert!(stage.position(fresh[0].id()).is_none());

        let stranger = Record::new(RecordId::new(9999));
        let error = stage
            .transform(ChangeSet::new().with_rem(vec![stranger]))
            .unwrap_err();
        assert!(matches!(
            error,
            ForceError::Changeset(ChangesetError::UnknownNode(id)) if id == RecordId::new(9999)
        ));
        assert_eq!(stage.node_count(), 2);
    }

    #[test]
    fn test_link_endpoint_edits_are_diagnosed() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 5}));
        let nodes = node_records(&dataflow, 2);
        let links = dataflow.ingest("links", &[json!({"source": 0, "target": 1})]);
        stage.transform(ChangeSet::new().with_add(nodes.clone())).unwrap();

        let link = links.add[0].clone();
        link.set("target", json!(0));
        dataflow
            .source("links")
            .apply(ChangeSet::new().with_modified(vec![link.clone()], ["target"]));
        let output = stage.transform(ChangeSet::new()).unwrap();

        assert_eq!(
            output.diagnostics,
            vec![Diagnostic::UnsupportedLinkEdit {
                link: link.id(),
                field: "target".to_string(),
            }]
        );
        let target = link.get_record("_target").unwrap();
        assert_eq!(target.id(), nodes[1].id());
    }

    #[test]
    fn test_definition_errors() {
        let error = ForceConfig::from_json(json!({"type": "force"})).unwrap_err();
        assert!(matches!(error, ConfigError::MissingLinks));

        let dataflow = Arc::new(InMemoryDataflow::new());
        let config = ForceConfig::from_json(json!({"links": "edges"})).unwrap();
        let error = ForceTransform::new(config, dataflow.clone()).err().unwrap();
        assert!(matches!(
            error,
            ForceError::Config(ConfigError::UnknownData(name)) if name == "edges"
        ));

        dataflow.source("edges");
        let config = ForceConfig::from_json(json!({"links": "edges", "active": "drag"})).unwrap();
        let error = ForceTransform::new(config, dataflow.clone()).err().unwrap();
        assert!(matches!(error, ForceError::Config(ConfigError::UnknownSignal(_))));
    }

    #[test]
    fn test_malformed_active_signal_fails_construction() {
        let dataflow = dataflow();
        dataflow
            .define_signal("drag", Value::Null)
            .set(json!({"id": 1, "x": "left"}));
        let config = ForceConfig::from_json(json!({"links": "links", "active": "drag"})).unwrap();

        let error = ForceTransform::new(config, dataflow.clone()).err().unwrap();
        assert!(matches!(error, ForceError::Config(ConfigError::MalformedActive(_))));
    }

    #[test]
    fn test_declared_fields_follow_output_names() {
        let dataflow = dataflow();
        let stage = stage(
            &dataflow,
            json!({"links": "links", "output": {"x": "px", "y": "py", "source": "from"}}),
        );
        assert_eq!(stage.declared_fields(), ["px", "py", "from", "_target"]);
        assert_eq!(stage.phase(), LayoutPhase::Unconfigured);
    }

    #[test]
    fn test_shutdown_rejects_invocations() {
        let dataflow = dataflow();
        let mut stage = stage(&dataflow, json!({"links": "links", "iterations": 1}));
        stage
            .transform(ChangeSet::new().with_add(node_records(&dataflow, 2)))
            .unwrap();

        stage.shutdown();

        assert_eq!(stage.node_count(), 0);
        assert_eq!(stage.alpha(), 0.0);
        assert!(matches!(stage.transform(ChangeSet::new()), Err(ForceError::ShutDown)));
    }
}
