//! Force layout stage integration tests (interactive mode)

use std::sync::Arc;
use std::time::Duration;

use cim_graph_force::{
    ChangeSet, ForceConfig, ForceError, ForceTransform, InMemoryDataflow, LayoutPhase, Record,
};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

fn dataflow() -> Arc<InMemoryDataflow> {
    let dataflow = Arc::new(InMemoryDataflow::new());
    dataflow.source("links");
    dataflow.define_signal("drag", Value::Null);
    dataflow
}

fn interactive_config() -> ForceConfig {
    ForceConfig::from_json(json!({
        "type": "force",
        "links": "links",
        "interactive": true,
        "active": "drag",
        "size": [200, 200],
        "tickIntervalMs": 1,
        "seed": 17
    }))
    .unwrap()
}

fn with_graph(dataflow: &InMemoryDataflow, nodes: usize) -> Vec<Record> {
    let records = dataflow.records(&vec![json!({}); nodes]);
    let edges: Vec<Value> = (1..nodes)
        .map(|i| json!({"source": i - 1, "target": i}))
        .collect();
    dataflow.ingest("links", &edges);
    records
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_driver_produces_reflows_until_shutdown() {
        let dataflow = dataflow();
        let mut stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        let nodes = with_graph(&dataflow, 5);

        let output = assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));
        assert!(output.changeset.touches("layout_x"));
        assert!(stage.is_driving());
        assert_eq!(stage.phase(), LayoutPhase::RunningInteractive);
        assert_eq!(stage.link_count(), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let reflows = assert_ok!(stage.drain_ticks());
        assert!(!reflows.is_empty());
        for pair in reflows.windows(2) {
            assert!(pair[0].tick < pair[1].tick);
        }
        let reflow = &reflows[0];
        assert!(reflow.nodes.reflow);
        assert!(reflow.nodes.touches("layout_y"));
        assert!(reflow.links.reflow);
        assert_eq!(reflow.link_source, "links");
        for node in &nodes {
            let x = node.get_f64("layout_x").unwrap();
            assert!((0.0..=200.0).contains(&x));
        }

        stage.shutdown();
        assert!(!stage.is_driving());
        assert_eq!(stage.alpha(), 0.0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(assert_ok!(stage.drain_ticks()).is_empty());
        assert!(matches!(
            assert_err!(stage.transform(ChangeSet::new())),
            ForceError::ShutDown
        ));
    }

    #[tokio::test]
    async fn test_dragged_node_follows_pointer() {
        let dataflow = dataflow();
        let mut stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        let nodes = with_graph(&dataflow, 4);
        assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));

        dataflow.define_signal("drag", Value::Null).set(json!({
            "id": nodes[0].id().get(),
            "x": 50.0,
            "y": 50.0,
            "update": true
        }));
        assert_ok!(stage.transform(ChangeSet::new()));
        assert_eq!(nodes[0].get_f64("layout_x"), Some(50.0));
        assert_eq!(nodes[0].get_f64("layout_y"), Some(50.0));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_ok!(stage.drain_ticks());
        assert_eq!(nodes[0].get_f64("layout_x"), Some(50.0));
        assert_eq!(nodes[0].get_f64("layout_y"), Some(50.0));
    }

    #[tokio::test]
    async fn test_drag_restarts_a_cooled_layout() {
        let dataflow = dataflow();
        let mut stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        let nodes = with_graph(&dataflow, 3);
        assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));

        assert!(wait_until(|| !stage.is_driving()).await);
        assert_eq!(stage.alpha(), 0.0);
        assert_eq!(stage.phase(), LayoutPhase::Configured);
        assert_ok!(stage.drain_ticks());

        // Hovering does not reheat
        dataflow.define_signal("drag", Value::Null).set(json!({
            "id": nodes[1].id().get(),
            "x": 20.0,
            "y": 20.0
        }));
        assert_ok!(stage.transform(ChangeSet::new()));
        assert_eq!(stage.alpha(), 0.0);

        dataflow.define_signal("drag", Value::Null).set(json!({
            "id": nodes[1].id().get(),
            "x": 20.0,
            "y": 20.0,
            "update": true
        }));
        assert_ok!(stage.transform(ChangeSet::new()));
        assert!(stage.alpha() > 0.0);
        assert!(stage.is_driving());
    }

    #[test]
    fn test_frame_driven_without_runtime() {
        let dataflow = dataflow();
        let mut stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        let nodes = with_graph(&dataflow, 3);
        assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));
        assert!(!stage.is_driving());
        assert_eq!(stage.phase(), LayoutPhase::RunningInteractive);

        let first = assert_ok!(stage.advance_frame()).unwrap();
        assert_eq!(first.tick, 1);
        assert!(first.nodes.touches("layout_x"));

        let mut frames = 1;
        while assert_ok!(stage.advance_frame()).is_some() {
            frames += 1;
        }
        // 0.1 * 0.99^n drops below 0.005 after 298 steps
        assert_eq!(frames, 298);
        assert_eq!(stage.phase(), LayoutPhase::Configured);
        assert!(assert_ok!(stage.drain_ticks()).is_empty());
    }

    #[test]
    fn test_node_pinned_while_moving_holds_still() {
        let dataflow = dataflow();
        dataflow.source("pinned");
        let config = assert_ok!(ForceConfig::from_json(json!({
            "links": "links",
            "interactive": true,
            "fixed": "pinned",
            "size": [200, 200],
            "seed": 17
        })));
        let mut stage = assert_ok!(ForceTransform::new(config, dataflow.clone())).without_runtime();
        let nodes = with_graph(&dataflow, 4);
        assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));
        for _ in 0..5 {
            assert!(assert_ok!(stage.advance_frame()).is_some());
        }

        dataflow.ingest("pinned", &[json!({"id": nodes[0].id().get()})]);
        assert_ok!(stage.transform(ChangeSet::new()));
        let held = stage.position(nodes[0].id()).unwrap();
        let written = nodes[0].get_f64("layout_x");

        for _ in 0..3 {
            assert!(assert_ok!(stage.advance_frame()).is_some());
            assert_eq!(stage.position(nodes[0].id()), Some(held));
        }
        assert_eq!(nodes[0].get_f64("layout_x"), written);
    }

    #[test]
    fn test_removed_node_is_never_stepped_again() {
        let dataflow = dataflow();
        let stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        let mut stage = stage.without_runtime();
        let nodes = with_graph(&dataflow, 4);
        assert_ok!(stage.transform(ChangeSet::new().with_add(nodes.clone())));
        for _ in 0..3 {
            assert!(assert_ok!(stage.advance_frame()).is_some());
        }

        assert_ok!(stage.transform(ChangeSet::new().with_rem([nodes[1].clone()])));
        assert_eq!(stage.node_count(), 3);
        // 0-1 and 1-2 go with node 1
        assert_eq!(stage.link_count(), 1);
        assert_eq!(stage.position(nodes[1].id()), None);
        let frozen = (nodes[1].get_f64("layout_x"), nodes[1].get_f64("layout_y"));

        let reflow = assert_ok!(stage.advance_frame()).unwrap();
        assert!(reflow.alpha > 0.0);
        for _ in 0..20 {
            assert!(assert_ok!(stage.advance_frame()).is_some());
        }

        for node in [&nodes[0], &nodes[2], &nodes[3]] {
            assert!(stage.position(node.id()).unwrap().is_finite());
        }
        assert_eq!(
            (nodes[1].get_f64("layout_x"), nodes[1].get_f64("layout_y")),
            frozen
        );
    }

    #[tokio::test]
    async fn test_leaving_interactive_mode_stops_the_driver() {
        let dataflow = dataflow();
        let mut stage = assert_ok!(ForceTransform::new(interactive_config(), dataflow.clone()));
        assert_ok!(stage.transform(ChangeSet::new().with_add(with_graph(&dataflow, 3))));
        assert!(stage.is_driving());

        let mut config = interactive_config();
        config.interactive = false;
        config.iterations = 10;
        assert_ok!(stage.update_config(config));
        assert!(!stage.is_driving());

        assert_ok!(stage.transform(ChangeSet::new()));
        assert_eq!(stage.phase(), LayoutPhase::Configured);
        assert_eq!(stage.alpha(), 0.0);
    }
}
