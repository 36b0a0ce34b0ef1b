use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use forcelayout::clock::{ManualClock, SystemClock};
use forcelayout::config::{ParamUpdate, Parameters};
use forcelayout::graph::{Branch, Data};
use forcelayout::integrator::Integrator;
use forcelayout::scheduler::{FrameLoop, ManualScheduler};
use forcelayout::system::ParticleSystem;
use forcelayout::vector::Vector;

fn branch(value: serde_json::Value) -> Branch {
    serde_json::from_value(value).unwrap()
}

fn ring(n: usize) -> Branch {
    let mut edges = serde_json::Map::new();
    for i in 0..n {
        edges.insert(
            format!("n{i}"),
            json!({ format!("n{}", (i + 1) % n): {} }),
        );
    }
    branch(json!({ "edges": edges }))
}

/// Drive an inline system against a manual clock until nothing moves
fn run_to_rest(system: &mut ParticleSystem, clock: &ManualClock, max_frames: usize) -> usize {
    let interval = system.frame_interval();
    for frame in 0..max_frames {
        if !system.frame() && !system.has_pending_changes() {
            return frame;
        }
        clock.advance(interval);
    }
    max_frames
}

#[test]
fn ring_layout_settles() {
    let clock = Arc::new(ManualClock::new());
    let mut system = ParticleSystem::inline(Parameters::default(), clock.clone());
    system.graft(&ring(12));
    system.flush();

    let frames = run_to_rest(&mut system, &clock, 5000);

    assert!(frames < 5000, "layout never settled");
    assert!(system.energy().settle_measure() < system.parameters().energy_threshold);
    for node in system.nodes() {
        let p = node.position.expect("every node is placed");
        assert!(p.x.is_finite() && p.y.is_finite());
    }
}

#[test]
fn layouts_are_reproducible() {
    let layout = |integrator| {
        let clock = Arc::new(ManualClock::new());
        let params = Parameters {
            integrator,
            ..Parameters::default()
        };
        let mut system = ParticleSystem::inline(params, clock.clone());
        system.graft(&ring(8));
        system.flush();
        run_to_rest(&mut system, &clock, 300);
        system.nodes().map(|n| n.position).collect::<Vec<_>>()
    };

    assert_eq!(layout(Integrator::Verlet), layout(Integrator::Verlet));
    assert_eq!(layout(Integrator::Euler), layout(Integrator::Euler));
}

#[test]
fn local_edit_is_not_overwritten_by_older_geometry() {
    let clock = Arc::new(ManualClock::new());
    let mut system = ParticleSystem::inline(Parameters::default(), clock.clone());
    system.add_node("a", Data::new());
    system.flush();
    assert!(system.frame());

    let target = Vector::new(50.0, 50.0);
    system.set_position("a", target);

    // the engine has not seen the move yet; its snapshot is stale
    assert!(!system.frame());
    assert_eq!(system.get_node("a").unwrap().position, Some(target));

    clock.advance(Duration::from_millis(system.parameters().debounce_ms));
    assert!(system.frame());
    let p = system.get_node("a").unwrap().position.unwrap();
    assert!((p - target).magnitude() < 1.0, "moved to {p:?}");
}

#[test]
fn merge_then_layout_keeps_only_branch_nodes() {
    let clock = Arc::new(ManualClock::new());
    let mut system = ParticleSystem::inline(Parameters::default(), clock.clone());
    system.graft(&ring(5));
    system.flush();
    run_to_rest(&mut system, &clock, 50);

    let diff = system.merge(&branch(json!({ "edges": { "n0": { "n1": {} } } })));
    system.flush();
    run_to_rest(&mut system, &clock, 50);

    assert_eq!(diff.dropped_nodes.len(), 3);
    let names: Vec<&str> = system.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["n0", "n1"]);
    assert_eq!(system.edge_count(), 1);
}

#[test]
fn frame_loop_drives_frames_and_restarts_at_new_rate() {
    let clock = Arc::new(ManualClock::new());
    let mut system = ParticleSystem::inline(Parameters::default(), clock.clone());
    system.graft(&ring(4));
    system.flush();

    let system = Arc::new(Mutex::new(system));
    let scheduler = ManualScheduler::new();
    let mut frame_loop = FrameLoop::start(Arc::clone(&system), &scheduler);

    for _ in 0..5 {
        scheduler.fire();
    }
    assert_eq!(system.lock().unwrap().frames_drawn(), 5);

    system.lock().unwrap().set_parameters(ParamUpdate {
        fps: Some(20.0),
        ..Default::default()
    });
    frame_loop.restart(&scheduler);
    assert_eq!(scheduler.intervals(), vec![Duration::from_millis(50)]);

    frame_loop.stop();
    scheduler.fire();
    assert_eq!(system.lock().unwrap().frames_drawn(), 5);
}

#[tokio::test]
async fn worker_engine_positions_every_node() {
    let mut system = ParticleSystem::threaded(Parameters::default(), Arc::new(SystemClock));
    system.graft(&ring(6));
    system.flush();

    let mut placed = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        system.frame();
        if system.nodes().all(|n| n.position.is_some()) && system.energy().n == 6 {
            placed = true;
            break;
        }
    }

    assert!(placed, "worker never reported geometry");
}
