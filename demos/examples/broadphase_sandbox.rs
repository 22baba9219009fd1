// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drives both broad-phase backends through a tiny falling-boxes world:
//! insert a floor and a shower of crates, step them downward, and print the
//! pair counts each backend reports, plus a ray pick through the stack.

use bracken_broadphase::backends::{AxisSweep16, DbvtBroadPhase};
use bracken_broadphase::{Aabb3, BroadPhase, RayCallback, Vec3, dispatch_pairs};
use bracken_geom::RayCast;
use bracken_pairs::{
    AlgorithmId, Dispatcher, FilterGroups, ManifoldId, PairCache, ProxyId,
};
use bracken_tasks::SequentialScheduler;

/// A dispatcher that just counts lifecycle traffic, standing in for a real
/// narrow phase.
#[derive(Default)]
struct CountingDispatcher {
    freed_algorithms: usize,
    manifolds: u32,
}

impl Dispatcher for CountingDispatcher {
    fn free_algorithm(&mut self, _algorithm: AlgorithmId) {
        self.freed_algorithms += 1;
    }

    fn new_manifold(&mut self, _a: ProxyId, _b: ProxyId) -> ManifoldId {
        self.manifolds += 1;
        ManifoldId(self.manifolds)
    }

    fn release_manifold(&mut self, _manifold: ManifoldId) {}

    fn clear_manifold(&mut self, _manifold: ManifoldId) {}
}

struct FirstHit {
    hit: Option<u32>,
}

impl RayCallback<u32> for FirstHit {
    fn process(&mut self, _proxy: ProxyId, payload: &u32, _ray: &mut RayCast) -> bool {
        // Take whatever the traversal reaches first and stop the walk.
        self.hit = Some(*payload);
        true
    }
}

fn step_world<B: BroadPhase<u32>>(
    bp: &mut B,
    dispatcher: &mut CountingDispatcher,
    crates: &[ProxyId],
    label: &str,
) {
    // Let the crates fall a few frames and watch the overlap set evolve.
    for frame in 0..5 {
        for (i, &id) in crates.iter().enumerate() {
            let aabb = bp.aabb(id);
            let drop = Vec3::new(0.0, -1.5 - (i % 3) as f32 * 0.5, 0.0);
            bp.set_aabb(id, aabb.min + drop, aabb.max + drop, dispatcher);
        }
        bp.calculate_overlapping_pairs(dispatcher);
        println!(
            "[{label}] frame {frame}: {} overlapping pairs",
            bp.pair_cache().len()
        );
    }

    // Fan the surviving pairs out the way a narrow phase would.
    dispatch_pairs(&SequentialScheduler, bp.pair_cache().pairs(), 8, &|pair| {
        let _ = pair.key();
    });
}

fn populate<B: BroadPhase<u32>>(
    bp: &mut B,
    dispatcher: &mut CountingDispatcher,
) -> Vec<ProxyId> {
    // Static floor.
    bp.create_proxy(
        Vec3::new(-50.0, -2.0, -50.0),
        Vec3::new(50.0, 0.0, 50.0),
        1000,
        FilterGroups::STATIC,
        FilterGroups::ALL,
        dispatcher,
    )
    .expect("floor proxy");

    // A loose grid of crates hanging in the air.
    let mut crates = Vec::new();
    for i in 0..24u32 {
        let x = (i % 6) as f32 * 3.0 - 9.0;
        let z = (i / 6) as f32 * 3.0 - 6.0;
        let y = 10.0 + (i % 4) as f32 * 2.5;
        let id = bp
            .create_proxy(
                Vec3::new(x, y, z),
                Vec3::new(x + 2.0, y + 2.0, z + 2.0),
                i,
                FilterGroups::DEFAULT,
                FilterGroups::ALL,
                dispatcher,
            )
            .expect("crate proxy");
        crates.push(id);
    }
    crates
}

fn main() {
    let world = Aabb3::new(Vec3::splat(-100.0), Vec3::splat(100.0));
    let mut dispatcher = CountingDispatcher::default();

    let mut sweep: AxisSweep16<u32> = AxisSweep16::new(world, 256);
    let crates = populate(&mut sweep, &mut dispatcher);
    step_world(&mut sweep, &mut dispatcher, &crates, "axis-sweep");

    let mut tree: DbvtBroadPhase<u32> = DbvtBroadPhase::default();
    let crates = populate(&mut tree, &mut dispatcher);
    step_world(&mut tree, &mut dispatcher, &crates, "dbvt");

    // Pick through the middle of the crate field.
    let mut pick = FirstHit { hit: None };
    tree.ray_test(
        Vec3::new(0.5, 40.0, 0.5),
        Vec3::new(0.5, -10.0, 0.5),
        &mut pick,
        Vec3::ZERO,
        Vec3::ZERO,
    );
    match pick.hit {
        Some(tag) => println!("ray pick hit crate {tag}"),
        None => println!("ray pick hit nothing"),
    }
    println!(
        "dispatcher saw {} algorithm releases",
        dispatcher.freed_algorithms
    );
}
