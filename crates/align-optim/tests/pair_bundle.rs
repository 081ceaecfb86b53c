use align_core::synthetic::SyntheticRig;
use align_core::{CorrespondenceSource, PairCorrespondences, PairTransform, ValidityFilter};
use align_linear::initialize_pairs;
use align_optim::{
    optimize_pair_bundle, BackendSolveOptions, PairBundleDataset, PairBundleSolveOptions, PairKey,
};
use std::collections::BTreeMap;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn perturbed(t: &PairTransform) -> PairTransform {
    let mut out = *t;
    out.rotation[0] += 0.03;
    out.rotation[2] -= 0.02;
    out.translation[1] += 0.05;
    out.scale[2] *= 1.02;
    out
}

#[test]
fn refines_perturbed_seeds_back_to_ground_truth() {
    init_logging();
    let rig = SyntheticRig::ring(3);
    let sets = rig.point_sets().unwrap();
    let pairs = PairCorrespondences::build(&sets, &ValidityFilter::default());
    let init = initialize_pairs(&pairs, 3);
    assert_eq!(init.estimates.len(), 6);

    let seeds: BTreeMap<PairKey, PairTransform> = init
        .estimates
        .iter()
        .map(|e| ((e.from, e.to), perturbed(&e.transform)))
        .collect();
    let dataset = PairBundleDataset::from_correspondences(pairs.iter()).unwrap();

    let result = optimize_pair_bundle(
        &dataset,
        &seeds,
        &PairBundleSolveOptions::default(),
        &BackendSolveOptions {
            max_iters: 200,
            ..Default::default()
        },
    )
    .unwrap();

    assert!(result.skipped.is_empty());
    assert_eq!(result.report.num_pairs, 6);
    assert!(
        result.report.final_cost < result.report.initial_cost,
        "cost {} -> {}",
        result.report.initial_cost,
        result.report.final_cost
    );

    for ((from, to), transform) in &result.refined {
        assert_ne!(from, to);
        let gt = rig.ground_truth_pair(*from, *to).unwrap();
        let diff = (transform.to_matrix() - gt).abs().max();
        assert!(diff < 1e-6, "pair {}->{}: max diff {}", from, to, diff);
    }
}

#[test]
fn pair_without_enough_points_keeps_out_of_problem() {
    init_logging();
    let rig = SyntheticRig::ring(2);
    let sets = rig.point_sets().unwrap();
    let pairs = PairCorrespondences::build(&sets, &ValidityFilter::default());
    let dataset = PairBundleDataset::from_correspondences(pairs.iter()).unwrap();
    let seeds: BTreeMap<PairKey, PairTransform> = [((0, 1), PairTransform::identity())].into();

    // Only 0->1 has a seed; demanding more points than exist leaves nothing to solve.
    let opts = PairBundleSolveOptions {
        min_correspondences: 10_000,
        ..Default::default()
    };
    assert!(optimize_pair_bundle(&dataset, &seeds, &opts, &BackendSolveOptions::default()).is_err());
}

#[test]
fn iteration_cap_limits_one_solve() {
    init_logging();
    let rig = SyntheticRig::ring(4);
    let sets = rig.point_sets().unwrap();
    let pairs = PairCorrespondences::build(&sets, &ValidityFilter::default());
    let init = initialize_pairs(&pairs, 3);
    let seeds: BTreeMap<PairKey, PairTransform> = init
        .estimates
        .iter()
        .map(|e| {
            let mut t = e.transform;
            t.rotation[1] += 0.3;
            t.translation[0] += 0.5;
            t.scale = [t.scale[0] * 1.2, t.scale[1] * 0.8, t.scale[2] * 1.2];
            ((e.from, e.to), t)
        })
        .collect();
    let dataset = PairBundleDataset::from_correspondences(pairs.iter()).unwrap();
    let solve = |max_iters| {
        optimize_pair_bundle(
            &dataset,
            &seeds,
            &PairBundleSolveOptions::default(),
            &BackendSolveOptions {
                max_iters,
                ..Default::default()
            },
        )
        .unwrap()
        .report
    };

    let capped = solve(1);
    assert_eq!(capped.iterations, 1);
    assert!(!capped.converged);
    assert!(capped.final_cost < capped.initial_cost);
    assert!(capped.final_cost > 1e-10, "one iteration reached {}", capped.final_cost);

    let free = solve(200);
    assert!(free.iterations > 1 && free.iterations <= 200);
    assert!(free.final_cost < capped.final_cost);
}
