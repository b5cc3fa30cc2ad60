use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tensor_spline::{
    BSpline, BSplineBuilder, CodecError, FitError, KnotSpacing, SampleTable, Smoothing,
    bspline_interpolator, bspline_smoother, pspline_smoother,
};

fn surface(x0: f64, x1: f64) -> f64 {
    0.5 + 0.3 * (2.0 * x0).sin() + 0.2 * x1 * x1
}

fn grid_table(per_dim: usize) -> SampleTable {
    let mut table = SampleTable::new();
    for i in 0..per_dim {
        for j in 0..per_dim {
            let x0 = i as f64 / (per_dim - 1) as f64;
            let x1 = j as f64 / (per_dim - 1) as f64;
            table
                .add_sample(vec![x0, x1], vec![surface(x0, x1)])
                .expect("grid sample");
        }
    }
    table
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tensor_spline_{}_{name}.bin", std::process::id()))
}

#[test]
fn linear_interpolation_of_identity() {
    let mut table = SampleTable::new();
    for i in 0..=10 {
        table.add_scalar(i as f64, i as f64).expect("sample");
    }
    let spline = bspline_interpolator(&table, 1).expect("degree 1 fit");
    let y = spline.eval(&[1.0]).expect("eval");
    assert_abs_diff_eq!(y[0], 1.0, epsilon = 1e-12);
    for &x in &[0.5, 4.25, 9.99] {
        assert_abs_diff_eq!(spline.eval(&[x]).expect("eval")[0], x, epsilon = 1e-10);
    }
}

#[test]
fn pspline_reproduces_linear_data_for_any_alpha() {
    let mut table = SampleTable::new();
    for i in 0..=10 {
        let x = i as f64;
        table.add_scalar(x, 3.0 - 0.5 * x).expect("sample");
    }
    for degree in [1, 3] {
        for alpha in [0.0, 1.0, 100.0] {
            let spline = pspline_smoother(&table, degree, alpha, &[]).expect("P-spline fit");
            for &x in &[0.1, 2.5, 6.75, 10.0] {
                let y = spline.eval(&[x]).expect("eval")[0];
                assert!(
                    (y - (3.0 - 0.5 * x)).abs() < 1e-6,
                    "degree={degree} alpha={alpha} x={x} y={y:.6e}"
                );
            }
        }
    }
}

#[test]
fn pspline_reproduces_planes_in_two_dimensions() {
    let mut table = SampleTable::new();
    for &x0 in &[0.0, 0.1, 0.35, 0.5, 0.8, 1.0] {
        for &x1 in &[-1.0, -0.2, 0.0, 0.6, 1.5] {
            table
                .add_sample(vec![x0, x1], vec![1.0 + 2.0 * x0 - x1])
                .expect("sample");
        }
    }
    let spline = BSplineBuilder::new(2, 1)
        .degrees(vec![3, 2])
        .fit(&table, Smoothing::PSpline, 5.0, &[])
        .expect("P-spline fit");
    for &(x0, x1) in &[(0.2, 0.3), (0.9, -0.7), (0.45, 1.2)] {
        let y = spline.eval(&[x0, x1]).expect("eval")[0];
        assert_abs_diff_eq!(y, 1.0 + 2.0 * x0 - x1, epsilon = 1e-6);
    }
}

#[test]
fn ridge_shrinks_coefficient_norm_monotonically() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut table = SampleTable::new();
    for i in 0..17 {
        let x = i as f64 / 16.0;
        let noise: f64 = rng.random_range(-0.1..0.1);
        table.add_scalar(x, (6.0 * x).sin() + noise).expect("sample");
    }

    let mut previous = f64::INFINITY;
    for alpha in [0.0, 1e-3, 1e-2, 0.1, 1.0, 10.0] {
        let spline = bspline_smoother(&table, 3, alpha, &[]).expect("ridge fit");
        let norm = spline.coefficients().iter().map(|c| c * c).sum::<f64>().sqrt();
        assert!(
            norm <= previous + 1e-12,
            "alpha={alpha} norm={norm:.6e} previous={previous:.6e}"
        );
        previous = norm;
    }
}

#[test]
fn weights_pull_the_fit_towards_heavy_samples() {
    let mut table = SampleTable::new();
    for i in 0..9 {
        let x = i as f64;
        let y = if i == 4 { 1.0 } else { 0.0 };
        table.add_scalar(x, y).expect("sample");
    }
    let light: Vec<f64> = vec![1.0; 9];
    let mut heavy = light.clone();
    heavy[4] = 50.0;
    let builder = BSplineBuilder::new(1, 1).num_basis_functions(5);
    let a = builder
        .fit(&table, Smoothing::Ridge, 0.1, &light)
        .expect("unit weights");
    let b = builder
        .fit(&table, Smoothing::Ridge, 0.1, &heavy)
        .expect("heavy weight");
    let ya = a.eval(&[4.0]).expect("eval")[0];
    let yb = b.eval(&[4.0]).expect("eval")[0];
    assert!(yb > ya, "heavy={yb:.6e} light={ya:.6e}");
}

#[test]
fn experimental_knots_allow_a_coarse_basis() {
    let mut table = SampleTable::new();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let x: f64 = rng.random_range(0.0..1.0);
        table.add_scalar(x, x * x).expect("sample");
    }
    let spline = BSplineBuilder::new(1, 1)
        .num_basis_functions(8)
        .knot_spacing(KnotSpacing::Experimental)
        .fit(&table, Smoothing::None, 0.0, &[])
        .expect("coarse fit");
    assert_eq!(spline.num_basis_functions(), 8);
    for &x in &[0.2, 0.5, 0.8] {
        let y = spline.eval(&[x]).expect("eval")[0];
        assert_abs_diff_eq!(y, x * x, epsilon = 1e-8);
    }
}

#[test]
fn multiple_outputs_are_fitted_independently() {
    let mut table = SampleTable::new();
    for i in 0..12 {
        let x = i as f64 * 0.25;
        table
            .add_sample(vec![x], vec![x, 1.0 - 2.0 * x])
            .expect("sample");
    }
    let spline = bspline_interpolator(&table, 2).expect("fit");
    assert_eq!(spline.dim_y(), 2);
    let y = spline.eval(&[1.1]).expect("eval");
    assert_abs_diff_eq!(y[0], 1.1, epsilon = 1e-9);
    assert_abs_diff_eq!(y[1], 1.0 - 2.2, epsilon = 1e-9);
    let jac = spline.eval_jacobian(&[1.1]).expect("jacobian");
    assert_eq!(jac.dim(), (2, 1));
    assert_abs_diff_eq!(jac[[0, 0]], 1.0, epsilon = 1e-8);
    assert_abs_diff_eq!(jac[[1, 0]], -2.0, epsilon = 1e-8);
}

#[test]
fn fit_failure_modes() {
    let table = grid_table(5);

    let mismatch = BSplineBuilder::new(3, 1).fit(&table, Smoothing::None, 0.0, &[]);
    assert!(matches!(mismatch, Err(FitError::DimensionMismatch(_))));

    let negative = BSplineBuilder::new(2, 1).fit(&table, Smoothing::Ridge, -1.0, &[]);
    assert!(matches!(negative, Err(FitError::InvalidArgument(_))));

    let short_weights = BSplineBuilder::new(2, 1).fit(&table, Smoothing::None, 0.0, &[1.0; 3]);
    assert!(matches!(short_weights, Err(FitError::InvalidArgument(_))));
}

#[test]
fn truncated_and_missing_files_fail_cleanly() {
    let spline = bspline_interpolator(&grid_table(5), 2).expect("fit");
    let bytes = spline.to_bytes();

    let path = temp_path("truncated");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).expect("write truncated file");
    let truncated = BSpline::load(&path);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(truncated, Err(CodecError::CorruptStream { .. })));

    for cut in [0, 7, 8, 30] {
        assert!(
            matches!(
                BSpline::from_bytes(&bytes[..cut]),
                Err(CodecError::CorruptStream { .. })
            ),
            "prefix of {cut} bytes decoded"
        );
    }

    let missing = temp_path("does_not_exist");
    match BSpline::load(&missing) {
        Err(CodecError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn end_to_end_fit_save_reload() {
    let table = grid_table(17);
    assert!(table.is_grid_complete());
    assert_eq!(table.num_samples(), 289);

    let mut rng = StdRng::seed_from_u64(2024);
    let held_out: Vec<[f64; 2]> = (0..1000)
        .map(|_| [rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)])
        .collect();

    // Ridge shrinks every coefficient towards zero. The corner basis functions
    // are each supported by only a few samples, so the shrinkage is far
    // stronger there than in the interior. Ridge therefore gets a tight bound
    // away from the boundary spans and a loose bound over the whole square.
    let cases = [
        ("none", Smoothing::None, 0.0, 1e-3, 1e-3),
        ("ridge", Smoothing::Ridge, 0.1, 1.2e-1, 6.5e-1),
        ("pspline", Smoothing::PSpline, 0.03, 1e-1, 1e-1),
    ];
    let mut max_errors = Vec::new();
    for (name, smoothing, alpha, interior_tolerance, tolerance) in cases {
        let spline = BSplineBuilder::new(2, 1)
            .degree(3)
            .fit(&table, smoothing, alpha, &[])
            .expect("end-to-end fit");

        let path = temp_path(name);
        spline.save(&path).expect("save model");
        let loaded = BSpline::load(&path).expect("load model");
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, spline, "{name}: reloaded model differs");

        let mut max_reload = 0.0f64;
        let mut max_truth = 0.0f64;
        let mut max_interior = 0.0f64;
        for x in &held_out {
            let a = spline.eval(x).expect("eval")[0];
            let b = loaded.eval(x).expect("eval")[0];
            let err = (a - surface(x[0], x[1])).abs();
            max_reload = max_reload.max((a - b).abs());
            max_truth = max_truth.max(err);
            if x.iter().all(|&c| (0.125..=0.875).contains(&c)) {
                max_interior = max_interior.max(err);
            }
        }
        assert_eq!(max_reload, 0.0, "{name}: reloaded evaluation differs");
        assert!(
            max_interior < interior_tolerance,
            "{name}: interior max abs error {max_interior:.6e} exceeds {interior_tolerance:.1e}"
        );
        assert!(
            max_truth < tolerance,
            "{name}: max abs error {max_truth:.6e} exceeds {tolerance:.1e}"
        );
        max_errors.push(max_truth);
    }
    assert!(
        max_errors[1] > 10.0 * max_errors[0],
        "ridge error {:.6e} should clearly exceed the unregularized error {:.6e}",
        max_errors[1],
        max_errors[0]
    );
}

#[test]
fn builder_config_round_trips_through_json() {
    let builder = BSplineBuilder::new(2, 3)
        .degrees(vec![1, 4])
        .num_basis_functions_per_dim(vec![6, 9])
        .knot_spacing(KnotSpacing::Experimental);
    let json = serde_json::to_string(&builder).expect("serialize config");
    let decoded: BSplineBuilder = serde_json::from_str(&json).expect("deserialize config");
    assert_eq!(decoded, builder);
}
