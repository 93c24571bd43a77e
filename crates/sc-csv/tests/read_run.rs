use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use sc_core::{Error, Method};
use sc_csv::{
    DrawMatrix, Draws, Filter, InvMetric, MatchPolicy, ReadOptions, RunResult, SampleResult, read,
    read_metadata,
};

fn repo_root() -> PathBuf {
    // crates/sc-csv -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn fixtures(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| fixture_path(n)).collect()
}

fn read_sample(names: &[&str], opts: &ReadOptions) -> SampleResult {
    match read(&fixtures(names), opts).unwrap() {
        RunResult::Sample(s) => s,
        other => panic!("expected a sampling result, got {:?}", other.method()),
    }
}

fn column(d: &Draws, name: &str, chain: usize) -> Vec<f64> {
    d.variable(name).unwrap_or_else(|| panic!("missing variable {name}"))[chain].clone()
}

fn assert_values(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
    }
}

#[test]
fn two_chains_with_saved_warmup() {
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-2.csv"], &ReadOptions::default());

    let warmup = s.warmup_draws.as_ref().expect("warmup was saved");
    assert_eq!(warmup.n_iterations(), 2);
    assert_eq!(warmup.n_chains(), 2);
    assert_eq!(warmup.variables(), &["lp__", "alpha", "beta[1]", "beta[2]"]);

    assert_eq!(s.post_warmup_draws.n_iterations(), 2);
    assert_eq!(s.post_warmup_draws.n_chains(), 2);
    assert_eq!(s.post_warmup_draws.variables(), warmup.variables());

    assert_eq!(s.post_warmup_sampler_diagnostics.variables(), &["accept_stat__", "treedepth__"]);
    let wd = s.warmup_sampler_diagnostics.as_ref().unwrap();
    assert_eq!(wd.n_iterations(), 2);
    assert_values(&column(wd, "treedepth__", 0), &[2.0, 1.0]);

    assert_eq!(s.metadata.ids, vec![1, 2]);
    assert_eq!(s.metadata.model_name, "bernoulli_model");
    assert_eq!(s.metadata.method, Method::Sample);
    assert!(s.mismatched_settings.is_empty());
    assert_eq!(s.metadata.variable_sizes.get("beta"), Some(&[2][..]));
    assert_eq!(s.metadata.variable_sizes.get("alpha"), Some(&[][..]));
}

#[test]
fn warmup_and_post_warmup_partition_rows() {
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-2.csv"], &ReadOptions::default());
    let warmup = s.warmup_draws.unwrap();
    assert_values(&column(&warmup, "lp__", 0), &[-7.11, -7.21]);
    assert_values(&column(&s.post_warmup_draws, "lp__", 0), &[-7.31, -7.41]);
    assert_values(&column(&warmup, "alpha", 1), &[0.12, 0.22]);
    assert_values(&column(&s.post_warmup_draws, "beta[2]", 1), &[2.22, 2.32]);
}

#[test]
fn per_chain_adaptation_and_timing() {
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-2.csv"], &ReadOptions::default());

    assert_eq!(s.step_size.len(), 2);
    assert_abs_diff_eq!(s.step_size[&1], 0.931, epsilon = 1e-12);
    assert_abs_diff_eq!(s.step_size[&2], 0.932, epsilon = 1e-12);

    match &s.inv_metric[&2] {
        InvMetric::Diagonal(v) => assert_values(v, &[0.52, 0.25, 1.5]),
        other => panic!("expected a diagonal metric, got {other:?}"),
    }

    assert_eq!(s.timing.len(), 2);
    assert_eq!(s.timing[0].id, 1);
    assert_abs_diff_eq!(s.timing[0].warmup.unwrap(), 0.001, epsilon = 1e-12);
    assert_abs_diff_eq!(s.timing[1].total.unwrap(), 0.012, epsilon = 1e-12);
}

#[test]
fn unsaved_warmup_is_absent_and_thinning_rounds_up() {
    let s = read_sample(&["thinned.csv"], &ReadOptions::default());
    assert!(s.warmup_draws.is_none());
    assert!(s.warmup_sampler_diagnostics.is_none());
    assert_eq!(s.metadata.thin, 2);
    // ceil(3 / 2)
    assert_eq!(s.post_warmup_draws.n_iterations(), 2);
    assert_eq!(s.post_warmup_draws.n_chains(), 1);
    assert_eq!(s.post_warmup_draws.variables(), &["lp__", "theta"]);
    assert_eq!(s.post_warmup_sampler_diagnostics.n_variables(), 6);
    assert_eq!(s.inv_metric[&1], InvMetric::Diagonal(vec![0.42]));
}

#[test]
fn different_models_are_incompatible() {
    let err = read(&fixtures(&["bernoulli-1.csv", "other-model.csv"]), &ReadOptions::default())
        .unwrap_err();
    match err {
        Error::IncompatibleFiles(msg) => assert!(msg.contains("same model"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn different_methods_are_incompatible() {
    let err = read(&fixtures(&["optimize-1.csv", "variational.csv"]), &ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::IncompatibleFiles(msg) if msg.contains("different methods")));
}

#[test]
fn adapt_delta_mismatch_is_reported_once() {
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-delta.csv"], &ReadOptions::default());
    assert_eq!(s.mismatched_settings, vec!["adapt_delta".to_string()]);
    assert_eq!(s.post_warmup_draws.n_chains(), 2);
    assert_eq!(s.metadata.adapt_delta, Some(0.8));

    let quiet = ReadOptions::default().with_policy(MatchPolicy::empty());
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-delta.csv"], &quiet);
    assert!(s.mismatched_settings.is_empty());
}

#[test]
fn repeated_default_ids_fall_back_to_position() {
    let s = read_sample(
        &["bernoulli-default-id-1.csv", "bernoulli-default-id-2.csv"],
        &ReadOptions::default(),
    );
    assert_eq!(s.metadata.ids, vec![1, 2]);
    assert_eq!(s.post_warmup_draws.n_chains(), 2);
    assert_eq!(s.step_size.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_abs_diff_eq!(s.step_size[&2], 0.932, epsilon = 1e-12);
    assert_eq!(s.timing.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(s.mismatched_settings.is_empty());

    let s = read_sample(&["bernoulli-1.csv", "bernoulli-1.csv"], &ReadOptions::default());
    assert_eq!(s.metadata.ids, vec![1, 2]);
    assert_eq!(s.inv_metric.len(), 2);
}

#[test]
fn empty_variable_filter_decodes_no_parameters() {
    let nothing = Filter::from_option(Some(vec![String::new()]));
    let opts = ReadOptions::default().with_variables(nothing.clone());
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-2.csv"], &opts);
    assert_eq!(s.post_warmup_draws.n_variables(), 0);
    assert_eq!(s.post_warmup_draws.n_iterations(), 2);
    assert_eq!(s.post_warmup_sampler_diagnostics.n_variables(), 2);

    let opts = opts.with_sampler_diagnostics(nothing);
    let s = read_sample(&["bernoulli-1.csv", "bernoulli-2.csv"], &opts);
    assert_eq!(s.post_warmup_draws.n_variables(), 0);
    assert_eq!(s.post_warmup_draws.n_iterations(), 2);
    assert_eq!(s.post_warmup_draws.n_chains(), 2);
    assert_eq!(s.post_warmup_sampler_diagnostics.n_iterations(), 2);
    assert_eq!(s.warmup_draws.as_ref().map(Draws::n_iterations), Some(2));

    let s = read_sample(&["bernoulli-1.csv"], &ReadOptions::default());
    assert_eq!(s.post_warmup_draws.n_variables(), 4);
}

#[test]
fn base_and_exact_name_selection() {
    let opts = ReadOptions::default()
        .with_variables(Filter::names(["beta"]))
        .with_sampler_diagnostics(Filter::Nothing);
    let s = read_sample(&["bernoulli-1.csv"], &opts);
    assert_eq!(s.post_warmup_draws.variables(), &["lp__", "beta[1]", "beta[2]"]);
    assert_eq!(s.post_warmup_sampler_diagnostics.n_variables(), 0);

    let opts = ReadOptions::default().with_variables(Filter::names(["beta[1]"]));
    let s = read_sample(&["bernoulli-1.csv"], &opts);
    assert_eq!(s.post_warmup_draws.variables(), &["lp__", "beta[1]"]);
}

#[test]
fn unknown_names_fail_selection() {
    let opts = ReadOptions::default()
        .with_variables(Filter::names(["gamma", "beta", "delta"]))
        .with_sampler_diagnostics(Filter::names(["energy__"]));
    let err = read(&fixtures(&["bernoulli-1.csv"]), &opts).unwrap_err();
    let msg = err.to_string();
    match err {
        Error::Selection { variables, diagnostics } => {
            assert_eq!(variables, vec!["gamma", "delta"]);
            assert_eq!(diagnostics, vec!["energy__"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(msg.contains("gamma, delta"), "{msg}");
}

#[test]
fn fixed_param_has_no_diagnostics() {
    let opts = ReadOptions::default().with_sampler_diagnostics(Filter::names(["accept_stat__"]));
    let s = read_sample(&["fixed-param.csv"], &opts);
    assert!(s.metadata.is_fixed_param());
    assert!(s.metadata.sampler_diagnostics.is_empty());
    assert_eq!(s.post_warmup_sampler_diagnostics.n_variables(), 0);
    assert_eq!(s.post_warmup_sampler_diagnostics.n_iterations(), 3);
    assert_values(&column(&s.post_warmup_draws, "y_sim[2]", 0), &[2.5, 2.6, 2.7]);
    assert!(s.inv_metric.is_empty());
    assert!(s.step_size.is_empty());
}

#[test]
fn dense_metric_is_square() {
    let s = read_sample(&["dense.csv"], &ReadOptions::default());
    match &s.inv_metric[&1] {
        InvMetric::Dense(m) => {
            assert_eq!(m.shape(), (3, 3));
            assert_abs_diff_eq!(m[(0, 2)], 0.2);
            assert_abs_diff_eq!(m[(2, 1)], 0.3);
            assert_abs_diff_eq!(m[(1, 1)], 2.0);
        }
        other => panic!("expected a dense metric, got {other:?}"),
    }
    assert_abs_diff_eq!(s.step_size[&1], 0.72);
}

#[test]
fn variational_drops_mean_row_and_renames_densities() {
    let run = read(&fixtures(&["variational.csv"]), &ReadOptions::default()).unwrap();
    let RunResult::Variational(v) = run else { panic!("expected a variational result") };
    let d: &DrawMatrix = &v.draws;
    assert_eq!(d.variables(), &["lp__", "lp_approx__", "mu", "sigma"]);
    assert_eq!(d.n_draws(), 3);
    assert_values(&d.variable("lp__").unwrap(), &[-6.5, -7.1, -6.8]);
    assert_values(&d.variable("lp_approx__").unwrap(), &[-1.2, -0.9, -1.5]);
    assert_values(&d.variable("mu").unwrap(), &[0.21, 0.30, 0.24]);
    assert_eq!(v.metadata.output_samples, Some(3));
}

#[test]
fn optimize_point_estimates_one_row_per_file() {
    let run = read(&fixtures(&["optimize-1.csv"]), &ReadOptions::default()).unwrap();
    let RunResult::Optimize(o) = run else { panic!("expected an optimization result") };
    assert_eq!(o.point_estimates.n_draws(), 1);
    assert_abs_diff_eq!(o.point_estimates.estimate("theta").unwrap(), 0.200001);

    let run = read(&fixtures(&["optimize-1.csv", "optimize-2.csv"]), &ReadOptions::default())
        .unwrap();
    let RunResult::Optimize(o) = run else { panic!("expected an optimization result") };
    assert_eq!(o.point_estimates.n_draws(), 2);
    assert_values(&o.point_estimates.variable("theta").unwrap(), &[0.200001, 0.200002]);
    assert_eq!(o.metadata.ids, vec![1, 2]);
}

#[test]
fn generated_quantities_one_replicate_per_file() {
    let run = read(&fixtures(&["gq-1.csv", "gq-2.csv"]), &ReadOptions::default()).unwrap();
    let RunResult::GenerateQuantities(g) = run else { panic!("expected generated quantities") };
    let q = &g.generated_quantities;
    assert_eq!(q.variables(), &["y_rep[1]", "y_rep[2]", "y_rep[3]"]);
    assert_eq!(q.n_chains(), 2);
    assert_eq!(q.n_iterations(), 3);
    assert_values(&column(q, "y_rep[3]", 1), &[1.0, 1.0, 2.0]);
    assert!(!g.metadata.extra.contains_key("fitted_params"));
}

#[test]
fn file_access_is_checked_before_parsing() {
    let missing = fixture_path("does-not-exist.csv");
    let files = vec![fixture_path("no-header.csv"), missing];
    // The corrupt first file is never parsed because the second path fails first.
    assert!(matches!(read(&files, &ReadOptions::default()), Err(Error::FileAccess { .. })));

    let err = read(&fixtures(&["notes.txt"]), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::FileAccess { .. }));

    let err = read(&[repo_root().join("tests/fixtures")], &ReadOptions::default()).unwrap_err();
    assert!(err.to_string().contains("not a regular file"), "{err}");
}

#[test]
fn header_without_columns_is_corrupt() {
    let err = read(&fixtures(&["no-header.csv"]), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::CorruptFile { .. }), "{err}");
}

#[test]
fn parallel_read_matches_sequential() {
    let files = fixtures(&["bernoulli-1.csv", "bernoulli-2.csv"]);
    let seq = read(&files, &ReadOptions::default()).unwrap();
    let par = read(&files, &ReadOptions::default().with_parallel(true)).unwrap();
    assert_eq!(serde_json::to_value(&seq).unwrap(), serde_json::to_value(&par).unwrap());

    let err = read(
        &fixtures(&["bernoulli-1.csv", "other-model.csv"]),
        &ReadOptions::default().with_parallel(true),
    )
    .unwrap_err();
    assert!(matches!(err, Error::IncompatibleFiles(_)));
}

#[test]
fn metadata_only_read() {
    let meta = read_metadata(
        &fixtures(&["bernoulli-1.csv", "bernoulli-2.csv"]),
        &ReadOptions::default(),
    )
    .unwrap();
    assert_eq!(meta.ids, vec![1, 2]);
    assert_eq!(meta.iter_warmup, Some(2));
    assert_eq!(meta.iter_sampling, Some(2));
    assert!(meta.save_warmup);
    assert_eq!(meta.max_treedepth, Some(10));
    assert_eq!(meta.seed, Some(1234));
    assert_eq!(meta.threads_per_chain, Some(1));
    assert_eq!(meta.stan_version.to_string(), "2.33.1");
    assert!(!meta.extra.contains_key("file"));
}

#[test]
fn result_serializes_with_method_tag() {
    let run = read(&fixtures(&["optimize-1.csv"]), &ReadOptions::default()).unwrap();
    let v = serde_json::to_value(&run).unwrap();
    assert_eq!(v["method"], "optimize");
    assert_eq!(v["metadata"]["model_name"], "bernoulli_model");
}
