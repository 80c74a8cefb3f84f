use adrate_engine::config::TrainingConfig;
use adrate_engine::features::FeatureVector;
use adrate_engine::model::state::{MANIFEST_FILE, WEIGHTS_FILE};
use adrate_engine::model::{ModelError, RatingModel};
use adrate_engine::persistence::PersistenceError;
use adrate_engine::rating::Rating;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn quick_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 10,
        ..TrainingConfig::default()
    }
}

fn corpus() -> Vec<(FeatureVector, Rating)> {
    (0..20)
        .map(|i| {
            let engaged = i % 2 == 0;
            let features = FeatureVector::from_array([
                if engaged { 600.0 + i as f64 } else { 20.0 },
                if engaged { 30.0 } else { 2.0 + i as f64 * 0.1 },
                if engaged { 3.0 } else { 0.0 },
                250.0,
                1.0,
                0.0,
                if engaged { 120.0 } else { 10.0 },
            ]);
            let rating = Rating::new(if engaged { 0.9 } else { 0.1 }).unwrap();
            (features, rating)
        })
        .collect()
}

fn sample_vector() -> FeatureVector {
    FeatureVector::from_array([500.0, 25.0, 2.0, 250.0, 1.0, 0.0, 100.0])
}

#[test]
fn test_predict_before_fit_is_not_fitted() {
    let model = RatingModel::new(quick_config());
    assert!(!model.is_fitted());
    assert!(matches!(model.predict(&sample_vector()), Err(ModelError::NotFitted)));
}

#[test]
fn test_fit_on_empty_corpus() {
    let model = RatingModel::new(quick_config());
    assert!(matches!(model.fit(&[]), Err(ModelError::InsufficientData)));
    assert!(!model.is_fitted());
}

#[test]
fn test_empty_fit_keeps_published_state() {
    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    let published = model.state().unwrap();
    let before = model.predict(&sample_vector()).unwrap();

    assert!(matches!(model.fit(&[]), Err(ModelError::InsufficientData)));

    assert!(Arc::ptr_eq(&published, &model.state().unwrap()));
    let after = model.predict(&sample_vector()).unwrap();
    assert_eq!(before.to_bits(), after.to_bits());
}

#[test]
fn test_fit_then_predict_in_unit_interval() {
    let model = RatingModel::new(quick_config());
    let summary = model.fit(&corpus()).unwrap();

    assert_eq!(summary.epochs.len(), 10);
    assert_eq!(summary.train_examples, 16);
    assert_eq!(summary.validation_examples, 4);
    let last = summary.final_metrics().unwrap();
    assert!(last.val_loss.is_some());
    assert!((0.0..=1.0).contains(&last.accuracy));

    let p = model.predict(&sample_vector()).unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert_eq!(model.state().unwrap().trained_examples(), 20);
}

#[test]
fn test_single_example_trains_without_validation() {
    let model = RatingModel::new(quick_config());
    let one = vec![corpus().remove(0)];
    let summary = model.fit(&one).unwrap();

    assert_eq!(summary.train_examples, 1);
    assert_eq!(summary.validation_examples, 0);
    assert!(summary.epochs.iter().all(|m| m.val_loss.is_none()));
}

#[test]
fn test_inference_is_deterministic() {
    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();

    let a = model.predict(&sample_vector()).unwrap();
    let b = model.predict(&sample_vector()).unwrap();
    assert_eq!(a.to_bits(), b.to_bits());

    let batch = model.predict_batch(&[sample_vector(), sample_vector()]).unwrap();
    assert_eq!(batch.len(), 2);
    assert!((batch[0] - a).abs() < 1e-6);
}

#[test]
fn test_repeated_fits_reduce_loss() {
    let model = RatingModel::new(TrainingConfig {
        epochs: 30,
        validation_split: 0.0,
        dropout: 0.0,
        ..TrainingConfig::default()
    });
    let data = corpus();

    let first = model.fit(&data).unwrap();
    let second = model.fit(&data).unwrap();
    let third = model.fit(&data).unwrap();

    let initial = first.initial_loss().unwrap();
    let last = third.final_loss().unwrap();
    assert!(last < initial, "loss went from {initial} to {last}");
    assert!(second.initial_loss().unwrap() <= initial);
}

#[test]
fn test_non_finite_feature_is_rejected() {
    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();

    let mut bad = sample_vector();
    bad.time_spent = f64::NAN;
    match model.predict(&bad) {
        Err(ModelError::NonFiniteFeature { name, .. }) => assert_eq!(name, "time_spent"),
        other => panic!("expected NonFiniteFeature, got {other:?}"),
    }
}

#[test]
fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    let before = model.predict(&sample_vector()).unwrap();
    model.save(&location).unwrap();

    assert!(location.join(WEIGHTS_FILE).exists());
    assert!(location.join(MANIFEST_FILE).exists());

    let restored = RatingModel::new(quick_config());
    restored.load(&location).unwrap();
    let after = restored.predict(&sample_vector()).unwrap();
    assert!((before - after).abs() < 1e-6);
}

#[test]
fn test_load_falls_back_to_previous_state() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    let before = model.predict(&sample_vector()).unwrap();
    model.save(&location).unwrap();

    // An interrupted save leaves only the moved-aside state behind.
    fs::rename(&location, dir.path().join("model.previous")).unwrap();

    let restored = RatingModel::new(quick_config());
    restored.load(&location).unwrap();
    let after = restored.predict(&sample_vector()).unwrap();
    assert!((before - after).abs() < 1e-6);
}

#[test]
fn test_save_replaces_previous_state() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    model.save(&location).unwrap();
    model.fit(&corpus()[..6]).unwrap();
    model.save(&location).unwrap();

    let restored = RatingModel::new(quick_config());
    restored.load(&location).unwrap();
    assert_eq!(restored.state().unwrap().trained_examples(), 6);
    assert!(!dir.path().join("model.staging").exists());
    assert!(!dir.path().join("model.previous").exists());
}

#[test]
fn test_save_unfitted_model_fails() {
    let dir = tempdir().unwrap();
    let model = RatingModel::new(quick_config());
    assert!(matches!(
        model.save(&dir.path().join("model")),
        Err(ModelError::NotFitted)
    ));
}

#[test]
fn test_load_missing_keeps_state() {
    let dir = tempdir().unwrap();
    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    let before = model.predict(&sample_vector()).unwrap();

    let err = model.load(&dir.path().join("absent")).unwrap_err();
    match err {
        ModelError::Persistence(e) => assert!(e.is_not_found()),
        other => panic!("expected persistence error, got {other:?}"),
    }
    assert_eq!(model.predict(&sample_vector()).unwrap().to_bits(), before.to_bits());
}

#[test]
fn test_load_without_weights_fails() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    model.save(&location).unwrap();
    fs::remove_file(location.join(WEIGHTS_FILE)).unwrap();

    let fresh = RatingModel::new(quick_config());
    let err = fresh.load(&location).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Persistence(PersistenceError::Tensors { .. })
    ));
    assert!(!fresh.is_fitted());
}

#[test]
fn test_load_rejects_width_mismatch() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    model.save(&location).unwrap();

    let manifest_path = location.join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest["width"] = serde_json::json!(6);
    fs::write(&manifest_path, manifest.to_string()).unwrap();

    let fresh = RatingModel::new(quick_config());
    assert!(matches!(
        fresh.load(&location),
        Err(ModelError::InconsistentState(_))
    ));
    assert!(!fresh.is_fitted());
}

#[test]
fn test_load_rejects_unknown_version() {
    let dir = tempdir().unwrap();
    let location = dir.path().join("model");

    let model = RatingModel::new(quick_config());
    model.fit(&corpus()).unwrap();
    model.save(&location).unwrap();

    let manifest_path = location.join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest["format_version"] = serde_json::json!(99);
    fs::write(&manifest_path, manifest.to_string()).unwrap();

    assert!(matches!(
        RatingModel::new(quick_config()).load(&location),
        Err(ModelError::Persistence(PersistenceError::UnsupportedVersion { found: 99, .. }))
    ));
}

#[test]
fn test_invalid_config_is_rejected_before_fitting() {
    let model = RatingModel::new(TrainingConfig {
        batch_size: 0,
        ..TrainingConfig::default()
    });
    assert!(matches!(model.fit(&corpus()), Err(ModelError::Config(_))));
    assert!(!model.is_fitted());
}
