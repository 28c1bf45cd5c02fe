//! Integration test: the session engine end to end

use polars::prelude::*;
use tabtrain::engine::TrainEngine;
use tabtrain::models::ModelParams;
use tabtrain::training::{ClassicalTrainOptions, NeuralConfig};

fn churn_df(n: usize) -> DataFrame {
    let tenure: Vec<f64> = (0..n).map(|i| (i % 40) as f64 + 1.0).collect();
    let plan: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "basic" } else { "premium" }).collect();
    let churned: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "yes" } else { "no" }).collect();
    df!("tenure" => tenure, "plan" => plan, "churned" => churned).unwrap()
}

fn price_df(n: usize) -> DataFrame {
    let sqft: Vec<f64> = (0..n).map(|i| 800.0 + i as f64 * 25.0).collect();
    let rooms: Vec<f64> = (0..n).map(|i| 2.0 + (i % 4) as f64).collect();
    let price: Vec<f64> = sqft.iter().zip(&rooms).map(|(s, r)| s * 150.0 + r * 10_000.0).collect();
    df!("sqft" => sqft, "rooms" => rooms, "price" => price).unwrap()
}

#[test]
fn test_sessions_are_independent() {
    let mut engine = TrainEngine::new();
    let df = churn_df(50);

    let first = engine
        .train_classical(&df, "churned", "rf", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();
    let second = engine
        .train_classical(&df, "churned", "knn", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(engine.session_count(), 2);
    assert!(engine.has_session(first.session_id));

    assert!(engine.drop_session(first.session_id));
    assert!(!engine.has_session(first.session_id));
    assert!(engine.has_session(second.session_id));
    assert!(!engine.drop_session(first.session_id), "dropping twice should report absence");
}

#[test]
fn test_predict_decodes_text_labels() {
    let mut engine = TrainEngine::new();
    let df = churn_df(50);
    let outcome = engine
        .train_classical(&df, "churned", "rf", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    // The target column may ride along; the engine ignores it.
    let prediction = engine.predict(outcome.session_id, &df).unwrap();
    assert_eq!(prediction.values.len(), 50);
    let labels = prediction.labels.expect("text targets should decode to labels");
    assert!(labels.iter().all(|l| l == "yes" || l == "no"));
}

#[test]
fn test_predict_is_deterministic_after_training() {
    let mut engine = TrainEngine::new();
    let df = price_df(60);
    let outcome = engine
        .train_classical(&df, "price", "rf", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    let new_rows = df!("sqft" => [1000.0, 2000.0], "rooms" => [3.0, 5.0]).unwrap();
    let a = engine.predict(outcome.session_id, &new_rows).unwrap();
    let b = engine.predict(outcome.session_id, &new_rows).unwrap();
    assert_eq!(a.values, b.values, "repeated prediction should not drift");
    assert!(a.labels.is_none(), "numeric targets have no labels to decode");
}

#[test]
fn test_sample_predictions_clamp_and_number_from_one() {
    let mut engine = TrainEngine::new();
    let df = churn_df(50);
    let outcome = engine
        .train_classical(&df, "churned", "rf", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    // 50 rows leave 10 held out; asking for far more clamps to that.
    let samples = engine.sample_predictions(outcome.session_id, 500);
    assert_eq!(samples.len(), 10);
    assert_eq!(samples[0].sample_id, 1);
    assert_eq!(samples[9].sample_id, 10);

    for s in &samples {
        assert!(s.correct.is_some(), "classification samples should carry correctness");
        assert!(s.predicted_label.is_some());
        let confidence = s.confidence.expect("forest supports probabilities");
        assert!((0.0..=1.0).contains(&confidence));
        assert!(s.error.is_none(), "classification samples carry no regression error");
    }
}

#[test]
fn test_regression_samples_report_error_fields() {
    let mut engine = TrainEngine::new();
    let df = price_df(60);
    let outcome = engine
        .train_classical(&df, "price", "linear", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    let samples = engine.sample_predictions(outcome.session_id, 5);
    assert_eq!(samples.len(), 5);
    for s in &samples {
        assert!(s.error.is_some());
        assert!(s.error_percentage.is_some());
        assert!(s.correct.is_none());
        assert!(s.probabilities.is_none());
    }
}

#[test]
fn test_save_load_round_trip_preserves_predictions() {
    let mut engine = TrainEngine::new();
    let df = churn_df(50);
    let outcome = engine
        .train_classical(&df, "churned", "gb", ModelParams::default(), ClassicalTrainOptions::default())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = engine.save_model(outcome.session_id, dir.path(), "churn").unwrap();
    assert_eq!(paths.len(), 3, "model, scaler, and metadata artifacts");
    for p in &paths {
        assert!(p.exists(), "artifact {} should exist", p.display());
    }

    let restored_id = engine.load_model(dir.path(), "churn").unwrap();
    assert_ne!(restored_id, outcome.session_id);

    let before = engine.predict(outcome.session_id, &df).unwrap();
    let after = engine.predict(restored_id, &df).unwrap();
    assert_eq!(before.values, after.values, "restored model should predict identically");
    assert_eq!(before.labels, after.labels);

    // Restored sessions carry no held-out rows to sample.
    assert!(engine.sample_predictions(restored_id, 5).is_empty());
}

#[test]
fn test_neural_artifacts_refuse_to_load() {
    let mut engine = TrainEngine::new();
    let df = churn_df(60);
    let config = NeuralConfig {
        hidden_layers: vec![8],
        epochs: 3,
        ..Default::default()
    };
    let outcome = engine.train_neural(&df, "churned", config).unwrap();
    assert!(outcome.training_history.is_some());
    assert!(outcome.parameter_count.is_some());

    let dir = tempfile::tempdir().unwrap();
    engine.save_model(outcome.session_id, dir.path(), "net").unwrap();

    let err = engine.load_model(dir.path(), "net").unwrap_err();
    assert!(
        err.to_string().contains("retrain"),
        "neural load should point at retraining: {}",
        err
    );
}

#[test]
fn test_infer_task_without_training() {
    let engine = TrainEngine::new();
    let churn = churn_df(30);
    let price = price_df(30);

    assert!(engine.infer_task(&churn, "churned").unwrap().is_classification());
    assert!(!engine.infer_task(&price, "price").unwrap().is_classification());
    assert!(engine.infer_task(&churn, "nope").is_err());
}
