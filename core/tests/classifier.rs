//! Incremental classifier tests: fallback, learning, persistence, concurrency.

use complaint_ledger_core::{
    classifier::{ClassifierState, IncrementalClassifier},
    config::{AppConfig, ClassifierConfig},
    error::LedgerError,
};
use std::path::PathBuf;
use std::sync::Arc;

fn labels() -> Vec<String> {
    AppConfig::default_test().department_names()
}

fn config_at(model_path: PathBuf) -> ClassifierConfig {
    ClassifierConfig {
        model_path,
        ..AppConfig::default_test().classifier
    }
}

fn temp_model() -> PathBuf {
    std::env::temp_dir()
        .join(format!("classifier-{}", uuid::Uuid::new_v4()))
        .join("model.json")
}

fn in_memory() -> IncrementalClassifier {
    let config = AppConfig::default_test().classifier;
    IncrementalClassifier::from_state(
        ClassifierState::untrained(labels(), config.dimensions),
        None,
        &config,
    )
    .unwrap()
}

// ── Fallback label ──────────────────────────────────────────────────────────

#[test]
fn empty_input_predicts_general() {
    let classifier = in_memory();
    classifier.update("Water pipe burst", "Water Supply").unwrap();
    assert_eq!(classifier.predict(""), "General");
    assert_eq!(classifier.predict(" ... "), "General");
}

#[test]
fn disabled_classifier_predicts_general_and_refuses_updates() {
    let classifier = IncrementalClassifier::disabled();
    assert!(!classifier.is_available());
    assert_eq!(classifier.predict("Water supply has been disrupted"), "General");
    assert!(matches!(
        classifier.update("Water supply has been disrupted", "Water Supply"),
        Err(LedgerError::ClassifierUnavailable)
    ));
}

#[test]
fn untrained_classifier_predicts_general() {
    assert_eq!(in_memory().predict("Road full of potholes"), "General");
}

// ── Learning ────────────────────────────────────────────────────────────────

#[test]
fn single_update_is_reflected_immediately() {
    let classifier = in_memory();
    classifier
        .update("Water supply has been disrupted for 3 days", "Water Supply")
        .unwrap();
    assert_eq!(classifier.updates_applied(), 1);
    assert_eq!(
        classifier.predict("Water supply has been disrupted for 3 days"),
        "Water Supply"
    );
}

#[test]
fn separates_departments_after_a_few_examples() {
    let classifier = in_memory();
    let examples = [
        ("No water supply in our street since Monday", "Water Supply"),
        ("Dirty water coming from the tap", "Water Supply"),
        ("Power outage in the whole block", "Electricity"),
        ("Electricity cut every evening, power keeps failing", "Electricity"),
        ("Huge pothole on the main road", "Roads"),
        ("Road surface broken near the bridge", "Roads"),
    ];
    for _ in 0..10 {
        for (text, label) in examples {
            classifier.update(text, label).unwrap();
        }
    }

    assert_eq!(classifier.predict("water supply stopped again"), "Water Supply");
    assert_eq!(classifier.predict("power outage tonight"), "Electricity");
    assert_eq!(classifier.predict("pothole on the road"), "Roads");
}

#[test]
fn label_set_is_fixed() {
    let classifier = in_memory();
    let err = classifier.update("Park swings broken", "Parks").unwrap_err();
    assert!(matches!(err, LedgerError::UnknownLabel(ref l) if l == "Parks"));
    assert_eq!(classifier.updates_applied(), 0);
    assert!(!classifier.labels().contains(&"Parks".to_string()));
}

// ── Persistence ─────────────────────────────────────────────────────────────

#[test]
fn update_survives_reload() {
    let path = temp_model();
    let config = config_at(path.clone());

    let classifier = IncrementalClassifier::load(&config, &labels());
    classifier
        .update("Garbage piling up on the corner", "Sanitation")
        .unwrap();
    assert!(path.exists());

    let reloaded = IncrementalClassifier::load(&config, &labels());
    assert_eq!(reloaded.updates_applied(), 1);
    assert_eq!(
        reloaded.predict("Garbage piling up on the corner"),
        "Sanitation"
    );

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn each_update_replaces_the_model_file_whole() {
    let path = temp_model();
    let config = config_at(path.clone());
    let classifier = IncrementalClassifier::load(&config, &labels());

    for _ in 0..3 {
        classifier.update("Open drain overflowing", "Sanitation").unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let on_disk: ClassifierState =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.updates_applied, classifier.updates_applied());
    }

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn persistence_failure_keeps_in_memory_update() {
    // The model's parent "directory" is a regular file, so the write fails.
    let blocker = std::env::temp_dir().join(format!("blocker-{}", uuid::Uuid::new_v4()));
    std::fs::write(&blocker, b"not a directory").unwrap();
    let config = config_at(blocker.join("model.json"));

    let classifier = IncrementalClassifier::load(&config, &labels());
    let err = classifier
        .update("Streetlights dark all week", "Electricity")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Persistence(_)), "got {err:?}");
    assert_eq!(classifier.updates_applied(), 1);
    assert_eq!(classifier.predict("Streetlights dark all week"), "Electricity");

    let _ = std::fs::remove_file(&blocker);
}

#[test]
fn corrupt_model_disables_classifier() {
    let path = temp_model();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"{ not json").unwrap();

    let classifier = IncrementalClassifier::load(&config_at(path.clone()), &labels());
    assert!(!classifier.is_available());
    assert_eq!(classifier.predict("Water leak"), "General");

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

// ── Concurrency ─────────────────────────────────────────────────────────────

#[test]
fn predictions_run_alongside_updates() {
    let classifier = Arc::new(in_memory());
    let valid: Vec<String> = labels();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let classifier = Arc::clone(&classifier);
            let valid = valid.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    let label = classifier.predict("water pipe and power line both broken");
                    assert!(valid.contains(&label), "unexpected label {label}");
                }
            });
        }
        let writer = Arc::clone(&classifier);
        scope.spawn(move || {
            for i in 0..50 {
                let label = if i % 2 == 0 { "Water Supply" } else { "Electricity" };
                writer.update("water pipe and power line both broken", label).unwrap();
            }
        });
    });

    assert_eq!(classifier.updates_applied(), 50);
}
