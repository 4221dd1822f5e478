use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("test".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    OPERATION_COUNTER.with_label_values(&["create", "ok"]).inc();
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"test_keeper_operations_total"),
        "Missing test_keeper_operations_total"
    );
}

#[test]
fn test_counter_increment() {
    DELIVERED_EVENTS.with_label_values(&["test_counter_increment"]).reset();

    DELIVERED_EVENTS.with_label_values(&["test_counter_increment"]).inc();
    DELIVERED_EVENTS.with_label_values(&["test_counter_increment"]).inc();

    let value = DELIVERED_EVENTS.with_label_values(&["test_counter_increment"]).get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

#[test]
fn test_histogram_labels() {
    MULTI_BATCH_SIZE.with_label_values(&["histogram_a"]).observe(3.0);
    MULTI_BATCH_SIZE.with_label_values(&["histogram_b"]).observe(5.0);

    assert_eq!(MULTI_BATCH_SIZE.with_label_values(&["histogram_a"]).get_sample_count(), 1);
    assert_eq!(MULTI_BATCH_SIZE.with_label_values(&["histogram_b"]).get_sample_count(), 1);
}

#[test]
fn test_gather_metrics_text_format() {
    OPERATION_COUNTER.with_label_values(&["check", "gather"]).inc();

    let body = gather_metrics();

    assert!(body.contains("# TYPE keeper_operations_total counter"));
    assert!(body.contains("keeper_operations_total{op=\"check\",outcome=\"gather\"}"));
}

#[test]
fn test_init_metrics_is_idempotent() {
    init_metrics();
    init_metrics();
    assert!(!REGISTRY.gather().is_empty());
}
