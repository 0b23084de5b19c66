//! Tests for catalog module

use super::*;

fn catalog() -> ModelCatalog {
    ModelCatalog::new(vec![
        ModelDescriptor::new("flash-lite", 8192, 3, CapabilityTier::Basic),
        ModelDescriptor::new("pro", 1_000_000, 2, CapabilityTier::Excellent),
        ModelDescriptor::new("flash", 32_768, 1, CapabilityTier::Good),
    ])
    .unwrap()
}

fn names(models: &[ModelDescriptor]) -> Vec<&str> {
    models.iter().map(|m| m.name.as_str()).collect()
}

#[test]
fn test_candidates_sorted_by_priority() {
    let c = catalog();
    assert_eq!(names(&c.candidates(100, None)), vec!["flash", "pro", "flash-lite"]);
}

#[test]
fn test_token_headroom_filter() {
    let c = ModelCatalog::new(vec![ModelDescriptor::new(
        "small",
        8192,
        1,
        CapabilityTier::Good,
    )])
    .unwrap();

    // 8192 * 0.7 = 5734.4
    assert!(c.candidates(9000, None).is_empty());
    assert_eq!(names(&c.candidates(5000, None)), vec!["small"]);
    assert_eq!(names(&c.candidates(5734, None)), vec!["small"]);
    assert!(c.candidates(5735, None).is_empty());
}

#[test]
fn test_capability_filter() {
    let c = catalog();
    let basic_present = |req| c.candidates(10, req).iter().any(|m| m.name == "flash-lite");

    assert!(basic_present(None));
    assert!(basic_present(Some(RequiredCapability::Low)));
    assert!(!basic_present(Some(RequiredCapability::Medium)));
    assert!(!basic_present(Some(RequiredCapability::High)));
}

#[tokio::test(start_paused = true)]
async fn test_cooling_model_excluded_until_expiry() {
    let c = catalog();
    assert!(c.set_cooldown("flash", std::time::Duration::from_secs(120)));
    assert_eq!(names(&c.candidates(100, None)), vec!["pro", "flash-lite"]);

    tokio::time::advance(std::time::Duration::from_secs(120)).await;
    assert_eq!(c.candidates(100, None)[0].name, "flash");
}

#[test]
fn test_empty_result_is_not_an_error() {
    let c = catalog();
    assert!(c.candidates(5_000_000, None).is_empty());
}

#[test]
fn test_available_ignores_size() {
    let c = catalog();
    assert_eq!(
        names(&c.available(Some(RequiredCapability::High))),
        vec!["flash", "pro"]
    );
}

#[test]
fn test_unknown_model_cooldown() {
    let c = catalog();
    assert!(!c.set_cooldown("nope", std::time::Duration::from_secs(1)));
}

#[test]
fn test_clear_cooldowns() {
    let c = catalog();
    c.set_cooldown("flash", std::time::Duration::from_secs(60));
    c.set_cooldown("pro", std::time::Duration::from_secs(60));
    c.clear_cooldowns();
    assert_eq!(c.candidates(100, None).len(), 3);
    assert!(c.snapshot().iter().all(|m| m.cooldown_remaining_ms.is_none()));
}

#[test]
fn test_invalid_catalogs_rejected() {
    assert!(ModelCatalog::new(vec![]).is_err());
    assert!(ModelCatalog::new(vec![ModelDescriptor::new("x", 0, 1, CapabilityTier::Good)]).is_err());
    assert!(ModelCatalog::new(vec![
        ModelDescriptor::new("x", 10, 1, CapabilityTier::Good),
        ModelDescriptor::new("x", 20, 2, CapabilityTier::Good),
    ])
    .is_err());
    assert!(ModelCatalog::new(vec![
        ModelDescriptor::new("x", 10, 1, CapabilityTier::Good).with_cost_per_token(-1.0)
    ])
    .is_err());
}

#[test]
fn test_input_token_budget() {
    let m = ModelDescriptor::new("x", 8192, 1, CapabilityTier::Good);
    assert_eq!(m.input_token_budget(), 5734);
}

#[test]
fn test_descriptor_from_toml_like_json() {
    let m: ModelDescriptor = serde_json::from_value(serde_json::json!({
        "name": "gemini-2.5-flash",
        "max_context_tokens": 1048576,
        "priority": 1,
        "cost_per_token": 0.0000003,
        "capability_tier": "good"
    }))
    .unwrap();
    assert_eq!(m.capability_tier, CapabilityTier::Good);
    assert!(m.cooldown_until.is_none());
}

#[test]
fn test_required_capability_from_str() {
    assert_eq!("HIGH".parse::<RequiredCapability>(), Ok(RequiredCapability::High));
    assert!("extreme".parse::<RequiredCapability>().is_err());
}
