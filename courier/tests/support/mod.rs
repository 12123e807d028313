//! Helpers shared by the end-to-end tests
#![allow(dead_code)] // Not every test file uses every helper

#[path = "../../../courier-provider/tests/support/mock_provider.rs"]
pub mod mock_provider;

use courier::CourierConfig;
use courier_dispatch::SourceRecord;
use courier_provider::ProviderConfig;
use serde_json::json;

/// Zero-delay configuration with a 14 day cooldown and no provider
pub fn config() -> CourierConfig {
    ron::from_str(
        r#"(
            dispatch: (
                template_id: "spring-open-house",
                delay: (min_secs: 0, max_secs: 0),
                throttle: (cooldown_days: 14, from_address: Some("events@example.com")),
            ),
            mappings: [
                (variable: "name", source: Field("first_name"), fallback: Some("there")),
                (variable: "event", source: Context("event")),
            ],
            context: { "event": "Spring Open House" },
        )"#,
    )
    .unwrap()
}

/// [`config`] sending through the provider at `base_url`
pub fn config_with_provider(base_url: String) -> CourierConfig {
    CourierConfig {
        provider: Some(ProviderConfig {
            base_url,
            timeout_secs: 30,
            ..ProviderConfig::new("server-token")
        }),
        ..config()
    }
}

/// `lead-1` and `lead-2` are sendable, `app-3` is inside the cooldown and
/// `lead-4` has no address
pub fn records() -> Vec<SourceRecord> {
    serde_json::from_value(json!([
        { "id": "lead-1", "email": "one@example.com", "fields": { "first_name": "One" } },
        { "id": "lead-2", "email": "two@example.com", "last_contact": "2000-01-01T00:00:00Z" },
        { "id": "app-3", "kind": "application", "email": "three@example.com",
          "last_contact": "2999-01-01T00:00:00Z" },
        { "id": "lead-4" }
    ]))
    .unwrap()
}
