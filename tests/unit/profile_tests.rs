//! Unit tests for cultural-context derivation.

use care_relay::models::profile::{ChildProfile, Gender};

fn profile(location: &str) -> ChildProfile {
    ChildProfile {
        name: "Amal".into(),
        age: 9,
        gender: Gender::Female,
        location: location.into(),
    }
}

#[test]
fn gaza_selects_conflict_exposure_context() {
    let context = profile("Gaza").cultural_context();
    assert!(context.contains("conflict exposure"), "got: {context}");
}

#[test]
fn location_matching_is_case_insensitive() {
    let context = profile("GAZA CITY").cultural_context();
    assert!(context.contains("conflict exposure"));
}

#[test]
fn ukrainian_cities_select_war_trauma_context() {
    for location in ["Kyiv", "Kharkiv", "Mariupol", "western Ukraine"] {
        let context = profile(location).cultural_context();
        assert!(context.contains("war-related trauma"), "for {location}");
    }
}

#[test]
fn levant_locations_select_refugee_context() {
    for location in ["Aleppo, Syria", "Beirut, Lebanon", "Amman, Jordan"] {
        let context = profile(location).cultural_context();
        assert!(context.contains("refugee experience"), "for {location}");
    }
}

#[test]
fn unknown_locations_fall_back_to_generic_context() {
    let context = profile("London").cultural_context();
    assert!(context.contains("London"), "got: {context}");
    assert!(context.contains("local cultural context"));
}
