//! Child profile captured during onboarding.

use serde::{Deserialize, Serialize};

/// Gender as stated during onboarding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Female.
    Female,
    /// Male.
    Male,
    /// Caregiver preferred not to say.
    Unspecified,
}

/// Demographic profile of the child under assessment.
///
/// Immutable after session creation; the location drives the derived
/// cultural context used throughout synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChildProfile {
    /// First name only, for privacy.
    pub name: String,
    /// Age in years.
    pub age: u8,
    /// Stated gender.
    pub gender: Gender,
    /// Current city or region.
    pub location: String,
}

impl ChildProfile {
    /// Derive the cultural/language context string for this profile's
    /// location.
    ///
    /// Conflict-region keywords select a context tailored to displacement
    /// and war exposure; anything else falls back to a generic local
    /// context.
    #[must_use]
    pub fn cultural_context(&self) -> String {
        let location = self.location.to_lowercase();

        if ["gaza", "palestine", "west bank"]
            .iter()
            .any(|kw| location.contains(kw))
        {
            "Assessment conducted considering ongoing conflict exposure and displacement trauma"
                .into()
        } else if ["ukraine", "kyiv", "kharkiv", "mariupol"]
            .iter()
            .any(|kw| location.contains(kw))
        {
            "Assessment considering war-related trauma and displacement from conflict zones"
                .into()
        } else if ["syria", "lebanon", "jordan"]
            .iter()
            .any(|kw| location.contains(kw))
        {
            "Assessment considering refugee experience and cultural adaptation challenges".into()
        } else {
            format!(
                "Assessment conducted with consideration for local cultural context in {}",
                self.location
            )
        }
    }
}
