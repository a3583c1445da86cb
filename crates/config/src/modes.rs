//! Per-mode defaults
//!
//! A mode change resets the session's sensitivity to the mode default; the
//! user can adjust it afterwards within `[0, 1]`.

use redi_core::SessionMode;

/// Default sensitivity for a mode.
///
/// Higher values make the assistant interject more readily. Hands-busy
/// activities (sports, cooking, assembly) default high; conversational
/// contexts (meeting, monitoring) default low.
pub fn default_sensitivity(mode: SessionMode) -> f32 {
    match mode {
        SessionMode::General => 0.5,
        SessionMode::Studying => 0.4,
        SessionMode::Meeting => 0.2,
        SessionMode::Sports => 0.7,
        SessionMode::Music => 0.5,
        SessionMode::Assembly => 0.6,
        SessionMode::Monitoring => 0.3,
        SessionMode::Cooking => 0.6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_modes_have_in_range_defaults() {
        for mode in [
            SessionMode::General,
            SessionMode::Studying,
            SessionMode::Meeting,
            SessionMode::Sports,
            SessionMode::Music,
            SessionMode::Assembly,
            SessionMode::Monitoring,
            SessionMode::Cooking,
        ] {
            let s = default_sensitivity(mode);
            assert!((0.0..=1.0).contains(&s), "{:?} default out of range", mode);
        }
    }

    #[test]
    fn sports_interjects_more_than_meeting() {
        assert!(default_sensitivity(SessionMode::Sports) > default_sensitivity(SessionMode::Meeting));
    }
}
