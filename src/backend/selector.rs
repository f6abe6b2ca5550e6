//! Backend selection and escalation order

use crate::device::DeviceProfile;
use crate::settings::{BackendPreference, PlaybackSettings};
use crate::supervisor::session::FailureHistory;

use super::BackendVariant;

/// Ordered list of variants a session may try, first entry first
pub fn escalation_chain(
    profile: &DeviceProfile,
    settings: &PlaybackSettings,
) -> Vec<BackendVariant> {
    match settings.backend_preference {
        BackendPreference::Auto if profile.is_legacy_os() => {
            vec![BackendVariant::Legacy, BackendVariant::Modern]
        }
        BackendPreference::Auto | BackendPreference::Modern => {
            vec![BackendVariant::Modern, BackendVariant::Legacy]
        }
        BackendPreference::Legacy => vec![BackendVariant::Legacy],
        BackendPreference::Alternate => vec![BackendVariant::Alternate],
        BackendPreference::Native => vec![BackendVariant::Native],
    }
}

/// Variant to start a session with
pub fn select_initial(profile: &DeviceProfile, settings: &PlaybackSettings) -> BackendVariant {
    // The chain is never empty.
    escalation_chain(profile, settings)
        .first()
        .copied()
        .unwrap_or(BackendVariant::Modern)
}

/// Next variant after a non-recoverable failure, or `None` when the chain is spent
pub fn select_next(
    profile: &DeviceProfile,
    settings: &PlaybackSettings,
    history: &FailureHistory,
) -> Option<BackendVariant> {
    escalation_chain(profile, settings)
        .into_iter()
        .find(|variant| !history.has_fatal(*variant))
}
