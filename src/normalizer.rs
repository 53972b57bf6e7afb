//! Resource type normalization.
//!
//! Graph nodes are keyed by a single canonical type name. Resources coming
//! from discovery carry the generic `Resource` label and a provider type
//! string; anything else (labels written by other tooling) is keyed by its
//! most specific label.

/// Labels that say nothing about what a resource is.
const GENERIC_LABELS: &[&str] = &["Resource", "Original"];

/// Canonical type name returned when nothing better is known.
pub const UNKNOWN_TYPE: &str = "Unknown";

/// Map labels and an optional provider type to a canonical type name.
///
/// - Generic `Resource` label plus a provider type: the last `/` segment
///   of the provider type (`Microsoft.Compute/virtualMachines` →
///   `virtualMachines`).
/// - Otherwise the first non-generic label, falling back to the first
///   label, falling back to `"Unknown"`.
///
/// Pure and total.
#[must_use]
pub fn normalize<S: AsRef<str>>(labels: &[S], provider_type: Option<&str>) -> String {
    let has_resource_label = labels
        .iter()
        .any(|l| l.as_ref().eq_ignore_ascii_case(GENERIC_LABELS[0]));

    if has_resource_label {
        if let Some(segment) = provider_type.and_then(last_type_segment) {
            return segment.to_string();
        }
    }

    labels
        .iter()
        .map(AsRef::as_ref)
        .find(|l| !is_generic(l))
        .or_else(|| labels.first().map(AsRef::as_ref))
        .map_or_else(|| UNKNOWN_TYPE.to_string(), str::to_string)
}

fn is_generic(label: &str) -> bool {
    GENERIC_LABELS.iter().any(|g| g.eq_ignore_ascii_case(label))
}

fn last_type_segment(provider_type: &str) -> Option<&str> {
    provider_type
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
