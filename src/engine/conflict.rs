use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Check a requested window before any state is touched.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::Validation("reservation end must be after start"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::Validation("reservation window too long"));
    }
    Ok(span)
}

pub(crate) fn validate_fields(
    name: &str,
    short_description: &str,
    full_description: &str,
) -> Result<(), EngineError> {
    if short_description.trim().is_empty() {
        return Err(EngineError::Validation("short description is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::Validation("name too long"));
    }
    if short_description.chars().count() > MAX_SHORT_DESCRIPTION_LEN {
        return Err(EngineError::Validation("short description too long"));
    }
    if full_description.chars().count() > MAX_FULL_DESCRIPTION_LEN {
        return Err(EngineError::Validation("full description too long"));
    }
    Ok(())
}

/// Id of a stored reservation that blocks `span`, if any.
pub(crate) fn find_conflict(st: &EquipmentState, span: &Span, policy: OverlapPolicy) -> Option<ulid::Ulid> {
    st.first_conflict(span, policy).map(|r| r.id)
}
