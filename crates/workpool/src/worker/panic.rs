//! Panic payload handling

use std::any::Any;

/// Human-readable message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<anyhow::Error>() {
        format!("{e:#}")
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_static_str_payload() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[test]
    fn test_formatted_payload() {
        let n = 3;
        let payload = catch_unwind(AssertUnwindSafe(|| panic!("bad value {n}"))).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad value 3");
    }

    #[test]
    fn test_error_payload() {
        let payload = catch_unwind(|| {
            std::panic::panic_any(anyhow::anyhow!("disk full").context("writing output"))
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "writing output: disk full");
    }

    #[test]
    fn test_opaque_payload() {
        let payload = catch_unwind(|| std::panic::panic_any(42_u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
