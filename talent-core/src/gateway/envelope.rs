//! Interpretation of the tagged `{"Ok": ..}` / `{"Err": ..}` reply envelope.

use serde_json::Value;

use super::wire::decode_nat;
use crate::error::{RejectReason, ServiceError, TransportError};

/// Unwrap a reply envelope into its success payload or a typed rejection.
pub fn open(operation: &str, reply: Value) -> Result<Value, ServiceError> {
    let Value::Object(mut fields) = reply else {
        return Err(TransportError::malformed(operation, "expected a tagged result envelope").into());
    };

    if fields.len() == 1 {
        if let Some(ok) = fields.remove("Ok") {
            return Ok(ok);
        }
        if let Some(err) = fields.remove("Err") {
            return Err(ServiceError::rejected(operation, reject_reason(&err)));
        }
    }

    Err(TransportError::malformed(operation, "expected exactly one of Ok or Err").into())
}

/// Classify a rejection payload, either free text or a tagged variant.
pub fn reject_reason(payload: &Value) -> RejectReason {
    match payload {
        Value::String(text) => reason_from_text(text),
        Value::Object(fields) => match fields.iter().next() {
            Some((tag, detail)) if fields.len() == 1 => reason_from_variant(tag, detail),
            _ => RejectReason::Other(payload.to_string()),
        },
        other => RejectReason::Other(other.to_string()),
    }
}

fn reason_from_variant(tag: &str, detail: &Value) -> RejectReason {
    let nat_field = |name: &str| detail.get(name).and_then(decode_nat);

    match tag {
        "NotAuthorized" | "Unauthorized" => RejectReason::NotAuthorized,
        "AlreadyHasAdmin" => RejectReason::AlreadyHasAdmin,
        "AdminNotRegistered" => RejectReason::AdminNotRegistered,
        "RequestNotFound" => RejectReason::RequestNotFound,
        "NotFound" => RejectReason::NotFound(detail_text(detail)),
        "AlreadyExists" => RejectReason::AlreadyExists(detail_text(detail)),
        "InsufficientAllowance" => RejectReason::InsufficientAllowance {
            allowance: nat_field("allowance"),
        },
        "InsufficientFunds" => RejectReason::InsufficientFunds {
            balance: nat_field("balance"),
        },
        "AllowanceChanged" => RejectReason::AllowanceChanged {
            current_allowance: nat_field("current_allowance"),
        },
        "BadFee" => RejectReason::BadFee {
            expected_fee: nat_field("expected_fee"),
        },
        "Expired" => RejectReason::Expired,
        "TooOld" => RejectReason::TooOld,
        "CreatedInFuture" => RejectReason::CreatedInFuture,
        "Duplicate" => RejectReason::Duplicate,
        "TemporarilyUnavailable" => RejectReason::TemporarilyUnavailable,
        "TransferFailed" => {
            let text = detail_text(detail);
            match reason_from_text(&text) {
                RejectReason::Other(_) => RejectReason::TransferFailed(text),
                known => known,
            }
        }
        "GenericError" => RejectReason::Generic {
            code: nat_field("error_code"),
            message: detail
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        other => RejectReason::Other(format!("{}: {}", other, detail_text(detail))),
    }
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Free-text rejections as produced by the profile store and token factory.
fn reason_from_text(text: &str) -> RejectReason {
    let lower = text.to_ascii_lowercase();

    if lower.contains("insufficientallowance") || lower.contains("insufficient allowance") {
        RejectReason::InsufficientAllowance { allowance: None }
    } else if lower.contains("insufficientfunds") || lower.contains("insufficient funds") {
        RejectReason::InsufficientFunds { balance: None }
    } else if lower.contains("admin already registered") {
        RejectReason::AlreadyHasAdmin
    } else if lower.contains("admin not registered") {
        RejectReason::AdminNotRegistered
    } else if lower.starts_with("not authorized")
        || lower.starts_with("unauthorized")
        || lower.contains("not allowed")
    {
        RejectReason::NotAuthorized
    } else if lower.contains("request not found") {
        RejectReason::RequestNotFound
    } else if lower.contains("not found") || lower.contains("does not exist") {
        RejectReason::NotFound(text.to_string())
    } else if lower.contains("already exists") || lower.contains("only create one") {
        RejectReason::AlreadyExists(text.to_string())
    } else {
        RejectReason::Other(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_ok_payload() {
        let value = open("get_admin", json!({ "Ok": "aaaaa-aa" })).unwrap();
        assert_eq!(value, json!("aaaaa-aa"));
    }

    #[test]
    fn test_open_err_text() {
        let err = open("register_admin", json!({ "Err": "Admin already registered" })).unwrap_err();
        assert_eq!(err.reject_reason(), Some(&RejectReason::AlreadyHasAdmin));
    }

    #[test]
    fn test_open_err_variant() {
        let err = open(
            "accept_token_request",
            json!({ "Err": { "NotAuthorized": null } }),
        )
        .unwrap_err();
        assert!(err.is_not_authorized());

        let err = open(
            "icrc2_approve",
            json!({ "Err": { "InsufficientFunds": { "balance": "12" } } }),
        )
        .unwrap_err();
        assert_eq!(
            err.reject_reason(),
            Some(&RejectReason::InsufficientFunds { balance: Some(12) })
        );
    }

    #[test]
    fn test_transfer_failed_text_is_refined() {
        let reason = reject_reason(&json!({
            "TransferFailed": "Transfer error: InsufficientAllowance { allowance: 0 }"
        }));
        assert_eq!(reason, RejectReason::InsufficientAllowance { allowance: None });

        let reason = reject_reason(&json!({ "TransferFailed": "ledger stopped" }));
        assert_eq!(reason, RejectReason::TransferFailed("ledger stopped".to_string()));
    }

    #[test]
    fn test_free_text_classification() {
        assert_eq!(
            reject_reason(&json!("Not authorized, caller: 2vxsx-fae")),
            RejectReason::NotAuthorized
        );
        assert_eq!(
            reject_reason(&json!("Unauthorized: Only admin can update WASM module")),
            RejectReason::NotAuthorized
        );
        assert_eq!(reject_reason(&json!("Request not found")), RejectReason::RequestNotFound);
        assert!(matches!(
            reject_reason(&json!("You can only create one token")),
            RejectReason::AlreadyExists(_)
        ));
        assert!(matches!(
            reject_reason(&json!("User not found")),
            RejectReason::NotFound(_)
        ));
    }

    #[test]
    fn test_malformed_envelopes() {
        assert!(matches!(
            open("get_admin", json!("aaaaa-aa")),
            Err(ServiceError::Transport(TransportError::MalformedResponse { .. }))
        ));
        assert!(matches!(
            open("get_admin", json!({ "Ok": 1, "Err": 2 })),
            Err(ServiceError::Transport(TransportError::MalformedResponse { .. }))
        ));
    }
}
