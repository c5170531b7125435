//! Byte-exact canonical JSON encoding of a [`Receipt`].
//!
//! Deliberately hand-written instead of delegating to `serde_json`'s default
//! map/struct serialization: the signing input's field order is part of the
//! protocol (fixed, not lexicographic), and a generic serializer gives no
//! guarantee about preserving struct declaration order or not introducing
//! whitespace in a future version. This encoder is the only place that
//! matters for signature compatibility; it never rounds, reorders, or
//! re-escapes through an intermediate `serde_json::Value`.

use coordinator_primitives::Receipt;

/// Appends `value` to `out` as a minimally-escaped JSON string literal.
fn write_escaped_string(out: &mut String, value: &str) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_field_string(out: &mut String, key: &str, value: &str, first: &mut bool) {
    if !*first {
        out.push(',');
    }
    *first = false;
    write_escaped_string(out, key);
    out.push(':');
    write_escaped_string(out, value);
}

fn write_field_u64(out: &mut String, key: &str, value: u64, first: &mut bool) {
    if !*first {
        out.push(',');
    }
    *first = false;
    write_escaped_string(out, key);
    out.push(':');
    out.push_str(&value.to_string());
}

/// Encodes the fields that are signed: every `Receipt` field except
/// `key_id` and `signature`, in a fixed order.
pub(crate) fn signing_bytes(receipt: &Receipt) -> Vec<u8> {
    let mut out = String::new();
    out.push('{');
    let first = &mut true;
    write_field_string(&mut out, "receipt_id", receipt.receipt_id.as_str(), first);
    write_field_string(&mut out, "job_id", receipt.job_id.as_str(), first);
    write_field_string(&mut out, "miner_id", receipt.miner_id.as_str(), first);
    write_field_string(&mut out, "submitter_id", receipt.submitter_id.as_str(), first);
    write_field_u64(&mut out, "units_consumed", receipt.units_consumed, first);
    write_field_u64(&mut out, "unit_rate", receipt.unit_rate.0, first);
    write_field_u64(&mut out, "amount_charged", receipt.amount_charged.0, first);
    write_field_u64(&mut out, "started_ms", receipt.started_ms.0, first);
    write_field_u64(&mut out, "completed_ms", receipt.completed_ms.0, first);
    write_field_string(&mut out, "result_hash", &receipt.result_hash, first);
    write_field_string(&mut out, "model", &receipt.model, first);
    out.push('}');
    out.into_bytes()
}

/// Encodes the full wire form, including `key_id` and `signature`, in the
/// same fixed order. Used for the on-the-wire JSON, not for signing.
pub fn wire_bytes(receipt: &Receipt) -> Vec<u8> {
    let mut out = String::new();
    out.push('{');
    let first = &mut true;
    write_field_string(&mut out, "receipt_id", receipt.receipt_id.as_str(), first);
    write_field_string(&mut out, "job_id", receipt.job_id.as_str(), first);
    write_field_string(&mut out, "miner_id", receipt.miner_id.as_str(), first);
    write_field_string(&mut out, "submitter_id", receipt.submitter_id.as_str(), first);
    write_field_u64(&mut out, "units_consumed", receipt.units_consumed, first);
    write_field_u64(&mut out, "unit_rate", receipt.unit_rate.0, first);
    write_field_u64(&mut out, "amount_charged", receipt.amount_charged.0, first);
    write_field_u64(&mut out, "started_ms", receipt.started_ms.0, first);
    write_field_u64(&mut out, "completed_ms", receipt.completed_ms.0, first);
    write_field_string(&mut out, "result_hash", &receipt.result_hash, first);
    write_field_string(&mut out, "model", &receipt.model, first);
    write_field_string(&mut out, "key_id", &receipt.key_id, first);
    write_field_string(&mut out, "signature", &receipt.signature, first);
    out.push('}');
    out.into_bytes()
}
