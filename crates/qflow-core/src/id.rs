//! Strongly-typed identifiers for Qflow entities.
//!
//! Each identifier wraps a UUID behind a distinct marker type via
//! [`domain_key::define_uuid!`], so a [`FlowId`] and a [`StepId`] can never
//! be swapped for one another at a call site even though both are
//! bit-for-bit UUIDs underneath.
//!
//! All ID types are `Copy`, 16 bytes, and support `v4()`, `nil()`, `parse`,
//! full serde, `Display`, `FromStr`, `Eq`, `Ord`, `Hash`.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(FlowIdDomain => FlowId);
define_uuid!(StepIdDomain => StepId);
define_uuid!(ExecutionIdDomain => ExecutionId);
define_uuid!(NodeIdDomain => NodeId);
define_uuid!(LedgerRecordIdDomain => LedgerRecordId);
define_uuid!(TokenIdDomain => TokenId);
define_uuid!(SandboxIdDomain => SandboxId);
define_uuid!(PrincipalIdDomain => PrincipalId);
define_uuid!(ValidationLayerIdDomain => ValidationLayerId);
define_uuid!(TriggerIdDomain => TriggerIdMarker);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_is_non_nil() {
        assert!(!FlowId::v4().is_nil());
        assert!(!ExecutionId::v4().is_nil());
    }

    #[test]
    fn nil_round_trips() {
        let id = StepId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn parse_roundtrips_display() {
        let id = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_invalid_errors() {
        assert!(TokenId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn distinct_types_cannot_be_swapped() {
        fn accepts_flow(_: FlowId) {}
        fn accepts_step(_: StepId) {}
        accepts_flow(FlowId::v4());
        accepts_step(StepId::v4());
        // accepts_flow(StepId::v4()); // would not compile
    }

    #[test]
    fn serde_roundtrip() {
        let id = ExecutionId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: ExecutionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ordering_is_consistent() {
        let a = LedgerRecordId::nil();
        let b = LedgerRecordId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }
}
