//! Contract tests for spec §8 invariants 1, 5 and 6: single ownership,
//! clone round-trip, and immutability of Initial Information Packets.

use flowmesh_core::{CancellationHandle, Connection, Ip, InputPort, OutputPort};

#[test]
fn clone_round_trip_preserves_payload_and_metadata_but_not_id_or_owner() {
    let mut original = Ip::new_normal(42i32);
    original.set_owner("process-a").unwrap();
    original.set_metadata(
        "trace",
        flowmesh_core::ip::MetadataValue::Text("abc".to_string()),
    );

    let cloned = original.clone_ip();

    assert_eq!(cloned.payload(), original.payload());
    assert_ne!(cloned.id(), original.id());
    assert_eq!(cloned.owner(), None);
    assert_eq!(
        cloned.get_metadata("trace"),
        original.get_metadata("trace")
    );
}

#[test]
fn immutable_ip_rejects_set_owner_without_mutating() {
    let mut initial = Ip::new_initial("config-value".to_string());
    assert!(initial.is_immutable());

    let err = initial.set_owner("process-a").unwrap_err();
    assert_eq!(err.code(), flowmesh_core::error::codes::OWNERSHIP_VIOLATION);
    assert_eq!(initial.owner(), None);
}

#[tokio::test]
async fn ip_transferred_through_a_port_is_owned_by_exactly_one_side_at_a_time() {
    // A normal IP starts unowned; the sender can claim ownership before
    // handing it to the port, and once accepted by the receiver only the
    // receiver's copy exists — there is no way for the sender to retain a
    // reference to the moved value, since `send` takes it by value.
    let mut ip = Ip::new_normal(7i32);
    ip.set_owner("sender").unwrap();
    assert_eq!(ip.owner(), Some("sender"));

    let output = OutputPort::<i32>::new("out", true);
    let input = InputPort::<i32>::new("in", true);
    let (tx, rx) = Connection::new(4).unwrap().split();
    output.connect(tx).unwrap();
    input.connect(rx).await.unwrap();

    let cancel = CancellationHandle::new();
    output.send(&cancel, ip).await.unwrap();

    let received = input.receive(&cancel).await.unwrap();
    // The IP that crossed the port boundary still carries the sender's
    // ownership tag (the runtime does not reset it on transit) but the
    // sender's own binding is gone — `ip` was moved into `send`.
    assert_eq!(received.owner(), Some("sender"));
    assert_eq!(received.into_payload(), Some(7));
}
