use std::collections::HashMap;
use std::sync::Arc;

use lastcall::{
    Channel, CloseError, Direction, Element, Kind, OverrideStore, Received, Reflect, Select,
    channel_in, close_with_value,
};

fn store() -> Arc<OverrideStore> {
    Arc::new(OverrideStore::new())
}

fn assert_override<T>(ch: &Channel<T>, expected: T)
where
    T: Element + PartialEq + std::fmt::Debug,
{
    assert_eq!(ch.recv_blocking(), Received::Override(expected));
}

#[derive(Clone, Debug, PartialEq)]
enum Item {
    Int(i64),
    Text(String),
    List(Arc<Vec<i32>>),
}

impl Element for Item {
    const KIND: Kind = Kind::Enum;
}

#[derive(Clone, Debug, PartialEq)]
struct Complex {
    a: i32,
    b: String,
    c: Option<Arc<Complex>>,
}

impl Element for Complex {
    const KIND: Kind = Kind::Struct;
}

#[test]
fn every_element_shape_round_trips() {
    let store = store();

    let ch = Channel::<i32>::new_in(&store, "int", 1);
    ch.close_with_value(10).unwrap();
    assert_override(&ch, 10);

    let ch = Channel::<u32>::new_in(&store, "uint", 1);
    ch.close_with_value(10).unwrap();
    assert_override(&ch, 10);

    let ch = Channel::<String>::new_in(&store, "string", 1);
    ch.close_with_value("foobar".to_string()).unwrap();
    assert_override(&ch, "foobar".to_string());

    let items = vec![
        Item::Int(10),
        Item::Text("foobar".into()),
        Item::List(Arc::new(vec![1, 2, 3])),
    ];
    let ch = Channel::<Vec<Item>>::new_in(&store, "slice", 1);
    ch.close_with_value(items.clone()).unwrap();
    assert_override(&ch, items);

    let map = HashMap::from([("foo".to_string(), 1_u64), ("bar".to_string(), 2_u64)]);
    let ch = Channel::<HashMap<String, u64>>::new_in(&store, "map", 1);
    ch.close_with_value(map.clone()).unwrap();
    assert_override(&ch, map);

    let inner = Channel::<i32>::new_in(&store, "inner", 1);
    let ch = Channel::<Channel<i32>>::new_in(&store, "chan-of-chan", 1);
    ch.close_with_value(inner.clone()).unwrap();
    assert_override(&ch, inner);

    let base = Arc::new(Complex {
        a: 0,
        b: String::new(),
        c: None,
    });
    let value = Complex {
        a: 1,
        b: String::new(),
        c: Some(Arc::clone(&base)),
    };
    let ch = Channel::<Complex>::new_in(&store, "struct", 1);
    ch.close_with_value(value.clone()).unwrap();
    assert_override(&ch, value);

    let pointer = Arc::new(Complex {
        a: 0,
        b: "val".into(),
        c: Some(base),
    });
    let ch = Channel::<Arc<Complex>>::new_in(&store, "pointer", 1);
    ch.close_with_value(Arc::clone(&pointer)).unwrap();
    match ch.recv_blocking() {
        Received::Override(got) => assert!(Arc::ptr_eq(&got, &pointer)),
        other => panic!("expected the pointer override, got {other:?}"),
    }
}

#[test]
fn send_after_close_with_value_is_an_error() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "send", 1);
    ch.close_with_value(10).unwrap();
    let err = ch.try_send(1).unwrap_err();
    assert!(err.is_closed());
}

#[test]
fn validation_errors_and_messages() {
    let store = store();

    let err = close_with_value(&10_i32, &100_i32).unwrap_err();
    assert_eq!(
        err,
        CloseError::NotWritableChannel {
            kind: Kind::Int,
            direction: None,
        }
    );
    assert_eq!(
        err.to_string(),
        r#"provided entity kind "int" is not a writable channel"#
    );

    let (tx, rx) = channel_in::<i32>(&store, "directions", 1);
    let err = close_with_value(&rx, &100_i32).unwrap_err();
    assert_eq!(
        err,
        CloseError::NotWritableChannel {
            kind: Kind::Chan,
            direction: Some(Direction::Recv),
        }
    );
    assert_eq!(
        err.to_string(),
        r#"provided entity "<-chan" is not a writable channel"#
    );

    close_with_value(&tx, &100_i32).unwrap();

    let ch = Channel::<i32>::new_in(&store, "mismatch", 1);
    let err = close_with_value(&ch, &"bbbb").unwrap_err();
    assert!(matches!(
        err,
        CloseError::ChannelTypeMismatch {
            value: Kind::String,
            channel: Kind::Int,
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        r#"provided value kind "string" doesn't match provided channel kind "int""#
    );
}

#[test]
fn repeated_close_replaces_and_cancel_restores_zero_value() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "idempotence", 1);

    ch.close_with_value(10).unwrap();
    assert_eq!(ch.recv_blocking().into_pair(), (10, false));

    ch.close_with_value(10).unwrap();
    assert_eq!(ch.recv_blocking().into_pair(), (10, false));

    let cancel = ch.close_with_value(15).unwrap();
    assert_eq!(ch.recv_blocking().into_pair(), (15, false));

    cancel.cancel();
    assert_eq!(ch.recv_blocking().into_pair(), (0, false));
    assert!(store.is_empty());
}

#[test]
fn several_channels_keep_their_own_override() {
    let store = store();
    let channels: Vec<_> = (1..=3)
        .map(|i| {
            let ch = Channel::<i32>::new_in(&store, format!("multi-{i}"), 2);
            ch.try_send(i).unwrap();
            ch
        })
        .collect();

    for (i, ch) in (1..=3).zip(&channels) {
        ch.close_with_value(i * 10).unwrap();
    }

    for (i, ch) in (1..=3).zip(&channels) {
        assert_eq!(ch.recv_blocking().into_pair(), (i, true));
        assert_eq!(ch.recv_blocking().into_pair(), (i * 10, false));
        assert_eq!(ch.recv_blocking().into_pair(), (i * 10, false));
    }
}

#[test]
fn non_blocking_receive_sees_override_then_zero_value() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "select", 1);
    let cancel = ch.close_with_value(10).unwrap();

    match ch.try_recv() {
        Some(received) => assert_eq!(received.into_pair(), (10, false)),
        None => panic!("closed channel must be ready"),
    }

    cancel.cancel();
    match ch.try_recv() {
        Some(received) => assert_eq!(received.into_pair(), (0, false)),
        None => panic!("closed channel must be ready"),
    }
}

#[test]
fn select_over_one_closed_channel() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "select-one", 1);
    let cancel = ch.close_with_value(10).unwrap();

    let mut sel = Select::new();
    sel.recv(ch.receiver());
    let op = sel.try_select().expect("closed channel is ready");
    assert_eq!(op.recv(ch.receiver()).into_pair(), (10, false));

    cancel.cancel();
    let op = sel.try_select().expect("closed channel is ready");
    assert_eq!(op.recv(ch.receiver()).into_pair(), (0, false));
}

#[test]
fn reflective_receive() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "reflect", 1);
    let cancel = ch.close_with_value(10).unwrap();

    let entity: &dyn Reflect = &ch;
    let receiver = entity.as_receiver().expect("channels can receive");
    assert_eq!(receiver.element().kind(), Kind::Int);

    let got = receiver.recv_dyn(true).expect("blocking receive always completes");
    assert!(!got.is_received());
    assert_eq!(got.downcast::<i32>().unwrap(), Received::Override(10));

    cancel.cancel();
    let got = receiver.recv_dyn(true).expect("blocking receive always completes");
    assert_eq!(got.downcast::<i32>().unwrap().into_pair(), (0, false));
}

#[test]
fn reflective_receive_delivers_buffered_values_first() {
    let store = store();
    let ch = Channel::<String>::new_in(&store, "reflect-drain", 2);
    ch.try_send("first".into()).unwrap();
    ch.close_with_value("last".into()).unwrap();

    let receiver = ch.receiver().as_dyn();
    let got = receiver.recv_dyn(false).expect("value is buffered");
    assert_eq!(got.downcast::<String>().unwrap(), Received::Value("first".into()));
    let got = receiver.recv_dyn(false).expect("channel is closed");
    assert_eq!(got.downcast::<String>().unwrap(), Received::Override("last".into()));
}

#[test]
fn reflective_downcast_to_the_wrong_type_gives_the_value_back() {
    let store = store();
    let ch = Channel::<u8>::new_in(&store, "reflect-wrong", 1);
    ch.close_with_value(3).unwrap();

    let got = ch.receiver().as_dyn().recv_dyn(true).expect("closed");
    let got = got.downcast::<i64>().unwrap_err();
    assert_eq!(got.downcast::<u8>().unwrap(), Received::Override(3));
}

#[test]
fn dynamic_close_of_a_channel_of_channels() {
    let store = store();
    let inner = Channel::<i32>::new_in(&store, "inner", 1);
    let outer = Channel::<Channel<i32>>::new_in(&store, "outer", 1);

    close_with_value(&outer, &inner).unwrap();
    assert_eq!(outer.recv_blocking(), Received::Override(inner.clone()));

    let err = close_with_value(&outer, &5_i32).unwrap_err();
    assert!(matches!(
        err,
        CloseError::ChannelTypeMismatch {
            value: Kind::Int,
            channel: Kind::Chan,
            ..
        }
    ));

    let other = Channel::<u8>::new_in(&store, "other-inner", 1);
    let err = close_with_value(&outer, &other).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(r#"(both kind "chan")"#), "{message}");
    assert!(message.contains("Channel<u8>"), "{message}");
}

#[test]
fn store_snapshot_serialises() {
    let store = store();
    let ch = Channel::<i32>::new_in(&store, "snap", 1);
    ch.close_with_value(1).unwrap();
    ch.close_with_value(2).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.overrides.len(), 1);
    assert_eq!(snapshot.overrides[0].channel_name, "snap");
    assert_eq!(snapshot.overrides[0].replacements, 1);

    let json = facet_json::to_string(&snapshot).expect("snapshot should serialise");
    assert!(json.contains(r#""channel_name":"snap""#), "{json}");
    assert!(json.contains(r#""kind":"int""#), "{json}");
}
