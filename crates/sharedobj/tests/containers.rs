//! Every container kind, mutated through one handle and observed through
//! an independently attached one.

mod common;

use common::{attach, init_tracing, named};
use sharedobj::{Error, JsonCodec, SharedObject, Value};

#[test]
fn test_list_replicates() {
    init_tracing();
    let config = named("list");
    let writer: SharedObject = SharedObject::create(Value::seq([0, 1, 2]), &config).unwrap();
    let reader = attach(writer.name()).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([0, 1, 2]));

    writer.append(3).unwrap();
    writer.insert(0, -1).unwrap();
    writer.extend([4, 5]).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([-1, 0, 1, 2, 3, 4, 5]));

    writer.set_item(1, 10).unwrap();
    writer.del_item(&Value::from(-1)).unwrap();
    assert_eq!(writer.pop(None).unwrap(), Value::from(4));
    writer.remove(&Value::from(10)).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([-1, 1, 2, 3]));

    writer.reverse().unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([3, 2, 1, -1]));
    writer.sort(false).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([-1, 1, 2, 3]));
    writer.sort(true).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::seq([3, 2, 1, -1]));

    assert_eq!(reader.len().unwrap(), 4);
    assert_eq!(reader.index(&Value::from(1), None, None).unwrap(), 2);
    assert!(matches!(
        reader.index(&Value::from(3), Some(1), None),
        Err(Error::ValueNotFound(_))
    ));
    assert_eq!(reader.count(&Value::from(2)).unwrap(), 1);
    assert!(reader.contains(&Value::from(-1)).unwrap());
    assert_eq!(reader.get_item(&Value::from(-1)).unwrap(), Value::from(-1));

    writer.clear().unwrap();
    assert!(reader.is_empty().unwrap());

    writer.unlink().unwrap();
}

#[test]
fn test_list_errors() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("listerr")).unwrap();

    assert!(matches!(writer.pop(Some(5)), Err(Error::IndexOutOfRange(5))));
    assert!(matches!(
        writer.remove(&Value::from(99)),
        Err(Error::ValueNotFound(_))
    ));
    assert!(matches!(
        writer.set_item(3, 1),
        Err(Error::IndexOutOfRange(3))
    ));
    assert!(matches!(writer.add(1), Err(Error::WrongKind { .. })));
    assert!(matches!(writer.append_left(1), Err(Error::WrongKind { .. })));
    assert!(matches!(
        writer.get_item(&Value::from("x")),
        Err(Error::UnsupportedKind(_))
    ));

    writer.pop(None).unwrap();
    assert!(matches!(writer.pop(None), Err(Error::Empty(_))));
    // Failed operations publish nothing.
    assert_eq!(attach(writer.name()).unwrap().to_value().unwrap(), Value::seq(Vec::<Value>::new()));

    writer.unlink().unwrap();
}

#[test]
fn test_queue_replicates() {
    init_tracing();
    let writer: SharedObject =
        SharedObject::create(Value::queue([1, 2, 3], Some(4)), &named("queue")).unwrap();
    let reader = attach(writer.name()).unwrap();
    assert_eq!(reader.max_len(), Some(4));

    writer.append(4).unwrap();
    writer.append(5).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::queue([2, 3, 4, 5], None));

    writer.append_left(1).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::queue([1, 2, 3, 4], None));

    writer.rotate(1).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::queue([4, 1, 2, 3], None));

    assert_eq!(writer.pop_left().unwrap(), Value::from(4));
    assert_eq!(writer.pop(None).unwrap(), Value::from(3));
    writer.extend_left([7, 8]).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::queue([8, 7, 1, 2], None));

    assert!(matches!(writer.insert(0, 0), Err(Error::QueueFull(4))));
    assert!(matches!(writer.sort(false), Err(Error::WrongKind { .. })));
    assert!(matches!(writer.pop(Some(0)), Err(Error::WrongKind { .. })));

    writer.remove(&Value::from(7)).unwrap();
    writer.insert(1, 9).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::queue([8, 9, 1, 2], None));

    writer.unlink().unwrap();
}

#[test]
fn test_set_replicates() {
    let writer: SharedObject = SharedObject::create(Value::set([1, 2, 3]), &named("set")).unwrap();
    let reader = attach(writer.name()).unwrap();

    writer.add(4).unwrap();
    writer.discard(1).unwrap();
    writer.discard(42).unwrap();
    writer.remove(&Value::from(2)).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::set([3, 4]));

    writer.update(Value::seq([5, 6])).unwrap();
    writer.difference_update(&[Value::set([5])]).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::set([3, 4, 6]));

    writer
        .intersection_update(&[Value::seq([3, 4, 6, 7]), Value::set([3, 6])])
        .unwrap();
    writer.symmetric_difference_update(&Value::set([6, 9])).unwrap();
    assert_eq!(reader.to_value().unwrap(), Value::set([3, 9]));

    assert_eq!(reader.union(&[Value::set([1])]).unwrap(), Value::set([1, 3, 9]));
    assert_eq!(reader.difference(&[Value::set([3])]).unwrap(), Value::set([9]));
    assert_eq!(reader.intersection(&[Value::set([9, 10])]).unwrap(), Value::set([9]));
    assert_eq!(
        reader.symmetric_difference(&Value::set([3, 4])).unwrap(),
        Value::set([4, 9])
    );
    assert!(reader.is_subset(&Value::set([3, 9, 10])).unwrap());
    assert!(reader.is_superset(&Value::set([3])).unwrap());
    assert!(reader.is_disjoint(&Value::set([1])).unwrap());
    assert!(reader.contains(&Value::from(9)).unwrap());

    // Every replica pops the same member.
    assert_eq!(writer.pop(None).unwrap(), Value::from(3));
    assert_eq!(reader.to_value().unwrap(), Value::set([9]));

    assert!(matches!(
        writer.remove(&Value::from(42)),
        Err(Error::KeyNotFound(_))
    ));
    assert!(matches!(
        writer.add(Value::seq([1])),
        Err(Error::UnsupportedKind(_))
    ));
    assert!(matches!(writer.append(1), Err(Error::WrongKind { .. })));

    writer.unlink().unwrap();
}

#[test]
fn test_map_replicates() {
    let writer: SharedObject =
        SharedObject::create(Value::map([("a", 1), ("b", 2)]), &named("map")).unwrap();
    let reader = attach(writer.name()).unwrap();

    writer.set_item("c", 3).unwrap();
    writer.del_item(&Value::from("a")).unwrap();
    writer.update(Value::map([("d", 4)])).unwrap();
    assert_eq!(writer.set_default("e", 5).unwrap(), Value::from(5));
    assert_eq!(writer.set_default("b", 9).unwrap(), Value::from(2));
    assert_eq!(writer.pop_key(&Value::from("d"), None).unwrap(), Value::from(4));
    assert_eq!(
        writer.pop_key(&Value::from("zz"), Some(Value::from(0))).unwrap(),
        Value::from(0)
    );
    assert!(matches!(
        writer.pop_key(&Value::from("zz"), None),
        Err(Error::KeyNotFound(_))
    ));

    assert_eq!(
        reader.to_value().unwrap(),
        Value::map([("b", 2), ("c", 3), ("e", 5)])
    );
    assert_eq!(
        reader.keys().unwrap(),
        vec![Value::from("b"), Value::from("c"), Value::from("e")]
    );
    assert_eq!(
        reader.get(&Value::from("c"), None).unwrap().unwrap(),
        Value::from(3)
    );
    assert!(reader.get(&Value::from("q"), None).unwrap().is_none());
    assert_eq!(
        reader.get(&Value::from("q"), Some(Value::from(7))).unwrap().unwrap(),
        Value::from(7)
    );
    assert!(matches!(
        reader.get_item(&Value::from("q")),
        Err(Error::KeyNotFound(_))
    ));
    let values: Vec<Value> = reader
        .values()
        .unwrap()
        .iter()
        .map(|v| v.to_value().unwrap())
        .collect();
    assert_eq!(values, vec![Value::from(2), Value::from(3), Value::from(5)]);

    let (key, value) = writer.pop_item(true).unwrap();
    assert_eq!(key, Value::from("e"));
    assert_eq!(value, Value::from(5));
    assert!(matches!(writer.pop_item(false), Err(Error::WrongKind { .. })));
    assert!(matches!(
        writer.move_to_end(&Value::from("b"), true),
        Err(Error::WrongKind { .. })
    ));
    assert!(matches!(
        writer.set_item(Value::seq([1]), 1),
        Err(Error::UnsupportedKind(_))
    ));
    assert_eq!(reader.len().unwrap(), 2);

    writer.unlink().unwrap();
}

#[test]
fn test_default_map_fills_missing_keys() {
    let writer: SharedObject =
        SharedObject::create(Value::default_map(0, [("x", 1)]), &named("defaultmap")).unwrap();
    let reader = attach(writer.name()).unwrap();
    assert_eq!(reader.default_value(), Some(Value::from(0)));

    assert_eq!(writer.get_item(&Value::from("y")).unwrap(), Value::from(0));
    assert_eq!(reader.to_value().unwrap(), Value::map([("x", 1), ("y", 0)]));
    assert!(reader.contains(&Value::from("y")).unwrap());

    // `get` never inserts.
    assert!(reader.get(&Value::from("z"), None).unwrap().is_none());
    assert_eq!(writer.len().unwrap(), 2);

    writer.set_item("x", 5).unwrap();
    assert_eq!(reader.get_item(&Value::from("x")).unwrap(), Value::from(5));

    writer.unlink().unwrap();
}

#[test]
fn test_ordered_map_moves_entries() {
    let writer: SharedObject = SharedObject::create(
        Value::ordered_map([(1, "a"), (2, "b"), (3, "c")]),
        &named("ordered"),
    )
    .unwrap();
    let reader = attach(writer.name()).unwrap();

    writer.move_to_end(&Value::from(1), true).unwrap();
    writer.move_to_end(&Value::from(3), false).unwrap();
    assert_eq!(
        reader.keys().unwrap(),
        vec![Value::from(3), Value::from(2), Value::from(1)]
    );

    let (key, value) = writer.pop_item(false).unwrap();
    assert_eq!((key, value.to_value().unwrap()), (Value::from(3), Value::from("c")));
    let (key, _) = writer.pop_item(true).unwrap();
    assert_eq!(key, Value::from(1));
    assert_eq!(reader.keys().unwrap(), vec![Value::from(2)]);

    assert!(matches!(
        writer.move_to_end(&Value::from(9), true),
        Err(Error::KeyNotFound(_))
    ));
    writer.pop_item(true).unwrap();
    assert!(matches!(writer.pop_item(true), Err(Error::Empty(_))));

    writer.unlink().unwrap();
}

#[test]
fn test_fresh_attach_matches_long_lived_reader() {
    let writer: SharedObject = SharedObject::create(Value::seq([1, 2]), &named("views")).unwrap();
    let early = attach(writer.name()).unwrap();

    for i in 0..20 {
        writer.append(i).unwrap();
        if i % 3 == 0 {
            writer.pop(Some(0)).unwrap();
        }
    }
    writer.reverse().unwrap();

    let late = attach(writer.name()).unwrap();
    assert_eq!(early.to_value().unwrap(), writer.to_value().unwrap());
    assert_eq!(late.to_value().unwrap(), writer.to_value().unwrap());
    assert!(early == late);
    assert_eq!(early.to_string(), late.to_string());

    writer.unlink().unwrap();
}

#[test]
fn test_iteration_order() {
    let list: SharedObject = SharedObject::create(Value::seq([3, 1, 2]), &named("iterlist")).unwrap();
    let items: Vec<Value> = list.iter().unwrap().map(|e| e.to_value().unwrap()).collect();
    assert_eq!(items, vec![Value::from(3), Value::from(1), Value::from(2)]);

    let map: SharedObject =
        SharedObject::create(Value::map([("z", 1), ("a", 2)]), &named("itermap")).unwrap();
    let keys: Vec<Value> = map.iter().unwrap().map(|e| e.to_value().unwrap()).collect();
    assert_eq!(keys, vec![Value::from("z"), Value::from("a")]);

    list.unlink().unwrap();
    map.unlink().unwrap();
}

#[test]
fn test_json_codec_container() {
    let writer: SharedObject<JsonCodec> =
        SharedObject::create(Value::map([("k", Value::seq([1, 2]))]), &named("json")).unwrap();
    let reader: SharedObject<JsonCodec> = SharedObject::attach(writer.name()).unwrap();

    writer.set_item("other", Value::set(["x", "y"])).unwrap();
    assert_eq!(
        reader.to_value().unwrap(),
        Value::map([("k", Value::seq([1, 2])), ("other", Value::set(["x", "y"]))])
    );

    writer.unlink().unwrap();
}

#[test]
fn test_handles_move_across_threads() {
    let writer: SharedObject =
        SharedObject::create(Value::seq(Vec::<Value>::new()), &named("threads")).unwrap();
    let name = writer.name().to_string();

    let worker = std::thread::spawn(move || {
        let remote = attach(&name).unwrap();
        for i in 0..50 {
            remote.append(i).unwrap();
        }
    });
    worker.join().unwrap();

    assert_eq!(writer.len().unwrap(), 50);
    assert_eq!(writer.get_item(&Value::from(49)).unwrap(), Value::from(49));

    writer.unlink().unwrap();
}
