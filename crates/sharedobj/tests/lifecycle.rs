//! Creating, attaching, closing and unlinking containers.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{attach, init_tracing, named, unique_name};
use sharedobj::{Error, Options, SharedObject, Value, WriterLock, log_name};
use sharedobj_shm::Segment;

#[test]
fn test_close_and_unlink_are_idempotent() {
    init_tracing();
    let writer: SharedObject = SharedObject::create(Value::seq([1, 2]), &named("close")).unwrap();
    let name = writer.name().to_string();
    let reader = attach(&name).unwrap();

    reader.close();
    reader.close();
    assert!(reader.is_closed());
    assert!(matches!(reader.len(), Err(Error::Closed(_))));
    assert!(matches!(reader.append(3), Err(Error::Closed(_))));

    // Closing a handle leaves the storage to everyone else.
    writer.append(3).unwrap();
    assert_eq!(attach(&name).unwrap().to_value().unwrap(), Value::seq([1, 2, 3]));

    writer.close();
    writer.unlink().unwrap();
    writer.unlink().unwrap();
    assert!(!Segment::exists(&name));
    assert!(!Segment::exists(&log_name(&name)));
    assert!(matches!(attach(&name), Err(Error::NotFound(_))));
}

#[test]
fn test_unlink_removes_snapshot() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("unsnap")).unwrap();
    writer.dump_full_object().unwrap();
    let control = sharedobj::ControlBlock::open(writer.name()).unwrap();
    let snapshot = control.snapshot_name().unwrap().unwrap();
    assert!(Segment::exists(&snapshot));

    writer.unlink().unwrap();
    assert!(!Segment::exists(&snapshot));
}

#[test]
fn test_attach_missing_container() {
    assert!(matches!(
        attach(&unique_name("missing")),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_duplicate_name_rejected() {
    let config = named("dup");
    let first: SharedObject = SharedObject::create(Value::seq([1]), &config).unwrap();
    let second: sharedobj::Result<SharedObject> = SharedObject::create(Value::seq([2]), &config);
    assert!(matches!(second, Err(Error::AlreadyExists(_))));

    // The existing container is untouched.
    assert_eq!(
        attach(first.name()).unwrap().to_value().unwrap(),
        Value::seq([1])
    );
    first.unlink().unwrap();
}

#[test]
fn test_open_with_options() {
    let missing_value: sharedobj::Result<SharedObject> = SharedObject::open(Options {
        create: true,
        ..Options::default()
    });
    assert!(matches!(missing_value, Err(Error::MissingValue)));

    let missing_name: sharedobj::Result<SharedObject> = SharedObject::open(Options::default());
    assert!(matches!(missing_name, Err(Error::MissingName)));

    let created: SharedObject =
        SharedObject::open(Options::create(Value::set([1, 2])).with_config(named("options")))
            .unwrap();
    let attached: SharedObject = SharedObject::open(Options::attach(created.name())).unwrap();
    assert_eq!(attached.to_value().unwrap(), Value::set([1, 2]));
    assert_eq!(attached.kind(), created.kind());
    created.unlink().unwrap();
}

#[test]
fn test_scalar_values_rejected() {
    for value in [Value::from(5), Value::from("text"), Value::Null] {
        let created: sharedobj::Result<SharedObject> =
            SharedObject::create(value, &named("scalar"));
        assert!(matches!(created, Err(Error::UnsupportedKind(_))));
    }
}

#[test]
fn test_descriptor_too_large_cleans_up() {
    let config = named("toolarge").with_control_size(280);
    let name = config.name.clone().unwrap();
    let created: sharedobj::Result<SharedObject> = SharedObject::create(
        Value::default_map("x".repeat(64), Vec::<(Value, Value)>::new()),
        &config,
    );
    assert!(matches!(
        created,
        Err(Error::DescriptorTooLarge { available: 280, .. })
    ));
    assert!(!Segment::exists(&name));
    assert!(!Segment::exists(&log_name(&name)));

    // A plain list fits in the same control size.
    let list: SharedObject = SharedObject::create(Value::seq([1]), &config).unwrap();
    list.unlink().unwrap();
}

#[test]
fn test_handles_share_one_mirror() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("clone")).unwrap();
    let copy = writer.clone();
    copy.append(2).unwrap();
    assert_eq!(writer.to_value().unwrap(), Value::seq([1, 2]));
    copy.close();
    assert!(writer.is_closed());
    writer.unlink().unwrap();
}

#[derive(Default)]
struct CountingLock {
    locks: AtomicUsize,
    unlocks: AtomicUsize,
}

impl WriterLock for CountingLock {
    fn lock(&self) {
        self.locks.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_writer_lock_wraps_mutations() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("lock")).unwrap();
    let lock = Arc::new(CountingLock::default());
    writer.set_writer_lock(lock.clone());

    writer.append(2).unwrap();
    writer.extend([3, 4]).unwrap();
    assert_eq!(lock.locks.load(Ordering::SeqCst), 2);

    writer.len().unwrap();
    writer.to_value().unwrap();
    writer.contains(&Value::from(3)).unwrap();
    assert_eq!(lock.locks.load(Ordering::SeqCst), 2);

    // Released on failure too.
    assert!(writer.pop(Some(10)).is_err());
    assert_eq!(lock.locks.load(Ordering::SeqCst), 3);
    assert_eq!(lock.unlocks.load(Ordering::SeqCst), 3);

    writer.unlink().unwrap();
}

#[test]
fn test_writer_lock_reaches_nested_children() {
    let writer: SharedObject = SharedObject::create(
        Value::seq([Value::seq([1])]),
        &named("locknested").nested(true),
    )
    .unwrap();
    let lock = Arc::new(CountingLock::default());
    writer.set_writer_lock(lock.clone());

    let child = writer
        .get_item(&Value::from(0))
        .unwrap()
        .into_shared()
        .unwrap();
    child.append(2).unwrap();
    assert_eq!(lock.locks.load(Ordering::SeqCst), 1);

    writer.append(Value::seq([3])).unwrap();
    let second = writer
        .get_item(&Value::from(1))
        .unwrap()
        .into_shared()
        .unwrap();
    second.append(4).unwrap();
    assert_eq!(lock.locks.load(Ordering::SeqCst), 3);

    writer.unlink().unwrap();
}

#[test]
fn test_unlink_by_name() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("byname")).unwrap();
    let name = writer.name().to_string();
    assert!(<SharedObject>::unlink_by_name(&log_name(&name)));
    assert!(!<SharedObject>::unlink_by_name(&log_name(&name)));
    assert!(<SharedObject>::unlink_by_name(&name));
    assert!(!Segment::exists(&name));
}

#[test]
fn test_equality_and_display() {
    let a: SharedObject = SharedObject::create(Value::seq([1, 2]), &named("eqa")).unwrap();
    let b: SharedObject = SharedObject::create(Value::seq([1, 2]), &named("eqb")).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, Value::seq([1, 2]));
    b.append(3).unwrap();
    assert_ne!(a, b);

    assert_eq!(a.to_string(), "[1, 2]");
    assert!(format!("{:?}", a).contains(a.name()));

    a.unlink().unwrap();
    b.unlink().unwrap();
}

#[test]
fn test_failed_populate_cleans_up() {
    let config = named("badpopulate");
    let name = config.name.clone().unwrap();
    let created: sharedobj::Result<SharedObject> =
        SharedObject::create(Value::seq([Value::Shared("nowhere".to_string())]), &config);
    assert!(matches!(created, Err(Error::UnsupportedKind(_))));
    assert!(!Segment::exists(&name));
    assert!(!Segment::exists(&log_name(&name)));

    // The name is free again.
    let retry: SharedObject = SharedObject::create(Value::seq([1]), &config).unwrap();
    assert_eq!(retry.to_value().unwrap(), Value::seq([1]));
    retry.unlink().unwrap();
}

#[test]
fn test_failed_nested_populate_removes_children() {
    let config = named("badnested").nested(true);
    let name = config.name.clone().unwrap();
    let created: sharedobj::Result<SharedObject> = SharedObject::create(
        Value::seq(vec![Value::seq([1]), Value::Shared("nowhere".to_string())]),
        &config,
    );
    assert!(matches!(created, Err(Error::UnsupportedKind(_))));
    assert!(!Segment::exists(&name));
    assert!(!Segment::exists(&log_name(&name)));
    assert!(!Segment::exists(&sharedobj::registry_name(&name)));
}

#[test]
fn test_unlink_closes_the_handle() {
    let writer: SharedObject = SharedObject::create(Value::seq([1]), &named("unlinkclose")).unwrap();
    writer.unlink().unwrap();
    assert!(writer.is_closed());
    assert!(matches!(writer.append(2), Err(Error::Closed(_))));
    assert!(matches!(writer.len(), Err(Error::Closed(_))));
    assert!(!Segment::exists(writer.name()));
}
