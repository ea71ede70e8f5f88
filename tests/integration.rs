//! Integration tests for the ledger, registry and views.

use parking_lot::Mutex;
use rvsnoop::{
    ChangeEvent, Colour, Connection, FieldMessage, FilteredLedgerView, Matcher, Record,
    RecordLedger, RecordSource, RecordTypeDescriptor, RecordTypeRegistry, SnoopConfig,
    SnoopContext, SortKey, SortOrder, SortedLedgerView, SubscriptionEvent, DEFAULT_TYPE_NAME,
};
use std::sync::Arc;

fn record(subject: &str) -> Record {
    Record::from_message(FieldMessage::new(subject))
}

fn recorder(source: &dyn RecordSource) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    source.subscribe(Arc::new(move |e: &ChangeEvent, _: &[Record]| {
        sink.lock().push(e.clone());
    }));
    events
}

// --- Classification ---

#[test]
fn test_first_matching_type_scenario() {
    let ledger = RecordLedger::new();
    let registry = RecordTypeRegistry::new();
    for s in ["A.1", "A.2", "B.1"] {
        ledger.append(record(s));
    }

    let errs = registry
        .create_type(Some("Errs"), None, Some(Matcher::create("subject_starts", "A").unwrap()))
        .unwrap();
    registry.reorder_type(&errs, 0);

    let classified: Vec<String> = ledger
        .snapshot()
        .iter()
        .map(|r| registry.first_matching_type(r).name())
        .collect();
    assert_eq!(classified, vec!["Errs", "Errs", DEFAULT_TYPE_NAME]);
}

#[test]
fn test_auto_names_reuse_lowest_gap() {
    let registry = RecordTypeRegistry::new();
    let created: Vec<_> = (0..3).map(|_| registry.create_type(None, None, None).unwrap()).collect();
    let names: Vec<String> = created.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["My Record Type #1", "My Record Type #2", "My Record Type #3"]);

    registry.remove_type(&created[1]);
    assert_eq!(registry.create_type(None, None, None).unwrap().name(), "My Record Type #2");
}

#[test]
fn test_starter_types_classify() {
    let registry = RecordTypeRegistry::with_starter_types();
    let name = |s: &str| registry.first_matching_type(&record(s)).name();
    assert_eq!(name("APP.ERROR.DB"), "Error");
    assert_eq!(name("APP.WARN"), "Warning");
    assert_eq!(name("_RV.INFO.SYSTEM"), "System");
    assert_eq!(name("ORDERS.NEW"), DEFAULT_TYPE_NAME);
}

// --- Views ---

#[test]
fn test_deselect_removes_exact_indices() {
    let ledger = Arc::new(RecordLedger::new());
    let registry = RecordTypeRegistry::new();
    registry
        .create_type(Some("X"), Some(Colour::BLUE), Some(Matcher::SubjectStartsWith("X".into())))
        .unwrap();
    let y = registry
        .create_type(Some("Y"), Some(Colour::RED), Some(Matcher::SubjectStartsWith("Y".into())))
        .unwrap();

    let view = FilteredLedgerView::new(ledger.clone(), registry.clone(), true);
    for s in ["X.1", "Y.1", "X.2", "X.3", "Y.2"] {
        ledger.append(record(s));
    }
    assert_eq!(view.len(), 5);

    let events = recorder(view.as_ref());
    y.set_selected(false);
    assert_eq!(view.len(), 3);
    assert_eq!(*events.lock(), vec![ChangeEvent::Removed { indices: vec![1, 4] }]);

    y.set_selected(true);
    assert_eq!(view.len(), 5);
}

#[test]
fn test_editing_matcher_refilters() {
    let ledger = Arc::new(RecordLedger::new());
    let registry = RecordTypeRegistry::new();
    let hidden = registry
        .create_type(Some("Hidden"), None, Some(Matcher::SubjectStartsWith("A".into())))
        .unwrap();
    hidden.set_selected(false);
    for s in ["A.1", "B.1", "C.1"] {
        ledger.append(record(s));
    }
    let view = FilteredLedgerView::new(ledger.clone(), registry, true);
    assert_eq!(view.len(), 2);

    hidden.set_matcher_value("B").unwrap();
    let subjects: Vec<String> = view.snapshot().iter().map(|r| r.subject().to_string()).collect();
    assert_eq!(subjects, vec!["A.1", "C.1"]);
}

#[test]
fn test_sorted_over_filtered() {
    let ledger = Arc::new(RecordLedger::new());
    let registry = RecordTypeRegistry::new();
    let filtered = FilteredLedgerView::new(ledger.clone(), registry, false);
    filtered.set_predicate(Some(Matcher::SubjectContains(".".into())));
    let sorted = SortedLedgerView::new(filtered.clone(), SortOrder::ascending(SortKey::Subject));

    for s in ["C.1", "NODOT", "A.1", "B.1"] {
        ledger.append(record(s));
    }
    let subjects: Vec<String> = sorted.snapshot().iter().map(|r| r.subject().to_string()).collect();
    assert_eq!(subjects, vec!["A.1", "B.1", "C.1"]);

    filtered.set_predicate(Some(Matcher::SubjectStartsWith("B".into())));
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted.get(0).unwrap().subject().as_str(), "B.1");
}

#[test]
fn test_view_events_replay_to_same_contents() {
    let ledger = Arc::new(RecordLedger::new());
    let registry = RecordTypeRegistry::new();
    let view = FilteredLedgerView::new(ledger.clone(), registry, false);

    let mirror = Arc::new(Mutex::new(Vec::<Record>::new()));
    let sink = Arc::clone(&mirror);
    view.subscribe(Arc::new(move |e: &ChangeEvent, contents: &[Record]| {
        let mut mirror = sink.lock();
        match e {
            ChangeEvent::Inserted { index } => mirror.insert(*index, contents[*index].clone()),
            ChangeEvent::Removed { indices } => {
                for &i in indices.iter().rev() {
                    mirror.remove(i);
                }
            }
            ChangeEvent::Reset => *mirror = contents.to_vec(),
        }
    }));

    let records: Vec<_> = (0..20).map(|i| record(&format!("S.{}.{}", i % 3, i))).collect();
    ledger.append_all(records.clone());
    view.set_predicate(Some(Matcher::SubjectStartsWith("S.1".into())));
    ledger.remove_all(records.iter().step_by(4));
    view.set_predicate(Some(Matcher::SubjectEndsWith("7".into())));
    view.set_predicate(None);

    assert_eq!(*mirror.lock(), view.snapshot());
}

#[test]
fn test_connection_views_survive_connection_drop() {
    let ledger = Arc::new(RecordLedger::new());
    let registry = RecordTypeRegistry::new();
    let main = Connection::new("main");
    let z = Connection::new("z");
    main.start();
    z.start();

    let by_conn = FilteredLedgerView::new(ledger.clone(), registry, false);
    by_conn.set_predicate(Some(Matcher::ConnectionName("main".into())));
    let sorted = SortedLedgerView::new(ledger.clone(), SortOrder::ascending(SortKey::Connection));

    main.deliver(&ledger, Arc::new(FieldMessage::new("A.1")), None);
    z.deliver(&ledger, Arc::new(FieldMessage::new("A.2")), None);
    main.deliver(&ledger, Arc::new(FieldMessage::new("A.3")), None);
    drop(main);
    drop(z);

    let a = Connection::new("a");
    a.start();
    a.deliver(&ledger, Arc::new(FieldMessage::new("A.4")), None);

    // The predicate still agrees with what the view holds
    let matcher = Matcher::ConnectionName("main".into());
    let expected: Vec<Record> = ledger.snapshot().into_iter().filter(|r| matcher.matches(r)).collect();
    assert_eq!(by_conn.snapshot(), expected);
    assert_eq!(by_conn.len(), 2);

    let names: Vec<Option<String>> = sorted
        .snapshot()
        .iter()
        .map(|r| r.connection_name().map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec![Some("a".into()), Some("main".into()), Some("main".into()), Some("z".into())]
    );
}

// --- Context ---

#[test]
fn test_context_workflow() {
    let ctx = SnoopContext::new(SnoopConfig::default());
    let view = ctx.filtered_view(true);
    let handle = ctx.subscribe_ledger();

    let conn = Connection::new("prod");
    ctx.connections().add(conn.clone()).unwrap();
    conn.start();
    for s in ["APP.ERROR", "APP.INFO", "_RV.HOST"] {
        ctx.deliver(&conn, Arc::new(FieldMessage::new(s)));
    }
    assert_eq!(view.len(), 3);

    ctx.registry().get("Error").unwrap().set_selected(false);
    assert_eq!(view.len(), 2);

    let matcher = Matcher::ConnectionName("prod".into());
    assert_eq!(view.find_all_indices(&matcher), vec![0, 1]);

    let events: Vec<_> = handle.drain();
    assert_eq!(events.len(), 3);
    assert!(events
        .iter()
        .all(|e| matches!(e, SubscriptionEvent::Change(ChangeEvent::Inserted { .. }))));

    conn.stop();
    assert!(ctx.deliver(&conn, Arc::new(FieldMessage::new("LATE"))).is_none());
    assert_eq!(ctx.ledger().len(), 3);
}

#[test]
fn test_registry_export_import_roundtrip() {
    let source = RecordTypeRegistry::with_starter_types();
    let custom = source
        .create_type(
            Some("Orders"),
            Some(Colour::rgb(1, 2, 3)),
            Some(Matcher::create("subject_regex", "^ORD").unwrap()),
        )
        .unwrap();
    custom.set_selected(false);
    source.reorder_type(&custom, 0);

    let exported = source.export();
    let json = serde_json::to_string(&exported).unwrap();

    let target = RecordTypeRegistry::new();
    let report = target.import(serde_json::from_str::<Vec<RecordTypeDescriptor>>(&json).unwrap());
    assert_eq!(report.loaded, 4);
    assert!(report.skipped.is_empty());
    assert_eq!(target.export(), exported);
    assert!(!target.get("Orders").unwrap().is_selected());
}
