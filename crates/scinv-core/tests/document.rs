use scinv_core::{
    Access, FieldKind, InventoryDocument, InventoryError, NodeKind, ParseError, Rule, Storage,
};
use scinv_xml::structurally_equal;

const FIXTURE: &str = include_str!("data/ge_ape.xml");

const STATION: &str = "network=GE/station=APE";
const BHZ: &str = "network=GE/station=APE/sensorLocation=/stream=BHZ";

fn load() -> InventoryDocument {
    InventoryDocument::parse(FIXTURE).expect("parse fixture")
}

#[test]
fn unedited_document_is_written_back_unchanged() {
    let doc = load();
    assert_eq!(doc.serialize(), FIXTURE);
    assert!(!doc.is_dirty());
    assert_eq!(doc.revision(), 0);
}

#[test]
fn tree_follows_source_order() {
    let doc = load();
    let labels: Vec<String> = doc
        .children(doc.root())
        .expect("children")
        .into_iter()
        .map(|id| doc.label(id).expect("label"))
        .collect();
    assert_eq!(labels, ["Sensor: STS-2", "Datalogger: Q330", "Network: GE"]);

    let location = doc.find("network=GE/station=APE/sensorLocation=").expect("location");
    let streams: Vec<String> = doc
        .children(location)
        .expect("children")
        .into_iter()
        .map(|id| doc.key(id).expect("key"))
        .collect();
    assert_eq!(streams, ["BHZ", "BHN"]);
    assert!(doc.children(doc.find(BHZ).expect("stream")).expect("children").is_empty());
}

#[test]
fn fields_report_attributes_elements_and_extras() {
    let doc = load();
    let station = doc.find(STATION).expect("station");
    let fields = doc.fields(station).expect("fields");

    let code = fields.iter().find(|f| f.name == "code").expect("code");
    assert_eq!(code.value, "APE");
    assert_eq!(code.storage, Storage::Attribute);
    assert_eq!(code.access, Access::Required);

    let latitude = fields.iter().find(|f| f.name == "latitude").expect("latitude");
    assert_eq!(latitude.value, "37.0689");
    assert_eq!(latitude.kind, FieldKind::Latitude);
    assert_eq!(latitude.storage, Storage::Element);

    let extra = fields
        .iter()
        .find(|f| f.name == "archiveNetworkCode")
        .expect("extra attribute");
    assert!(!extra.known);
    assert_eq!(extra.kind, FieldKind::Text);

    assert!(fields.iter().all(|f| f.name != "sensorLocation"));
}

#[test]
fn coordinate_edits_are_validated() {
    let mut doc = load();
    let station = doc.find(STATION).expect("station");

    let err = doc
        .set_attribute(station, "latitude", "91.0")
        .expect_err("out of range");
    let validation = err.validation().expect("validation error");
    assert!(matches!(validation.rule, Rule::OutOfRange { .. }));
    assert_eq!(doc.serialize(), FIXTURE);
    assert!(!doc.is_dirty());

    let edit = doc.set_attribute(station, "latitude", "45.0").expect("in range");
    assert_eq!(edit.old.as_deref(), Some("37.0689"));
    assert!(doc.is_dirty());
    assert!(doc
        .serialize()
        .contains("        <latitude>45.0</latitude>\n"));
}

#[test]
fn sample_rate_edits_write_numerator_and_denominator() {
    let mut doc = load();
    let stream = doc.find(BHZ).expect("stream");

    let err = doc
        .set_attribute(stream, "sampleRate", "0")
        .expect_err("zero rate");
    assert_eq!(err.validation().map(|v| &v.rule), Some(&Rule::NotPositive));

    doc.set_attribute(stream, "sampleRate", "100").expect("set rate");
    assert_eq!(doc.get(stream, "sampleRate").expect("get").as_deref(), Some("100"));
    assert_eq!(
        doc.get(stream, "sampleRateNumerator").expect("get").as_deref(),
        Some("100")
    );
    assert_eq!(
        doc.get(stream, "sampleRateDenominator").expect("get").as_deref(),
        Some("1")
    );

    let err = doc
        .set_attribute(stream, "sampleRateNumerator", "5")
        .expect_err("numerator is written through sampleRate");
    assert!(matches!(err, InventoryError::ReadOnly { .. }));
}

#[test]
fn unchanged_values_do_not_mark_dirty() {
    let mut doc = load();
    let station = doc.find(STATION).expect("station");
    let edit = doc.set_attribute(station, "code", " APE ").expect("same code");
    assert!(!edit.is_change());
    assert!(!doc.is_dirty());
    assert_eq!(doc.revision(), 0);
}

#[test]
fn saving_an_older_revision_keeps_newer_edits_dirty() {
    let mut doc = load();
    let stream = doc.find(BHZ).expect("stream");
    doc.set_attribute(stream, "azimuth", "10").expect("first");
    let snapshot = doc.revision();
    doc.set_attribute(stream, "azimuth", "20").expect("second");

    doc.mark_saved(snapshot);
    assert!(doc.is_dirty());
    doc.mark_saved(doc.revision());
    assert!(!doc.is_dirty());
}

#[test]
fn required_and_read_only_fields_are_protected() {
    let mut doc = load();
    let network = doc.find("network=GE").expect("network");
    assert!(matches!(
        doc.clear_attribute(network, "code"),
        Err(InventoryError::Required { .. })
    ));
    assert!(matches!(
        doc.set_attribute(network, "publicID", "Network/XX"),
        Err(InventoryError::ReadOnly { .. })
    ));
    assert!(matches!(
        doc.set_attribute(network, "colour", "blue"),
        Err(InventoryError::UnknownField { .. })
    ));
    let err = doc
        .set_attribute(network, "code", "TOOLONGNET")
        .expect_err("network codes are limited to 8 characters");
    assert!(matches!(
        err.validation().map(|v| &v.rule),
        Some(Rule::TooLong { max: 8, .. })
    ));
}

#[test]
fn clearing_and_recreating_an_element_field() {
    let mut doc = load();
    let stream = doc.find(BHZ).expect("stream");
    doc.clear_attribute(stream, "gainUnit").expect("clear");
    assert_eq!(doc.get(stream, "gainUnit").expect("get"), None);
    assert!(!doc.serialize().contains("<gainUnit>"));

    doc.set_attribute(stream, "gainUnit", "M/S").expect("recreate");
    let reparsed = InventoryDocument::parse(&doc.serialize()).expect("reparse");
    let stream = reparsed.find(BHZ).expect("stream");
    assert_eq!(reparsed.get(stream, "gainUnit").expect("get").as_deref(), Some("M/S"));
    assert_eq!(doc.revision(), 2);
}

#[test]
fn extra_fields_are_editable_text() {
    let mut doc = load();
    let station = doc.find(STATION).expect("station");
    doc.set_attribute(station, "archiveNetworkCode", "GX")
        .expect("extra attribute");
    assert!(doc
        .serialize()
        .contains(r#"<station publicID="Station/GE/APE" code="APE" archiveNetworkCode="GX">"#));
}

#[test]
fn stale_edits_conflict() {
    let mut doc = load();
    let stream = doc.find(BHZ).expect("stream");
    let first = doc.prepare_edit(stream, "dip", "-45").expect("first");
    let second = doc.prepare_edit(stream, "dip", "-30").expect("second");
    assert!(doc.apply_edit(&first).expect("apply first"));
    match doc.apply_edit(&second) {
        Err(InventoryError::Conflict {
            expected, found, ..
        }) => {
            assert_eq!(expected.as_deref(), Some("-90"));
            assert_eq!(found.as_deref(), Some("-45"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn handles_from_a_previous_load_are_stale() {
    let first = load();
    let second = load();
    let station = first.find(STATION).expect("station");
    assert_ne!(first.generation(), second.generation());
    assert!(matches!(
        second.fields(station),
        Err(InventoryError::StaleNode(_))
    ));
}

#[test]
fn stream_bindings_must_resolve() {
    let mut doc = load();
    let stream = doc.find(BHZ).expect("stream");
    assert!(doc.unresolved_bindings().is_empty());

    let sensor = doc
        .binding(stream, NodeKind::Sensor)
        .expect("binding")
        .expect("resolved");
    assert_eq!(doc.label(sensor).expect("label"), "Sensor: STS-2");

    let err = doc
        .set_attribute(stream, "sensor", "Datalogger/20100101000000.000000.2")
        .expect_err("a datalogger is not a sensor");
    assert!(matches!(
        err,
        InventoryError::UnresolvedReference {
            target: NodeKind::Sensor,
            ..
        }
    ));
}

#[test]
fn structure_violations_are_rejected() {
    let misplaced = r#"<seiscomp><Inventory><station code="X"/></Inventory></seiscomp>"#;
    assert!(matches!(
        InventoryDocument::parse(misplaced),
        Err(ParseError::Misplaced { element, parent }) if element == "station" && parent == "Inventory"
    ));

    let stream_in_station =
        r#"<seiscomp><Inventory><network code="GE"><station code="A"><stream code="B"/></station></network></Inventory></seiscomp>"#;
    assert!(matches!(
        InventoryDocument::parse(stream_in_station),
        Err(ParseError::Misplaced { .. })
    ));

    assert!(matches!(
        InventoryDocument::parse("<quakeml/>"),
        Err(ParseError::NotSeiscomp(name)) if name == "quakeml"
    ));
    assert!(matches!(
        InventoryDocument::parse("<seiscomp><EventParameters/></seiscomp>"),
        Err(ParseError::MissingInventory)
    ));
    assert!(matches!(
        InventoryDocument::parse("<seiscomp><Inventory>"),
        Err(ParseError::Xml(_))
    ));
}

#[test]
fn unknown_namespaces_still_load() {
    let doc = InventoryDocument::parse(
        r#"<seiscomp xmlns="urn:example"><Inventory><network code="XX"/></Inventory></seiscomp>"#,
    )
    .expect("parse");
    assert_eq!(doc.schema_version(), None);
    assert_eq!(doc.nodes_of_kind(NodeKind::Network).len(), 1);
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("inventory.xml");
    std::fs::write(&path, FIXTURE).expect("write fixture");
    let doc = InventoryDocument::load(&path).expect("load");
    assert_eq!(doc.node_count(), 8);

    let missing = InventoryDocument::load(dir.path().join("absent.xml"));
    assert!(matches!(missing, Err(InventoryError::Io { .. })));
}

#[test]
fn edited_document_stays_structurally_equal_elsewhere() {
    let original = load();
    let mut edited = load();
    let station = edited.find(STATION).expect("station");
    edited.set_attribute(station, "elevation", "621").expect("set");
    edited.set_attribute(station, "elevation", "620").expect("restore");
    assert!(structurally_equal(original.xml().root(), edited.xml().root()));
    assert!(edited.is_dirty());
}

const EPOCHS: &str = include_str!("data/ge_ape_epochs.xml");

#[test]
fn epochs_sharing_a_code_get_distinct_paths() {
    let doc = InventoryDocument::parse(EPOCHS).expect("parse epochs");
    let streams = doc.nodes_of_kind(NodeKind::Stream);
    let paths: Vec<String> = streams.iter().map(|&id| doc.path(id).expect("path")).collect();
    let location = "network=GE/station=APE@2015-01-01T00:00:00.0000Z/sensorLocation=";
    assert_eq!(
        paths,
        [
            format!("{location}/stream=BHZ@2015-01-01T00:00:00.0000Z"),
            format!("{location}/stream=BHZ@2019-03-01T00:00:00.0000Z"),
            format!("{location}/stream=HHZ[1]"),
            format!("{location}/stream=HHZ[2]"),
        ]
    );

    for (&stream, path) in streams.iter().zip(&paths) {
        assert_eq!(doc.find(path).expect("find"), stream, "{path}");
    }
    assert_eq!(
        doc.get(doc.find(&paths[1]).expect("find"), "gain")
            .expect("get")
            .as_deref(),
        Some("2")
    );
    assert_eq!(
        doc.label(streams[1]).expect("label"),
        "Stream: BHZ@2019-03-01T00:00:00.0000Z"
    );
}

#[test]
fn paths_without_epochs_must_name_one_node() {
    let doc = InventoryDocument::parse(EPOCHS).expect("parse epochs");
    match doc.find("network=GE/station=APE") {
        Err(InventoryError::Ambiguous { candidates, .. }) => assert_eq!(
            candidates,
            [
                "network=GE/station=APE@2004-06-18T00:00:00.0000Z",
                "network=GE/station=APE@2015-01-01T00:00:00.0000Z",
            ]
        ),
        other => panic!("expected an ambiguous path, got {other:?}"),
    }
    assert!(matches!(
        doc.find("network=GE/station=APE/sensorLocation=/stream=BHZ"),
        Err(InventoryError::Ambiguous { .. })
    ));
    // Only the later station has locations, so this one is still unique.
    let location = doc
        .find("network=GE/station=APE/sensorLocation=")
        .expect("location");
    assert_eq!(doc.kind(location).expect("kind"), NodeKind::SensorLocation);
}

#[test]
fn editing_one_epoch_leaves_its_twin_alone() {
    let mut doc = InventoryDocument::parse(EPOCHS).expect("parse epochs");
    let location = "network=GE/station=APE@2015-01-01T00:00:00.0000Z/sensorLocation=";
    let later = doc
        .find(&format!("{location}/stream=BHZ@2019-03-01T00:00:00.0000Z"))
        .expect("later epoch");
    doc.set_attribute(later, "gain", "5").expect("set");
    let out = doc.serialize();
    assert!(out.contains("<gain>1</gain>"));
    assert!(out.contains("<gain>5</gain>"));
    assert!(!out.contains("<gain>2</gain>"));

    let reloaded = InventoryDocument::parse(&out).expect("reparse");
    for node in doc.walk() {
        let path = doc.path(node).expect("path");
        let twin = reloaded.find(&path).expect("same node after reload");
        assert_eq!(doc.fields(node).expect("fields"), reloaded.fields(twin).expect("fields"));
    }
}

#[test]
fn comments_inside_a_field_are_kept_and_never_duplicated() {
    let mut doc = InventoryDocument::parse(EPOCHS).expect("parse epochs");
    let station = doc
        .find("network=GE/station=APE@2015-01-01T00:00:00.0000Z")
        .expect("station");
    assert_eq!(
        doc.get(station, "latitude").expect("get").as_deref(),
        Some("37.07")
    );
    doc.set_attribute(station, "latitude", "38").expect("set");
    let out = doc.serialize();
    assert!(out.contains("<latitude>38<!-- surveyed 2015 --></latitude>"));
    assert_eq!(out.matches("<latitude>").count(), 2, "one per station");
}

#[test]
fn fields_with_nested_markup_are_refused() {
    let xml = FIXTURE.replace(
        "<latitude>37.0689</latitude>",
        "<latitude unit=\"deg\">37.0689</latitude>",
    );
    let mut doc = InventoryDocument::parse(&xml).expect("parse");
    let station = doc.find(STATION).expect("station");
    assert!(matches!(
        doc.set_attribute(station, "latitude", "38"),
        Err(InventoryError::NestedField { .. })
    ));
    assert!(matches!(
        doc.clear_attribute(station, "latitude"),
        Err(InventoryError::NestedField { .. })
    ));
    assert_eq!(doc.serialize(), xml);
    assert!(!doc.is_dirty());
}
