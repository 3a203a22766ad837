//! Known fields of each inventory object, following the SeisComP 0.12 schema.

use crate::validate::FieldKind;
use crate::NodeKind;

/// Where a field lives in the XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Attribute on the node element (`code="GE"`).
    Attribute,
    /// Leaf child element holding text (`<latitude>45.0</latitude>`).
    Element,
    /// Computed from other fields; `sampleRate` maps to numerator/denominator.
    Derived,
}

/// Whether and how a field may be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    /// Editable but cannot be cleared.
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub storage: Storage,
    pub access: Access,
    /// For references that must resolve to another object in the document.
    pub target: Option<NodeKind>,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind, storage: Storage, access: Access) -> Self {
        Self {
            name,
            kind,
            storage,
            access,
            target: None,
        }
    }

    const fn attr(name: &'static str, kind: FieldKind, access: Access) -> Self {
        Self::new(name, kind, Storage::Attribute, access)
    }

    const fn elem(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, Storage::Element, Access::Optional)
    }

    const fn binding(name: &'static str, target: NodeKind) -> Self {
        let mut spec = Self::attr(name, FieldKind::Reference, Access::Optional);
        spec.target = Some(target);
        spec
    }

    pub fn is_editable(&self) -> bool {
        self.access != Access::ReadOnly
    }
}

const PUBLIC_ID: FieldSpec = FieldSpec::attr("publicID", FieldKind::Reference, Access::ReadOnly);
const START: FieldSpec = FieldSpec::elem("start", FieldKind::Time);
const END: FieldSpec = FieldSpec::elem("end", FieldKind::Time);
const DESCRIPTION: FieldSpec = FieldSpec::elem("description", FieldKind::Description);
const RESTRICTED: FieldSpec = FieldSpec::elem("restricted", FieldKind::Boolean);
const SHARED: FieldSpec = FieldSpec::elem("shared", FieldKind::Boolean);
const REMARK: FieldSpec = FieldSpec::elem("remark", FieldKind::Text);
const LATITUDE: FieldSpec = FieldSpec::elem("latitude", FieldKind::Latitude);
const LONGITUDE: FieldSpec = FieldSpec::elem("longitude", FieldKind::Longitude);
const ELEVATION: FieldSpec = FieldSpec::elem("elevation", FieldKind::Elevation);

const NETWORK: &[FieldSpec] = &[
    PUBLIC_ID,
    FieldSpec::attr("code", FieldKind::NETWORK_CODE, Access::Required),
    START,
    END,
    DESCRIPTION,
    FieldSpec::elem("institutions", FieldKind::Text),
    FieldSpec::elem("region", FieldKind::Text),
    FieldSpec::elem("type", FieldKind::Text),
    FieldSpec::elem("netClass", FieldKind::Text),
    FieldSpec::elem("archive", FieldKind::Text),
    RESTRICTED,
    SHARED,
    REMARK,
];

const STATION: &[FieldSpec] = &[
    PUBLIC_ID,
    FieldSpec::attr("code", FieldKind::CODE, Access::Required),
    FieldSpec::attr("name", FieldKind::Name, Access::Optional),
    START,
    END,
    DESCRIPTION,
    LATITUDE,
    LONGITUDE,
    ELEVATION,
    FieldSpec::elem("place", FieldKind::Text),
    FieldSpec::elem("country", FieldKind::Text),
    FieldSpec::elem("affiliation", FieldKind::Text),
    FieldSpec::elem("type", FieldKind::Text),
    FieldSpec::elem("archive", FieldKind::Text),
    FieldSpec::elem("archiveNetworkCode", FieldKind::Text),
    RESTRICTED,
    SHARED,
    REMARK,
];

const SENSOR_LOCATION: &[FieldSpec] = &[
    PUBLIC_ID,
    FieldSpec::attr("code", FieldKind::LocationCode, Access::Required),
    START,
    END,
    LATITUDE,
    LONGITUDE,
    ELEVATION,
];

const STREAM: &[FieldSpec] = &[
    FieldSpec::attr("code", FieldKind::CODE, Access::Required),
    FieldSpec::binding("datalogger", NodeKind::Datalogger),
    FieldSpec::binding("sensor", NodeKind::Sensor),
    START,
    END,
    FieldSpec::elem("dataloggerSerialNumber", FieldKind::Text),
    FieldSpec::elem("dataloggerChannel", FieldKind::Count),
    FieldSpec::elem("sensorSerialNumber", FieldKind::Text),
    FieldSpec::elem("sensorChannel", FieldKind::Count),
    FieldSpec::elem("clockSerialNumber", FieldKind::Text),
    // Written through `sampleRate` so the pair stays consistent.
    FieldSpec::new(
        "sampleRateNumerator",
        FieldKind::Count,
        Storage::Element,
        Access::ReadOnly,
    ),
    FieldSpec::new(
        "sampleRateDenominator",
        FieldKind::Count,
        Storage::Element,
        Access::ReadOnly,
    ),
    FieldSpec::new(
        SAMPLE_RATE,
        FieldKind::SampleRate,
        Storage::Derived,
        Access::Optional,
    ),
    FieldSpec::elem("depth", FieldKind::Depth),
    FieldSpec::elem("azimuth", FieldKind::Azimuth),
    FieldSpec::elem("dip", FieldKind::Dip),
    FieldSpec::elem("gain", FieldKind::Gain),
    FieldSpec::elem("gainFrequency", FieldKind::Frequency),
    FieldSpec::elem("gainUnit", FieldKind::Text),
    FieldSpec::elem("format", FieldKind::Text),
    FieldSpec::elem("flags", FieldKind::Text),
    RESTRICTED,
    SHARED,
];

const SENSOR: &[FieldSpec] = &[
    PUBLIC_ID,
    FieldSpec::attr("name", FieldKind::Name, Access::Required),
    FieldSpec::attr("response", FieldKind::Reference, Access::Optional),
    DESCRIPTION,
    FieldSpec::elem("type", FieldKind::Text),
    FieldSpec::elem("model", FieldKind::Text),
    FieldSpec::elem("manufacturer", FieldKind::Text),
    FieldSpec::elem("serialNumber", FieldKind::Text),
    FieldSpec::elem("unit", FieldKind::Text),
    FieldSpec::elem("lowFrequency", FieldKind::Frequency),
    FieldSpec::elem("highFrequency", FieldKind::Frequency),
    REMARK,
];

const DATALOGGER: &[FieldSpec] = &[
    PUBLIC_ID,
    FieldSpec::attr("name", FieldKind::Name, Access::Required),
    DESCRIPTION,
    FieldSpec::elem("type", FieldKind::Text),
    FieldSpec::elem("model", FieldKind::Text),
    FieldSpec::elem("manufacturer", FieldKind::Text),
    FieldSpec::elem("serialNumber", FieldKind::Text),
    FieldSpec::elem("digitizerModel", FieldKind::Text),
    FieldSpec::elem("digitizerManufacturer", FieldKind::Text),
    FieldSpec::elem("recorderModel", FieldKind::Text),
    FieldSpec::elem("recorderManufacturer", FieldKind::Text),
    FieldSpec::elem("clockModel", FieldKind::Text),
    FieldSpec::elem("clockManufacturer", FieldKind::Text),
    FieldSpec::elem("clockType", FieldKind::Text),
    FieldSpec::elem("gain", FieldKind::Gain),
    FieldSpec::elem("maxClockDrift", FieldKind::NonNegative),
    REMARK,
];

/// Name of the derived stream field.
pub const SAMPLE_RATE: &str = "sampleRate";
pub const SAMPLE_RATE_NUMERATOR: &str = "sampleRateNumerator";
pub const SAMPLE_RATE_DENOMINATOR: &str = "sampleRateDenominator";

/// All fields declared for `kind`, in schema order.
pub fn fields_of(kind: NodeKind) -> &'static [FieldSpec] {
    match kind {
        NodeKind::Inventory => &[],
        NodeKind::Network => NETWORK,
        NodeKind::Station => STATION,
        NodeKind::SensorLocation => SENSOR_LOCATION,
        NodeKind::Stream => STREAM,
        NodeKind::Sensor => SENSOR,
        NodeKind::Datalogger => DATALOGGER,
    }
}

pub fn lookup(kind: NodeKind, name: &str) -> Option<&'static FieldSpec> {
    fields_of(kind).iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_names_are_unique_per_kind() {
        for kind in NodeKind::ALL {
            let mut seen = HashSet::new();
            for spec in fields_of(kind) {
                assert!(seen.insert(spec.name), "{kind:?} repeats {}", spec.name);
            }
        }
    }

    #[test]
    fn stream_bindings_target_equipment() {
        let sensor = lookup(NodeKind::Stream, "sensor").expect("sensor binding");
        assert_eq!(sensor.target, Some(NodeKind::Sensor));
        let datalogger = lookup(NodeKind::Stream, "datalogger").expect("datalogger binding");
        assert_eq!(datalogger.target, Some(NodeKind::Datalogger));
        assert_eq!(lookup(NodeKind::Sensor, "response").and_then(|s| s.target), None);
    }

    #[test]
    fn codes_use_per_level_limits() {
        let network = lookup(NodeKind::Network, "code").expect("network code");
        assert_eq!(network.kind, FieldKind::NETWORK_CODE);
        assert_eq!(network.access, Access::Required);
        let location = lookup(NodeKind::SensorLocation, "code").expect("location code");
        assert_eq!(location.kind, FieldKind::LocationCode);
        assert!(!lookup(NodeKind::Station, "publicID").expect("id").is_editable());
        assert_eq!(
            lookup(NodeKind::Stream, SAMPLE_RATE).map(|s| s.storage),
            Some(Storage::Derived)
        );
    }
}
