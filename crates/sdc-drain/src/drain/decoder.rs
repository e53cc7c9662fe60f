//! Record decoder
//!
//! Turns one staged reading into a typed destination record. Each sensor kind
//! has a fixed layout of XML-ish tags inside the payload; some tags are
//! optional and fall back to a documented default. Decoding has no side
//! effects, so a row can be decoded again on the next cycle with the same
//! result.

use regex::{Captures, Regex};
use sdc_common::{KindTag, RawReading, SensorKind};
use std::sync::LazyLock;

use super::error::{DecodeFailure, DecodeReason};
use super::types::{Decimal, Decoded, DecodedRecord, Measurement, RecordMeta};

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sensor layout pattern is valid")
}

static GPS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"<accuracy>(?P<accuracy>.*)</accuracy><alt>(?P<alt>.*)</alt><lat>(?P<lat>.*)</lat><lon>(?P<lon>.*)</lon>(?:<speed>(?P<speed>.*)</speed>)?",
    )
});

static GSM: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?:<operator>(?P<operator>.*)</operator>)?<neighbors class=\\?'java.util.Vector\\?'>(?P<neighbors>.*)</neighbors><lac>(?P<lac>.*)</lac><cid>(?P<cid>.*)</cid><rssi>(?P<rssi>.*)</rssi>",
    )
});

static MAGNETIC_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"<fieldX>(?P<x>.+\..+)</fieldX><fieldY>(?P<y>.+\..+)</fieldY><fieldZ>(?P<z>.+\..+)</fieldZ>")
});

static ACCELEROMETER: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"<accX>(?P<x>.+\..+)</accX><accY>(?P<y>.+\..+)</accY><accZ>(?P<z>.+\..+)</accZ>")
});

static WIFI: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"<bssid>(?P<bssid>.*)</bssid>(?:<ssid>(?P<ssid>.*)</ssid>)?(?:<cap>(?P<cap>.*)</cap>)?<connected>(?P<connected>.*)</connected><freq>(?P<freq>.*)</freq><sigLevel>(?P<sig>.*)</sigLevel>",
    )
});

static TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"<txt>(?P<txt>.*)</txt>"));

static NETWORK_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"<accuracy>(?P<accuracy>.*)</accuracy><lat>(?P<lat>.*)</lat><lon>(?P<lon>.*)</lon>")
});

// "adress" is what the devices send.
static BLUETOOTH: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"<adress>(?P<address>.*)</adress><class>(?P<class>.*)</class>(?:<name>(?P<name>.*)</name>)?<rssi>(?P<rssi>.*)</rssi>",
    )
});

static GYROSCOPE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"<angSpeedX>(?P<x>.+\..+)</angSpeedX><angSpeedY>(?P<y>.+\..+)</angSpeedY><angSpeedZ>(?P<z>.+\..+)</angSpeedZ>",
    )
});

fn layout(kind: SensorKind) -> &'static Regex {
    match kind {
        SensorKind::Gps => &GPS,
        SensorKind::Gsm => &GSM,
        SensorKind::MagneticField => &MAGNETIC_FIELD,
        SensorKind::Accelerometer => &ACCELEROMETER,
        SensorKind::Wifi => &WIFI,
        SensorKind::Tag => &TAG,
        SensorKind::NetworkLocation => &NETWORK_LOCATION,
        SensorKind::Bluetooth => &BLUETOOTH,
        SensorKind::Gyroscope => &GYROSCOPE,
    }
}

/// Captured tags of one payload
struct Fields<'t>(Captures<'t>);

impl<'t> Fields<'t> {
    fn text(&self, name: &'static str) -> Result<String, DecodeReason> {
        self.0
            .name(name)
            .map(|m| m.as_str().to_string())
            .ok_or(DecodeReason::MissingField(name))
    }

    fn text_or_empty(&self, name: &'static str) -> String {
        self.0.name(name).map(|m| m.as_str().to_string()).unwrap_or_default()
    }

    fn decimal(&self, name: &'static str) -> Result<Decimal, DecodeReason> {
        let value = self.0.name(name).ok_or(DecodeReason::MissingField(name))?.as_str();
        Decimal::parse(value).ok_or_else(|| DecodeReason::NotDecimal {
            field: name,
            value: value.to_string(),
        })
    }

    fn decimal_or_zero(&self, name: &'static str) -> Result<Decimal, DecodeReason> {
        match self.0.name(name) {
            Some(_) => self.decimal(name),
            None => Ok(Decimal::zero()),
        }
    }

    /// Only the exact text `true` counts as set
    fn flag(&self, name: &'static str) -> Result<bool, DecodeReason> {
        Ok(self.text(name)? == "true")
    }
}

fn extract(kind: SensorKind, payload: &str) -> Result<Measurement, DecodeReason> {
    let fields = layout(kind)
        .captures(payload)
        .map(Fields)
        .ok_or(DecodeReason::PatternMismatch(kind))?;

    let measurement = match kind {
        SensorKind::Gps => Measurement::Gps {
            accuracy: fields.decimal("accuracy")?,
            altitude: fields.decimal("alt")?,
            latitude: fields.decimal("lat")?,
            longitude: fields.decimal("lon")?,
            speed: fields.decimal_or_zero("speed")?,
        },
        SensorKind::Gsm => Measurement::Gsm {
            operator: fields.text_or_empty("operator"),
            neighbors: fields.text("neighbors")?,
            lac: fields.decimal("lac")?,
            cid: fields.decimal("cid")?,
            rssi: fields.decimal("rssi")?,
        },
        SensorKind::MagneticField => Measurement::MagneticField {
            x: fields.decimal("x")?,
            y: fields.decimal("y")?,
            z: fields.decimal("z")?,
        },
        SensorKind::Accelerometer => Measurement::Accelerometer {
            x: fields.decimal("x")?,
            y: fields.decimal("y")?,
            z: fields.decimal("z")?,
        },
        SensorKind::Wifi => Measurement::Wifi {
            bssid: fields.text("bssid")?,
            ssid: fields.text_or_empty("ssid"),
            cap: fields.text_or_empty("cap"),
            connected: fields.flag("connected")?,
            frequency: fields.decimal("freq")?,
            signal_level: fields.decimal("sig")?,
        },
        SensorKind::Tag => Measurement::Tag {
            text: fields.text("txt")?,
        },
        SensorKind::NetworkLocation => Measurement::NetworkLocation {
            accuracy: fields.decimal("accuracy")?,
            latitude: fields.decimal("lat")?,
            longitude: fields.decimal("lon")?,
        },
        SensorKind::Bluetooth => Measurement::Bluetooth {
            address: fields.text("address")?,
            class: fields.text("class")?,
            name: fields.text_or_empty("name"),
            rssi: fields.decimal("rssi")?,
        },
        SensorKind::Gyroscope => Measurement::Gyroscope {
            x: fields.decimal("x")?,
            y: fields.decimal("y")?,
            z: fields.decimal("z")?,
        },
    };

    Ok(measurement)
}

/// Decode one staged reading.
///
/// Returns [`Decoded::Ignored`] for the time-sync tag and a [`DecodeFailure`]
/// for unknown tags or payloads that do not fit their kind's layout.
pub fn decode(raw: &RawReading) -> Result<Decoded, DecodeFailure> {
    let kind = match raw.sensor_kind.parse::<KindTag>() {
        Ok(KindTag::Sensor(kind)) => kind,
        Ok(KindTag::Ignored) => return Ok(Decoded::Ignored),
        Err(_) => return Err(DecodeFailure::new(raw, DecodeReason::UnknownKind)),
    };

    let measurement = extract(kind, &raw.payload).map_err(|reason| DecodeFailure::new(raw, reason))?;

    Ok(Decoded::Record(DecodedRecord {
        meta: RecordMeta::from(raw),
        measurement,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sdc_common::types::IGNORED_TAG;

    fn reading(kind: &str, payload: &str) -> RawReading {
        RawReading {
            device_id: 7,
            timestamp: 1_394_000_000_000,
            sensor_kind: kind.to_string(),
            payload: payload.to_string(),
            priority: 2,
            synced: true,
            data_class: 3,
        }
    }

    fn measurement(kind: &str, payload: &str) -> Measurement {
        match decode(&reading(kind, payload)).expect("payload should decode") {
            Decoded::Record(record) => record.measurement,
            Decoded::Ignored => panic!("{kind} should not be ignored"),
        }
    }

    fn dec(text: &str) -> Decimal {
        Decimal::parse(text).unwrap()
    }

    fn reason(kind: &str, payload: &str) -> DecodeReason {
        decode(&reading(kind, payload)).unwrap_err().reason
    }

    #[test]
    fn test_gps_with_speed() {
        let m = measurement(
            "GPS",
            "<accuracy>12.0</accuracy><alt>101.5</alt><lat>50.3569</lat><lon>7.5890</lon><speed>1.25</speed>",
        );
        assert_eq!(
            m,
            Measurement::Gps {
                accuracy: dec("12.0"),
                altitude: dec("101.5"),
                latitude: dec("50.3569"),
                longitude: dec("7.5890"),
                speed: dec("1.25"),
            }
        );
    }

    #[test]
    fn test_gps_without_speed_defaults_to_zero() {
        let m = measurement(
            "GPS",
            "<accuracy>12.0</accuracy><alt>101.5</alt><lat>50.3569</lat><lon>7.5890</lon>",
        );
        match m {
            Measurement::Gps { speed, longitude, .. } => {
                assert_eq!(speed, dec("0"));
                assert_eq!(longitude, dec("7.5890"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gsm_with_escaped_quotes_and_operator() {
        let m = measurement(
            "GSM",
            r"<operator>T-Mobile</operator><neighbors class=\'java.util.Vector\'>[]</neighbors><lac>4711</lac><cid>815</cid><rssi>-73</rssi>",
        );
        assert_eq!(
            m,
            Measurement::Gsm {
                operator: "T-Mobile".to_string(),
                neighbors: "[]".to_string(),
                lac: dec("4711"),
                cid: dec("815"),
                rssi: dec("-73"),
            }
        );
    }

    #[test]
    fn test_gsm_without_operator_defaults_to_empty() {
        let m = measurement(
            "GSM",
            "<neighbors class='java.util.Vector'>[1, 2]</neighbors><lac>1</lac><cid>2</cid><rssi>3</rssi>",
        );
        match m {
            Measurement::Gsm { operator, neighbors, .. } => {
                assert_eq!(operator, "");
                assert_eq!(neighbors, "[1, 2]");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_magnetic_field() {
        let m = measurement(
            "MagneticField",
            "<fieldX>-21.5</fieldX><fieldY>3.0625</fieldY><fieldZ>-40.25</fieldZ>",
        );
        assert_eq!(
            m,
            Measurement::MagneticField {
                x: dec("-21.5"),
                y: dec("3.0625"),
                z: dec("-40.25"),
            }
        );
    }

    #[test]
    fn test_axis_values_must_contain_a_dot() {
        let r = reason("MagneticField", "<fieldX>1</fieldX><fieldY>2.0</fieldY><fieldZ>3.0</fieldZ>");
        assert_eq!(r, DecodeReason::PatternMismatch(SensorKind::MagneticField));
    }

    #[test]
    fn test_accelerometer() {
        let m = measurement("Accelerometer", "<accX>0.11</accX><accY>9.81</accY><accZ>-0.3</accZ>");
        assert_eq!(
            m,
            Measurement::Accelerometer {
                x: dec("0.11"),
                y: dec("9.81"),
                z: dec("-0.3"),
            }
        );
    }

    #[test]
    fn test_wifi_full() {
        let m = measurement(
            "Wifi",
            "<bssid>00:11:22:33:44:55</bssid><ssid>uni-koblenz</ssid><cap>[WPA2-PSK-CCMP]</cap><connected>true</connected><freq>2412</freq><sigLevel>-61</sigLevel>",
        );
        assert_eq!(
            m,
            Measurement::Wifi {
                bssid: "00:11:22:33:44:55".to_string(),
                ssid: "uni-koblenz".to_string(),
                cap: "[WPA2-PSK-CCMP]".to_string(),
                connected: true,
                frequency: dec("2412"),
                signal_level: dec("-61"),
            }
        );
    }

    #[test]
    fn test_wifi_without_optional_tags() {
        let m = measurement(
            "Wifi",
            "<bssid>aa:bb</bssid><connected>TRUE</connected><freq>5180</freq><sigLevel>-80</sigLevel>",
        );
        match m {
            Measurement::Wifi { ssid, cap, connected, .. } => {
                assert_eq!(ssid, "");
                assert_eq!(cap, "");
                // Only the exact literal "true" sets the flag
                assert!(!connected);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tag() {
        let m = measurement("Tags", "<txt>bus stop reached</txt>");
        assert_eq!(
            m,
            Measurement::Tag {
                text: "bus stop reached".to_string()
            }
        );
    }

    #[test]
    fn test_network_location() {
        let m = measurement(
            "NetworkLocation",
            "<accuracy>1500.0</accuracy><lat>60.1699</lat><lon>24.9384</lon>",
        );
        assert_eq!(
            m,
            Measurement::NetworkLocation {
                accuracy: dec("1500.0"),
                latitude: dec("60.1699"),
                longitude: dec("24.9384"),
            }
        );
    }

    #[test]
    fn test_bluetooth_with_and_without_name() {
        let named = measurement(
            "Bluetooth",
            "<adress>00:1A:7D:DA:71:13</adress><class>AUDIO_VIDEO</class><name>Headset</name><rssi>-55</rssi>",
        );
        assert_eq!(
            named,
            Measurement::Bluetooth {
                address: "00:1A:7D:DA:71:13".to_string(),
                class: "AUDIO_VIDEO".to_string(),
                name: "Headset".to_string(),
                rssi: dec("-55"),
            }
        );

        let unnamed = measurement(
            "Bluetooth",
            "<adress>00:1A:7D:DA:71:13</adress><class>PHONE</class><rssi>-55</rssi>",
        );
        match unnamed {
            Measurement::Bluetooth { name, .. } => assert_eq!(name, ""),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bluetooth_class_is_text() {
        let raw = reading(
            "Bluetooth",
            "<adress>00:1A:7D:DA:71:13</adress><class>PHONE</class><name>Nokia</name><rssi>-55</rssi>",
        );
        match decode(&raw).unwrap() {
            Decoded::Record(record) => assert_eq!(
                record.measurement,
                Measurement::Bluetooth {
                    address: "00:1A:7D:DA:71:13".to_string(),
                    class: "PHONE".to_string(),
                    name: "Nokia".to_string(),
                    rssi: dec("-55"),
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gyroscope() {
        let m = measurement(
            "Gyroscope",
            "<angSpeedX>0.01</angSpeedX><angSpeedY>-0.02</angSpeedY><angSpeedZ>0.5</angSpeedZ>",
        );
        assert_eq!(
            m,
            Measurement::Gyroscope {
                x: dec("0.01"),
                y: dec("-0.02"),
                z: dec("0.5"),
            }
        );
    }

    #[test]
    fn test_metadata_is_copied() {
        let raw = reading("Tags", "<txt>x</txt>");
        let Decoded::Record(record) = decode(&raw).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.kind(), SensorKind::Tag);
        assert_eq!(record.meta.device_id, 7);
        assert_eq!(record.meta.timestamp, 1_394_000_000_000);
        assert_eq!(record.meta.priority, 2);
        assert!(record.meta.synced);
        assert_eq!(record.meta.data_class, 3);
    }

    #[test]
    fn test_time_sync_rows_are_ignored() {
        assert_eq!(decode(&reading(IGNORED_TAG, "anything")).unwrap(), Decoded::Ignored);
    }

    #[test]
    fn test_unknown_kind_fails() {
        let failure = decode(&reading("Barometer", "<p>1013</p>")).unwrap_err();
        assert_eq!(failure.kind, "Barometer");
        assert_eq!(failure.reason, DecodeReason::UnknownKind);
    }

    #[test]
    fn test_malformed_payload_fails_with_snapshot() {
        let raw = reading("GPS", "<accuracy>12.0</accuracy><lat>50.0</lat>");
        let failure = decode(&raw).unwrap_err();
        assert_eq!(failure.reason, DecodeReason::PatternMismatch(SensorKind::Gps));
        assert_eq!(*failure.raw_snapshot, raw);
    }

    #[test]
    fn test_payload_of_another_kind_fails() {
        let r = reason("Wifi", "<txt>hello</txt>");
        assert_eq!(r, DecodeReason::PatternMismatch(SensorKind::Wifi));
    }

    #[test]
    fn test_non_numeric_capture_fails() {
        let r = reason(
            "GPS",
            "<accuracy>n/a</accuracy><alt>1.0</alt><lat>2.0</lat><lon>3.0</lon>",
        );
        assert_eq!(
            r,
            DecodeReason::NotDecimal {
                field: "accuracy",
                value: "n/a".to_string()
            }
        );
    }

    #[test]
    fn test_decode_is_repeatable() {
        let raw = reading("Tags", "<txt>again</txt>");
        assert_eq!(decode(&raw).unwrap(), decode(&raw).unwrap());
    }
}
