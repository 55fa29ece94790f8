use crate::device::constants::{MAX_LEVEL, MIN_LEVEL};

const STATUS_TAG: &str = "\"type\":\"status\"";

const FIELD_STATE: &str = "stato";
const FIELD_LEVEL: &str = "livello";
const FIELD_POWER: &str = "potenza";
const FIELD_SENSOR: &str = "sensore";

/// Last known state of the vacuum, as reported by its status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacuumState {
    pub on: bool,
    /// Suction level, 1 to 4 on well-behaved firmware. Not validated.
    pub level: i32,
    pub power_watts: i32,
    pub sensor: i32,
}

impl Default for VacuumState {
    fn default() -> Self {
        VacuumState {
            on: false,
            level: MIN_LEVEL,
            power_watts: 0,
            sensor: 0,
        }
    }
}

impl VacuumState {
    /// Parses a status notification such as
    /// `{"type":"status","stato":1,"livello":2,"potenza":45,"sensore":12}`.
    ///
    /// This is a pattern match, not a JSON parser: the message is recognized by the literal
    /// `"type":"status"` tag and each field by `"<name>":<digits>`, wherever they appear.
    /// Missing fields keep their default. Returns `None` for any other message, or when a number
    /// does not fit.
    pub fn parse(message: &str) -> Option<VacuumState> {
        if !message.contains(STATUS_TAG) {
            return None;
        }

        let mut state = VacuumState::default();

        if let Some(value) = extract_field(message, FIELD_STATE)? {
            state.on = value == 1;
        }
        if let Some(value) = extract_field(message, FIELD_LEVEL)? {
            state.level = value;
        }
        if let Some(value) = extract_field(message, FIELD_POWER)? {
            state.power_watts = value;
        }
        if let Some(value) = extract_field(message, FIELD_SENSOR)? {
            state.sensor = value;
        }

        Some(state)
    }

    pub fn can_increase(&self) -> bool {
        self.on && self.level < MAX_LEVEL
    }

    pub fn can_decrease(&self) -> bool {
        self.on && self.level > MIN_LEVEL
    }

    pub fn status_text(&self) -> &'static str {
        if self.on { "Accesa" } else { "Spenta" }
    }

    pub fn sensor_text(&self) -> String {
        format!("{:04}", self.sensor)
    }
}

// Outer None: the digits were there but did not fit. Inner None: the field is absent.
fn extract_field(message: &str, name: &str) -> Option<Option<i32>> {
    let key = format!("\"{}\":", name);

    for (index, _) in message.match_indices(&key) {
        let rest = &message[index + key.len()..];
        let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits_len == 0 {
            continue;
        }

        return match rest[..digits_len].parse::<i32>() {
            Ok(value) => Some(Some(value)),
            Err(_) => None,
        };
    }

    Some(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_status() {
        let state = VacuumState::parse(r#"{"type":"status","stato":1,"livello":2,"potenza":45,"sensore":12}"#)
            .expect("status message");

        assert_eq!(state, VacuumState { on: true, level: 2, power_watts: 45, sensor: 12 });
    }

    #[test]
    fn ignores_other_message_types() {
        assert_eq!(VacuumState::parse(r#"{"type":"heartbeat","stato":1}"#), None);
        assert_eq!(VacuumState::parse(""), None);
        assert_eq!(VacuumState::parse("OK"), None);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let state = VacuumState::parse(r#"{"type":"status","stato":1}"#).expect("status message");
        assert_eq!(state, VacuumState { on: true, level: 1, power_watts: 0, sensor: 0 });

        let state = VacuumState::parse(r#"{"type":"status"}"#).expect("status message");
        assert_eq!(state, VacuumState::default());
    }

    #[test]
    fn only_one_means_on() {
        let state = VacuumState::parse(r#"{"type":"status","stato":2}"#).expect("status message");
        assert!(!state.on);
    }

    #[test]
    fn tolerates_noise_and_field_order() {
        let state = VacuumState::parse(r#"xx"sensore":7 garbage "livello":3 "type":"status" "stato":0,"#)
            .expect("status message");
        assert_eq!(state, VacuumState { on: false, level: 3, power_watts: 0, sensor: 7 });
    }

    #[test]
    fn skips_occurrences_without_digits() {
        let state = VacuumState::parse(r#"{"type":"status","livello":"x","livello":4}"#).expect("status message");
        assert_eq!(state.level, 4);
    }

    #[test]
    fn out_of_range_level_is_passed_through() {
        let state = VacuumState::parse(r#"{"type":"status","stato":1,"livello":9}"#).expect("status message");
        assert_eq!(state.level, 9);
        assert!(!state.can_increase());
    }

    #[test]
    fn overflowing_number_rejects_message() {
        assert_eq!(VacuumState::parse(r#"{"type":"status","potenza":99999999999}"#), None);
    }

    #[test]
    fn level_bounds() {
        let off = VacuumState { level: 2, ..VacuumState::default() };
        assert!(!off.can_increase());
        assert!(!off.can_decrease());

        let low = VacuumState { on: true, level: 1, ..VacuumState::default() };
        assert!(low.can_increase());
        assert!(!low.can_decrease());

        let high = VacuumState { on: true, level: 4, ..VacuumState::default() };
        assert!(!high.can_increase());
        assert!(high.can_decrease());
    }

    #[test]
    fn display_texts() {
        let state = VacuumState { on: true, sensor: 12, ..VacuumState::default() };
        assert_eq!(state.status_text(), "Accesa");
        assert_eq!(state.sensor_text(), "0012");
        assert_eq!(VacuumState::default().status_text(), "Spenta");
    }
}
