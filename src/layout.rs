use regex::Regex;
use std::sync::OnceLock;

use crate::fieldtrip::{Field, Record};

/// Value reported when the sensor layout cannot be determined.
pub const UNKNOWN_SENSTYPE: &str = "unknown";

// 10-20 positions, including the old T3/T4/T5/T6 names
const EEG_1020: [&str; 25] = [
    "fp1", "fpz", "fp2", "f7", "f3", "fz", "f4", "f8", "t7", "t3", "c3", "cz", "c4", "t8", "t4",
    "p7", "t5", "p3", "pz", "p4", "p8", "t6", "o1", "oz", "o2",
];

/// Primary sensor-type lookup.
///
/// Implementations classify a structured recording from its own metadata and
/// return [`UNKNOWN_SENSTYPE`] when they cannot tell; the reader then falls
/// back to [`senstype_from_labels`].
pub trait SensorTypeLookup: Send + Sync {
    fn sensor_type(&self, record: &Record) -> String;
}

/// Reads the `type` field of the `grad` (MEG) or `elec` (EEG) sensor
/// description stored with the recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorDescriptionLookup;

impl SensorTypeLookup for SensorDescriptionLookup {
    fn sensor_type(&self, record: &Record) -> String {
        ["grad", "elec"]
            .iter()
            .filter_map(|name| match record.get(name) {
                Some(Field::Struct(sens)) => sens.text("type"),
                _ => None,
            })
            .find(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_SENSTYPE)
            .to_string()
    }
}

struct Patterns {
    neuromag: Regex,
    ctf: Regex,
    bti: Regex,
    eeg: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        neuromag: Regex::new(r"^MEG ?\d{4}$").expect("valid regex"),
        ctf: Regex::new(r"^M[LRZ][CFOPT]\d{2}(-\d+)?$").expect("valid regex"),
        bti: Regex::new(r"^A(\d{1,3})$").expect("valid regex"),
        eeg: Regex::new(r"(?i)^(fp|af|f|ft|fc|t|c|tp|cp|p|po|o|i)(z|[1-9]|10)$")
            .expect("valid regex"),
    })
}

/// Guesses the sensor layout from channel naming conventions.
///
/// The convention matched by most channels wins, provided it covers more than
/// half of them. Returns `None` when no convention applies.
pub fn senstype_from_labels<S: AsRef<str>>(labels: &[S]) -> Option<&'static str> {
    if labels.is_empty() {
        return None;
    }

    let p = patterns();
    let names: Vec<&str> = labels.iter().map(|l| l.as_ref()).collect();
    let count = |re: &Regex| names.iter().filter(|l| re.is_match(l)).count();

    let neuromag = count(&p.neuromag);
    let ctf = count(&p.ctf);
    let bti = names
        .iter()
        .filter_map(|l| p.bti.captures(l))
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|n| (1..=248).contains(n))
        .count();
    let eeg = count(&p.eeg);

    let (best, hits) = [
        ("neuromag306", neuromag),
        ("ctf", ctf),
        ("bti248", bti),
        ("eeg", eeg),
    ]
    .into_iter()
    .max_by_key(|&(_, n)| n)?;

    if hits * 2 <= names.len() {
        return None;
    }

    Some(match best {
        "ctf" if ctf > 151 => "ctf275",
        "ctf" => "ctf151",
        "eeg" => {
            let all_1020 = names
                .iter()
                .map(|l| l.to_ascii_lowercase())
                .filter(|l| p.eeg.is_match(l))
                .all(|l| EEG_1020.contains(&l.as_str()));
            if all_1020 {
                "eeg1020"
            } else {
                "eeg1010"
            }
        }
        other => other,
    })
}

/// Primary lookup first, label heuristics when it reports unknown.
pub fn resolve_senstype(
    record: &Record,
    labels: &[String],
    lookup: &dyn SensorTypeLookup,
) -> Option<String> {
    let primary = lookup.sensor_type(record);
    if primary != UNKNOWN_SENSTYPE {
        return Some(primary);
    }

    let guess = senstype_from_labels(labels);
    if let Some(senstype) = guess {
        log::debug!("sensor type guessed from channel labels: {}", senstype);
    }
    guess.map(String::from)
}
